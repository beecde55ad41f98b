//! Topology lookup tables for marching squares / cubes cells.
//!
//! All tables use the canonical corner encoding where bit `b` of a corner
//! index selects the upper bound on axis `b`:
//!
//! ```text
//! 2D: 0:(0,0) 1:(1,0) 2:(0,1) 3:(1,1)
//! 3D: 0:(0,0,0) 1:(1,0,0) 2:(0,1,0) 3:(1,1,0) 4:(0,0,1) 5:(1,0,1) 6:(0,1,1) 7:(1,1,1)
//! ```
//!
//! A corner mask has bit `i` set when corner `i` is filled.
//!
//! The tables are generated from the cube's edge graph rather than written
//! out by hand, so 2D and 3D share one code path. A [`MarchingTable`] is
//! built once by the caller and then shared read-only between all workers.

/// One sub-face of a cell: an edge, a face, or (for the full axis set) the
/// cell itself.
///
/// The sub-face spans every corner `base | s` where `s` is a subset of
/// `axes`. Its center is corner `base | axes` of child `base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubFace {
    /// Corner with all free axis bits cleared
    pub base: u8,
    /// Bitmask of the axes the sub-face extends along
    pub axes: u8,
}

impl SubFace {
    /// The parent corner indices lying on this sub-face.
    pub fn corners(&self) -> impl Iterator<Item = usize> + '_ {
        let axes = self.axes as usize;
        let base = self.base as usize;
        // Enumerate subsets of `axes` (including the empty set)
        let mut subset = Some(axes);
        std::iter::from_fn(move || {
            let current = subset?;
            subset = if current == 0 {
                None
            } else {
                Some((current - 1) & axes)
            };
            Some(base | current)
        })
    }

    /// The child whose corner sits at the center of this sub-face.
    #[inline]
    pub fn center_child(&self) -> usize {
        self.base as usize
    }

    /// The corner of [`SubFace::center_child`] at the center of this sub-face.
    #[inline]
    pub fn center_corner(&self) -> usize {
        (self.base | self.axes) as usize
    }
}

/// Edge and manifold tables for one dimensionality.
#[derive(Clone, Debug)]
pub struct MarchingTable<const N: usize> {
    /// Cell edges as (lower corner, upper corner), grouped by axis
    edges: Vec<(u8, u8)>,
    /// Per corner mask: bitset of edge indices whose endpoints differ
    crossings: Vec<u16>,
    /// Per corner mask: whether the configuration can be collapsed safely
    manifold: Vec<bool>,
    /// Every edge, face and cell-interior sub-face of the cell
    subfaces: Vec<SubFace>,
}

impl<const N: usize> MarchingTable<N> {
    const SUPPORTED: () = assert!(N == 2 || N == 3, "only 2D and 3D tables are supported");

    /// Number of corners of a cell.
    pub const CORNERS: usize = 1 << N;

    /// Corner mask with every corner filled.
    pub const FULL_MASK: u8 = ((1usize << Self::CORNERS) - 1) as u8;

    /// Build the tables for this dimensionality.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SUPPORTED;

        let corners = Self::CORNERS;

        // Edges: for each axis, every corner with that axis bit clear connects
        // to the corner with it set. In 3D this is the usual 12-edge order
        // (4 X edges, then 4 Y edges, then 4 Z edges).
        let mut edges = Vec::with_capacity(N * corners / 2);
        for axis in 0..N {
            for corner in 0..corners {
                if corner & (1 << axis) == 0 {
                    edges.push((corner as u8, (corner | (1 << axis)) as u8));
                }
            }
        }

        let masks = 1usize << corners;
        let crossings = (0..masks)
            .map(|mask| {
                edges
                    .iter()
                    .enumerate()
                    .filter(|&(_, &(a, b))| ((mask >> a) & 1) != ((mask >> b) & 1))
                    .fold(0u16, |bits, (i, _)| bits | (1 << i))
            })
            .collect();

        let manifold = (0..masks)
            .map(|mask| {
                let filled = mask as u8;
                let empty = !filled & (masks - 1) as u8;
                is_connected(filled, &edges) && is_connected(empty, &edges)
            })
            .collect();

        let mut subfaces = Vec::new();
        for axes in 1..corners {
            for base in 0..corners {
                if base & axes == 0 {
                    subfaces.push(SubFace {
                        base: base as u8,
                        axes: axes as u8,
                    });
                }
            }
        }

        Self {
            edges,
            crossings,
            manifold,
            subfaces,
        }
    }

    /// All cell edges as pairs of corner indices.
    pub fn edges(&self) -> &[(u8, u8)] {
        &self.edges
    }

    /// Edges whose endpoints have different states for the given mask.
    pub fn crossing_edges(&self, mask: u8) -> impl Iterator<Item = (usize, usize)> + '_ {
        let bits = self.crossings[mask as usize];
        self.edges
            .iter()
            .enumerate()
            .filter(move |&(i, _)| bits & (1 << i) != 0)
            .map(|(_, &(a, b))| (a as usize, b as usize))
    }

    /// Whether any edge of the cell crosses the surface.
    #[inline]
    pub fn has_crossings(&self, mask: u8) -> bool {
        self.crossings[mask as usize] != 0
    }

    /// Whether a cell with this corner configuration can be represented by a
    /// single vertex without changing the topology of the contour.
    ///
    /// A configuration is safe when its filled corners and its empty corners
    /// each form one edge-connected group. This rejects the ambiguous
    /// checkerboard cases in 2D and the saddle cases in 3D
    /// (Gerstner et al. 2000, as used by Ju et al. 2002).
    #[inline]
    pub fn is_safe_to_collapse(&self, mask: u8) -> bool {
        self.manifold[mask as usize]
    }

    /// Every edge, face and interior sub-face of a cell.
    pub fn subfaces(&self) -> &[SubFace] {
        &self.subfaces
    }

}

impl<const N: usize> Default for MarchingTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether the corners in `set` form a single component of the cell's
/// edge graph. The empty set counts as connected.
fn is_connected(set: u8, edges: &[(u8, u8)]) -> bool {
    if set == 0 {
        return true;
    }
    let start = set.trailing_zeros() as u8;
    let mut reached = 1u8 << start;
    loop {
        let mut grown = reached;
        for &(a, b) in edges {
            let (bit_a, bit_b) = (1u8 << a, 1u8 << b);
            if set & bit_a != 0 && set & bit_b != 0 && (reached & (bit_a | bit_b)) != 0 {
                grown |= bit_a | bit_b;
            }
        }
        if grown == reached {
            break;
        }
        reached = grown;
    }
    reached == set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_order_3d() {
        let table = MarchingTable::<3>::new();
        let expected: [(u8, u8); 12] = [
            (0, 1), (2, 3), (4, 5), (6, 7),
            (0, 2), (1, 3), (4, 6), (5, 7),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ];
        assert_eq!(table.edges(), &expected[..]);
    }

    #[test]
    fn test_edge_order_2d() {
        let table = MarchingTable::<2>::new();
        let expected: [(u8, u8); 4] = [(0, 1), (2, 3), (0, 2), (1, 3)];
        assert_eq!(table.edges(), &expected[..]);
    }

    #[test]
    fn test_crossing_edges() {
        let table = MarchingTable::<2>::new();
        // Only corner 0 filled: edges 0-1 and 0-2 cross
        let edges: Vec<_> = table.crossing_edges(0b0001).collect();
        assert_eq!(edges, vec![(0, 1), (0, 2)]);
        assert!(!table.has_crossings(0));
        assert!(!table.has_crossings(MarchingTable::<2>::FULL_MASK));
        assert_eq!(MarchingTable::<2>::FULL_MASK, 0b1111);
        assert_eq!(MarchingTable::<3>::FULL_MASK, 0xFF);
    }

    #[test]
    fn test_checkerboards_are_not_manifold_2d() {
        let table = MarchingTable::<2>::new();
        for mask in 0..16u8 {
            let checkerboard = mask == 0b0110 || mask == 0b1001;
            assert_eq!(
                table.is_safe_to_collapse(mask),
                !checkerboard,
                "mask {:04b} classified incorrectly",
                mask
            );
        }
    }

    #[test]
    fn test_manifold_3d() {
        let table = MarchingTable::<3>::new();
        assert!(table.is_safe_to_collapse(0x00));
        assert!(table.is_safe_to_collapse(0xFF));
        // Single corner and a full face
        assert!(table.is_safe_to_collapse(0b0000_0001));
        assert!(table.is_safe_to_collapse(0b0000_1111));
        // Opposite corners across the cell diagonal
        assert!(!table.is_safe_to_collapse(0b1000_0001));
        // Opposite corners across a face diagonal
        assert!(!table.is_safe_to_collapse(0b0000_1001));
        // Complements behave the same way
        for mask in 0..=255u8 {
            assert_eq!(
                table.is_safe_to_collapse(mask),
                table.is_safe_to_collapse(!mask)
            );
        }
    }

    #[test]
    fn test_subfaces() {
        let table = MarchingTable::<3>::new();
        // 12 edges + 6 faces + 1 interior
        assert_eq!(table.subfaces().len(), 19);
        let table = MarchingTable::<2>::new();
        // 4 edges + 1 interior
        assert_eq!(table.subfaces().len(), 5);

        let interior = table
            .subfaces()
            .iter()
            .find(|face| face.axes == 0b11)
            .unwrap();
        let mut corners: Vec<_> = interior.corners().collect();
        corners.sort_unstable();
        assert_eq!(corners, vec![0, 1, 2, 3]);
        assert_eq!(interior.center_child(), 0);
        assert_eq!(interior.center_corner(), 3);
    }
}
