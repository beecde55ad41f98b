//! The adaptive tree itself.

use std::sync::atomic::{AtomicU32, Ordering};

use nalgebra::SVector;

use crate::xtree::lookup_tables::MarchingTable;
use crate::xtree::qef::{Qef, QefSolution};
use crate::xtree::region::Region;
use crate::xtree::types::{CellType, CornerState};

/// A node of an adaptive quadtree (`N = 2`) or octree (`N = 3`).
///
/// Leaves carry the surface information used by mesh emitters: corner
/// states, and on boundary leaves a vertex with its feature rank. Branches
/// own exactly `2^N` children, ordered so that bit `b` of the child index
/// selects the upper half on axis `b`.
///
/// Everything except [`XTree::index`] is fixed once construction returns.
#[derive(Debug)]
pub struct XTree<const N: usize> {
    region: Region<N>,
    children: Vec<XTree<N>>,
    level: u32,
    corner_mask: u8,
    cell_type: CellType,
    vertex: Option<SVector<f64, N>>,
    rank: u8,
    manifold: bool,
    error: f64,
    qef: Qef<N>,
    index: AtomicU32,
}

impl<const N: usize> XTree<N> {
    // =========================================================================
    // CONSTRUCTION (crate-internal)
    // =========================================================================

    /// A leaf whose region is entirely filled or entirely empty.
    pub(crate) fn uniform(region: Region<N>, cell_type: CellType) -> Self {
        let corner_mask = match cell_type {
            CellType::Filled => MarchingTable::<N>::FULL_MASK,
            _ => 0,
        };
        Self {
            region,
            children: Vec::new(),
            level: 0,
            corner_mask,
            cell_type,
            vertex: None,
            rank: 0,
            manifold: true,
            error: 0.0,
            qef: Qef::default(),
            index: AtomicU32::new(0),
        }
    }

    /// A leaf that the surface passes through.
    pub(crate) fn boundary(
        region: Region<N>,
        corner_mask: u8,
        qef: Qef<N>,
        solution: QefSolution<N>,
        manifold: bool,
    ) -> Self {
        Self {
            region,
            children: Vec::new(),
            level: 0,
            corner_mask,
            cell_type: CellType::Boundary,
            vertex: Some(solution.vertex),
            rank: solution.rank,
            manifold,
            error: solution.error,
            qef,
            index: AtomicU32::new(0),
        }
    }

    /// A branch that could not be collapsed.
    pub(crate) fn branch(
        region: Region<N>,
        children: Vec<XTree<N>>,
        corner_mask: u8,
        qef: Qef<N>,
        manifold: bool,
    ) -> Self {
        debug_assert_eq!(children.len(), 1 << N);
        let level = 1 + children.iter().map(|c| c.level).max().unwrap_or(0);
        Self {
            region,
            children,
            level,
            corner_mask,
            cell_type: CellType::Boundary,
            vertex: None,
            rank: 0,
            manifold,
            error: 0.0,
            qef,
            index: AtomicU32::new(0),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[inline]
    pub fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }

    /// Child `i` of a branch, or the node itself for a leaf.
    ///
    /// Returning `self` lets emitters walk neighbouring cells of different
    /// depths in lockstep without special-casing leaves.
    #[inline]
    pub fn child(&self, i: usize) -> &XTree<N> {
        if self.is_branch() {
            &self.children[i]
        } else {
            self
        }
    }

    /// All children (empty for leaves).
    #[inline]
    pub fn children(&self) -> &[XTree<N>] {
        &self.children
    }

    #[inline]
    pub fn region(&self) -> &Region<N> {
        &self.region
    }

    /// Height of this node: 0 for leaves, otherwise one more than the
    /// tallest child.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn corner_state(&self, i: usize) -> CornerState {
        if self.corner_mask & (1 << i) != 0 {
            CornerState::Filled
        } else {
            CornerState::Empty
        }
    }

    #[inline]
    pub fn corner_pos(&self, i: usize) -> SVector<f64, N> {
        self.region.corner(i)
    }

    /// Bitmask of filled corners.
    #[inline]
    pub fn corner_mask(&self) -> u8 {
        self.corner_mask
    }

    #[inline]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Surface vertex. Only boundary leaves have one.
    #[inline]
    pub fn vertex(&self) -> Option<&SVector<f64, N>> {
        self.vertex.as_ref()
    }

    /// Feature rank of the vertex: 1 on smooth surface, 2 on an edge and 3
    /// on a corner. Nodes without a vertex report 0.
    #[inline]
    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Whether a single vertex here keeps the contour's topology intact.
    #[inline]
    pub fn is_manifold(&self) -> bool {
        self.manifold
    }

    /// QEF residual at the vertex (0 for nodes without a vertex).
    #[inline]
    pub fn error(&self) -> f64 {
        self.error
    }

    /// Average surface crossing position inside this cell.
    pub fn mass_point(&self) -> Option<SVector<f64, N>> {
        self.qef.average_mass_point()
    }

    #[inline]
    pub fn qef(&self) -> &Qef<N> {
        &self.qef
    }

    // =========================================================================
    // EMITTER BOOKKEEPING
    // =========================================================================

    #[inline]
    pub fn index(&self) -> u32 {
        self.index.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_index(&self, index: u32) {
        self.index.store(index, Ordering::Relaxed);
    }

    /// Depth-first iterator over all leaves, in child order.
    pub fn leaves(&self) -> Leaves<'_, N> {
        Leaves { stack: vec![self] }
    }

    /// Number every leaf that has a vertex densely from 0, depth-first.
    ///
    /// Returns the number of indices handed out.
    pub fn assign_leaf_indices(&self) -> u32 {
        let mut next = 0;
        for leaf in self.leaves().filter(|leaf| leaf.vertex.is_some()) {
            leaf.set_index(next);
            next += 1;
        }
        next
    }
}

/// Iterator returned by [`XTree::leaves`].
pub struct Leaves<'a, const N: usize> {
    stack: Vec<&'a XTree<N>>,
}

impl<'a, const N: usize> Iterator for Leaves<'a, N> {
    type Item = &'a XTree<N>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if node.is_branch() {
                self.stack.extend(node.children.iter().rev());
            } else {
                return Some(node);
            }
        }
        None
    }
}
