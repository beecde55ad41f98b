//! Stage 2: Manifold-Preserving Collapse
//!
//! Runs on every branch once all of its children are finished, so the tree
//! is simplified bottom-up as the stage 1 recursion unwinds.
//!
//! # Algorithm
//! 1. Parent corner `i` is corner `i` of child `i`
//! 2. A branch with a branch child stays a branch (not manifold)
//! 3. Children that are all filled (or all empty) leaves merge into one
//!    uniform leaf
//! 4. Otherwise the branch may only collapse when
//!    - its corner configuration is safe for a single vertex,
//!    - every child is manifold, and
//!    - every sub-face center sampled by the children agrees with at least
//!      one parent corner on that sub-face
//! 5. The children's QEFs are merged and re-solved
//! 6. A sharp feature is never merged with the surface around it: every
//!    boundary child must share the highest child rank, and the merged
//!    solution may not find more constraint directions than that rank
//! 7. The branch becomes a boundary leaf when the residual is small enough

use crate::xtree::lookup_tables::MarchingTable;
use crate::xtree::node::XTree;
use crate::xtree::qef::{Qef, QefSolution};
use crate::xtree::region::Region;
use crate::xtree::stage1::BuildContext;
use crate::xtree::types::{BuildStats, CellType, CornerState};

/// Finish a branch whose children have all been built, collapsing it into a
/// leaf when that doesn't change the contour.
pub(crate) fn finalize_branch<const N: usize>(
    ctx: &BuildContext<'_, N>,
    region: Region<N>,
    children: Vec<XTree<N>>,
) -> XTree<N> {
    let corner_mask = children
        .iter()
        .enumerate()
        .filter(|&(i, child)| child.corner_state(i) == CornerState::Filled)
        .fold(0u8, |mask, (i, _)| mask | (1 << i));

    if children.iter().any(XTree::is_branch) {
        let mut qef = Qef::default();
        for child in &children {
            qef += child.qef();
        }
        return XTree::branch(region, children, corner_mask, qef, false);
    }

    for uniform in [CellType::Filled, CellType::Empty] {
        if children.iter().all(|child| child.cell_type() == uniform) {
            BuildStats::bump(&ctx.stats.uniform_collapses);
            return XTree::uniform(region, uniform);
        }
    }

    let rank = children.iter().map(XTree::rank).max().unwrap_or(0);
    let qef = merge_children(&children, rank);

    if !ctx.table.is_safe_to_collapse(corner_mask)
        || !children.iter().all(XTree::is_manifold)
        || !leaves_are_equivalent(ctx.table, &children, corner_mask)
    {
        log::trace!(
            "Keeping branch at {:?}: topology check failed for mask {:#b}",
            region.lower(),
            corner_mask
        );
        BuildStats::bump(&ctx.stats.topology_rejections);
        return XTree::branch(region, children, corner_mask, qef, false);
    }

    let solution = qef.solve(&region, ctx.config.eigenvalue_cutoff);
    let mixed_ranks = children
        .iter()
        .any(|child| child.cell_type() == CellType::Boundary && child.rank() != rank);
    if mixed_ranks || solution.rank > rank {
        log::trace!(
            "Keeping branch at {:?}: rank {} feature next to lower-rank surface (merged rank {})",
            region.lower(),
            rank,
            solution.rank
        );
        BuildStats::bump(&ctx.stats.feature_rejections);
        return XTree::branch(region, children, corner_mask, qef, false);
    }

    if solution.error <= ctx.config.max_collapse_error {
        BuildStats::bump(&ctx.stats.boundary_collapses);
        return XTree::boundary(
            region,
            corner_mask,
            qef,
            QefSolution { rank, ..solution },
            true,
        );
    }

    log::trace!(
        "Keeping branch at {:?}: merged error {:.3e} exceeds {:.3e}",
        region.lower(),
        solution.error,
        ctx.config.max_collapse_error
    );
    BuildStats::bump(&ctx.stats.error_rejections);
    XTree::branch(region, children, corner_mask, qef, true)
}

/// Sum the children's QEFs.
///
/// Plane constraints come from every child; the mass point only from the
/// children of the highest rank, so a sharp feature isn't dragged towards
/// the smooth surface around it.
fn merge_children<const N: usize>(children: &[XTree<N>], rank: u8) -> Qef<N> {
    let mut qef = Qef::default();
    for child in children {
        qef.add_planes(child.qef());
        if child.rank() == rank {
            qef.add_mass_point(child.qef());
        }
    }
    qef
}

/// Check that the finer samples taken by the children don't reveal topology
/// the parent's corners can't represent.
///
/// The sample at the center of every edge, face and of the cell itself must
/// match at least one parent corner of that sub-face.
fn leaves_are_equivalent<const N: usize>(
    table: &MarchingTable<N>,
    children: &[XTree<N>],
    corner_mask: u8,
) -> bool {
    table.subfaces().iter().all(|face| {
        let fine = children[face.center_child()].corner_state(face.center_corner());
        face.corners().any(|corner| {
            let coarse = if corner_mask & (1 << corner) != 0 {
                CornerState::Filled
            } else {
                CornerState::Empty
            };
            coarse == fine
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xtree::eval::LipschitzEvaluator;
    use crate::xtree::stage1::build_floor_leaf;
    use crate::xtree::types::XTreeConfig;
    use nalgebra::SVector;

    /// Build 2D children from per-child corner masks, giving each mixed
    /// child a zero-error vertex on the plane x = 0.3.
    fn children_from_masks(region: &Region<2>, masks: [u8; 4]) -> Vec<XTree<2>> {
        region
            .subdivide()
            .into_iter()
            .zip(masks)
            .map(|(child, mask)| match mask {
                0 => XTree::uniform(child, CellType::Empty),
                0b1111 => XTree::uniform(child, CellType::Filled),
                _ => {
                    let mut qef = Qef::default();
                    let center = child.center();
                    let point = SVector::from([0.3, center[1]]);
                    qef.insert(&point, Some(&SVector::from([1.0, 0.0])));
                    let solution = QefSolution {
                        vertex: child.clamp(&point),
                        rank: 1,
                        error: 0.0,
                    };
                    XTree::boundary(child, mask, qef, solution, true)
                }
            })
            .collect()
    }

    fn finalize(masks: [u8; 4]) -> (XTree<2>, BuildStats) {
        let table = MarchingTable::<2>::new();
        let config = XTreeConfig::default();
        let stats = BuildStats::default();
        let region = Region::new([0.0, 0.0], [1.0, 1.0]).unwrap();
        let node = {
            let ctx = BuildContext {
                table: &table,
                config: &config,
                stats: &stats,
            };
            finalize_branch(&ctx, region, children_from_masks(&region, masks))
        };
        (node, stats)
    }

    #[test]
    fn test_uniform_children_collapse() {
        let (node, _) = finalize([0b1111; 4]);
        assert!(!node.is_branch());
        assert_eq!(node.cell_type(), CellType::Filled);
        assert_eq!(node.corner_mask(), 0b1111);

        let (node, _) = finalize([0; 4]);
        assert!(!node.is_branch());
        assert_eq!(node.cell_type(), CellType::Empty);
    }

    #[test]
    fn test_straight_edge_collapses() {
        // Filled on the left of x = 0.3, which cuts children 0 and 2
        let (node, stats) = finalize([0b0101, 0, 0b0101, 0]);
        assert!(!node.is_branch(), "planar surface should collapse");
        assert_eq!(node.cell_type(), CellType::Boundary);
        assert_eq!(node.corner_mask(), 0b0101);
        assert_eq!(node.rank(), 1);
        assert!(node.is_manifold());
        assert!((node.vertex().unwrap()[0] - 0.3).abs() < 1e-12);
        assert_eq!(node.level(), 0);
        assert_eq!(
            stats.boundary_collapses.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_checkerboard_is_kept() {
        // Parent corners 0 and 3 filled
        let (node, stats) = finalize([0b1111, 0b0100, 0b0010, 0b1111]);
        assert!(node.is_branch());
        assert!(!node.is_manifold());
        assert_eq!(node.corner_mask(), 0b1001);
        assert_eq!(node.level(), 1);
        assert_eq!(
            stats.topology_rejections.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_sharp_corner_is_kept() {
        // Empty where x > 0.3 and y > 0.2: the corner lies in child 0
        let table = MarchingTable::<2>::new();
        let config = XTreeConfig::default();
        let stats = BuildStats::default();
        let ctx = BuildContext {
            table: &table,
            config: &config,
            stats: &stats,
        };
        let mut eval =
            LipschitzEvaluator::distance(|p: &SVector<f64, 2>| (p[0] - 0.3).min(p[1] - 0.2));
        let region = Region::new([0.0, 0.0], [1.0, 1.0]).unwrap();
        let children: Vec<XTree<2>> = region
            .subdivide()
            .into_iter()
            .map(|child| build_floor_leaf(&ctx, &mut eval, child))
            .collect();
        assert_eq!(children[0].rank(), 2);
        assert_eq!(children[3].cell_type(), CellType::Empty);

        let node = finalize_branch(&ctx, region, children);
        assert!(node.is_branch(), "corner must not merge with its edges");
        assert!(!node.is_manifold());
        assert_eq!(node.child(0).rank(), 2);
        assert_eq!(
            stats.feature_rejections.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(
            stats.boundary_collapses.load(std::sync::atomic::Ordering::Relaxed),
            0
        );
    }

    #[test]
    fn test_hidden_feature_is_kept() {
        // Every parent corner is empty but the shared center sample is filled
        let (node, _) = finalize([0b1000, 0b0100, 0b0010, 0b0001]);
        assert!(node.is_branch());
        assert!(!node.is_manifold());
        assert_eq!(node.corner_mask(), 0);
    }
}
