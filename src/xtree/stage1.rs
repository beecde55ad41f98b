//! Stage 1: Interval Subdivision
//!
//! Top-down recursion over the region. Cells the evaluator can prove to be
//! uniformly filled or empty become leaves immediately; ambiguous cells are
//! split until they reach the minimum feature size and are then resolved by
//! point sampling at their corners.
//!
//! # Algorithm
//! 1. Interval-classify the region; a certain result gives a uniform leaf
//! 2. Ambiguous and larger than `min_feature`: split into 2^N children,
//!    build them (in parallel while several evaluators remain), then hand the
//!    branch to stage 2 for the collapse attempt
//! 3. Ambiguous at the floor: sample all corners, locate the crossing on
//!    every edge with differing corner states, and place the vertex with the
//!    accumulated QEF

use nalgebra::SVector;

use crate::xtree::eval::{Evaluator, WorkerEvaluator};
use crate::xtree::lookup_tables::MarchingTable;
use crate::xtree::node::XTree;
use crate::xtree::parallel_iter;
use crate::xtree::qef::Qef;
use crate::xtree::region::Region;
use crate::xtree::stage2;
use crate::xtree::types::{BuildStats, CellType, CornerState, XTreeConfig};

/// Read-only state shared by every worker during a build.
pub(crate) struct BuildContext<'a, const N: usize> {
    pub table: &'a MarchingTable<N>,
    pub config: &'a XTreeConfig,
    pub stats: &'a BuildStats,
}

/// Whether an ambiguous cell should be split further.
///
/// Cells are split while any axis is longer than `min_feature`, unless
/// halving would no longer change the bounds at floating-point resolution.
#[inline]
pub(crate) fn should_subdivide<const N: usize>(region: &Region<N>, min_feature: f64) -> bool {
    region.extent().iter().any(|&e| e > min_feature) && region.can_subdivide()
}

/// Build the subtree for `region`.
///
/// `evals` must not be empty. The first evaluator classifies this cell; all
/// of them are distributed over the children.
pub(crate) fn build_node<E, const N: usize>(
    ctx: &BuildContext<'_, N>,
    evals: &mut [E],
    region: Region<N>,
) -> XTree<N>
where
    E: WorkerEvaluator<N>,
{
    BuildStats::bump(&ctx.stats.interval_evaluations);
    if let Some(cell_type) = evals[0].interval_classify(&region).cell_type() {
        BuildStats::bump(&ctx.stats.interval_leaves);
        return XTree::uniform(region, cell_type);
    }

    if should_subdivide(&region, ctx.config.min_feature) {
        let children = build_children(ctx, evals, region.subdivide());
        return stage2::finalize_branch(ctx, region, children);
    }

    build_floor_leaf(ctx, &mut evals[0], region)
}

/// Build one subtree per region, returned in the same order.
///
/// With a single evaluator the children are built one after another on the
/// current thread. Otherwise the evaluators and the regions are split into
/// contiguous groups and each group runs as its own task.
pub(crate) fn build_children<E, const N: usize>(
    ctx: &BuildContext<'_, N>,
    evals: &mut [E],
    regions: Vec<Region<N>>,
) -> Vec<XTree<N>>
where
    E: WorkerEvaluator<N>,
{
    if evals.len() <= 1 {
        return regions
            .into_iter()
            .map(|region| build_node(ctx, &mut *evals, region))
            .collect();
    }

    let groups = parallel_iter::partition(evals, regions);
    log::trace!(
        "Splitting {} evaluators into {} groups",
        groups.iter().map(|(e, _)| e.len()).sum::<usize>(),
        groups.len()
    );

    parallel_iter::map_vec(groups, |(evals, regions)| {
        regions
            .into_iter()
            .map(|region| build_node(ctx, &mut *evals, region))
            .collect::<Vec<_>>()
    })
    .into_iter()
    .flatten()
    .collect()
}

/// Resolve an ambiguous cell at the subdivision floor.
///
/// Corners are point sampled (values on the surface count as empty). If any
/// edge connects a filled and an empty corner, the crossing on each such
/// edge and the surface normal there feed the QEF that places the vertex.
pub(crate) fn build_floor_leaf<E, const N: usize>(
    ctx: &BuildContext<'_, N>,
    eval: &mut E,
    region: Region<N>,
) -> XTree<N>
where
    E: Evaluator<N>,
{
    BuildStats::bump(&ctx.stats.floor_leaves);

    let corners: Vec<SVector<f64, N>> = (0..MarchingTable::<N>::CORNERS)
        .map(|i| region.corner(i))
        .collect();

    let mut mask = 0u8;
    for (i, corner) in corners.iter().enumerate() {
        BuildStats::bump(&ctx.stats.corner_samples);
        if eval.point_classify(corner) == CornerState::Filled {
            mask |= 1 << i;
        }
    }

    if !ctx.table.has_crossings(mask) {
        let cell_type = if mask == 0 {
            CellType::Empty
        } else {
            CellType::Filled
        };
        return XTree::uniform(region, cell_type);
    }

    let mut qef = Qef::default();
    for (a, b) in ctx.table.crossing_edges(mask) {
        let (inside, outside) = if mask & (1 << a) != 0 { (a, b) } else { (b, a) };
        let position = eval.value_along(
            &corners[inside],
            &corners[outside],
            ctx.config.crossing_iterations,
        );
        let normal = eval.gradient_at(&position);
        qef.insert(&position, normal.as_ref());
        BuildStats::bump(&ctx.stats.crossings);
    }

    let solution = qef.solve(&region, ctx.config.eigenvalue_cutoff);
    XTree::boundary(
        region,
        mask,
        qef,
        solution,
        ctx.table.is_safe_to_collapse(mask),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xtree::eval::LipschitzEvaluator;

    #[test]
    fn test_should_subdivide_uses_longest_axis() {
        let region = Region::<2>::new([0.0, 0.0], [0.5, 0.1]).unwrap();
        assert!(should_subdivide(&region, 0.2));
        assert!(!should_subdivide(&region, 0.5));

        let tiny = Region::<2>::new([1.0, 1.0], [1.0 + f64::EPSILON, 2.0]).unwrap();
        assert!(!should_subdivide(&tiny, 0.1));
    }

    #[test]
    fn test_floor_leaf_on_plane() {
        let table = MarchingTable::<2>::new();
        let config = XTreeConfig::default();
        let stats = BuildStats::default();
        let ctx = BuildContext {
            table: &table,
            config: &config,
            stats: &stats,
        };

        // Half-plane x < 0.3
        let mut eval = LipschitzEvaluator::distance(|p: &SVector<f64, 2>| p[0] - 0.3);
        let region = Region::new([0.0, 0.0], [1.0, 1.0]).unwrap();
        let leaf = build_floor_leaf(&ctx, &mut eval, region);

        assert_eq!(leaf.cell_type(), CellType::Boundary);
        assert_eq!(leaf.corner_mask(), 0b0101);
        assert_eq!(leaf.rank(), 1);
        assert!(leaf.is_manifold());
        let vertex = leaf.vertex().unwrap();
        assert!((vertex[0] - 0.3).abs() < 1e-6, "vertex {:?} off the plane", vertex);
        assert!(leaf.error() < 1e-10);
    }

    #[test]
    fn test_floor_leaf_with_corners_on_surface() {
        let table = MarchingTable::<2>::new();
        let config = XTreeConfig::default();
        let stats = BuildStats::default();
        let ctx = BuildContext {
            table: &table,
            config: &config,
            stats: &stats,
        };

        // Corners 1 and 3 sit exactly on x = 0.5 and resolve to empty
        let mut eval = LipschitzEvaluator::distance(|p: &SVector<f64, 2>| p[0] - 0.5);
        let region = Region::new([0.0, 0.0], [0.5, 1.0]).unwrap();
        let leaf = build_floor_leaf(&ctx, &mut eval, region);

        assert_eq!(leaf.corner_state(1), CornerState::Empty);
        assert_eq!(leaf.corner_state(3), CornerState::Empty);
        assert_eq!(leaf.corner_mask(), 0b0101);
        assert_eq!(leaf.cell_type(), CellType::Boundary);
        assert_eq!(leaf.rank(), 1);
        let vertex = leaf.vertex().unwrap();
        assert!((vertex[0] - 0.5).abs() < 1e-6, "vertex {:?} off the surface", vertex);
        assert!(region.contains(vertex));
    }

    #[test]
    fn test_floor_leaf_without_crossings() {
        let table = MarchingTable::<2>::new();
        let config = XTreeConfig::default();
        let stats = BuildStats::default();
        let ctx = BuildContext {
            table: &table,
            config: &config,
            stats: &stats,
        };

        // A thin sliver between sample points is invisible at the floor
        let mut eval = LipschitzEvaluator::distance(|p: &SVector<f64, 2>| (p[0] - 0.5).abs() - 0.01);
        let region = Region::new([0.0, 0.0], [1.0, 1.0]).unwrap();
        let leaf = build_floor_leaf(&ctx, &mut eval, region);

        assert_eq!(leaf.cell_type(), CellType::Empty);
        assert!(leaf.vertex().is_none());
    }
}
