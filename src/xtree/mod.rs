//! Adaptive quadtree / octree construction for implicit surfaces.
//!
//! Builds an [`XTree`] over a region of an implicit function (negative
//! inside) that is refined only where the surface passes, with one vertex per
//! boundary leaf placed on sharp features where they exist. The finished tree
//! is the input for dual contouring style mesh emitters.
//!
//! The build runs in two interleaved stages:
//!
//! 1. **Stage 1: Interval Subdivision** - Top-down recursion that prunes
//!    provably uniform cells with interval arithmetic and resolves ambiguous
//!    cells at the minimum feature size by corner sampling and QEF vertex
//!    placement.
//!
//! 2. **Stage 2: Manifold-Preserving Collapse** - As the recursion unwinds,
//!    branches whose children can be represented by one vertex without
//!    changing topology (and with negligible geometric error) are merged.
//!
//! # Parallelism
//!
//! Each worker owns one evaluator. At every level the evaluators are split
//! into contiguous groups over the children, so the top few levels fan out
//! and everything below runs sequentially per worker. The resulting tree does
//! not depend on the number of workers.

use web_time::Instant;

// Submodules
pub mod eval;
pub mod lookup_tables;
pub mod node;
pub mod parallel_iter;
pub mod qef;
pub mod region;
pub mod stage1;
pub mod stage2;
pub mod types;


// Re-exports for public API
pub use eval::{Evaluator, Interval, LipschitzEvaluator, WorkerEvaluator};
pub use lookup_tables::{MarchingTable, SubFace};
pub use node::{Leaves, XTree};
pub use qef::{Qef, QefSolution};
pub use region::Region;
pub use types::{
    BuildError, BuildReport, BuildResult, CellType, CornerState, IntervalState, XTreeConfig,
};

use stage1::{build_node, BuildContext};
use types::BuildStats;

impl<const N: usize> XTree<N> {
    /// Build a tree over `region` using the given evaluators.
    ///
    /// With `config.parallel` set, every evaluator is used by its own worker;
    /// otherwise only the first one is used.
    ///
    /// # Errors
    /// Returns an error for invalid settings or an empty evaluator slice.
    pub fn build<E>(
        evaluators: &mut [E],
        region: Region<N>,
        table: &MarchingTable<N>,
        config: &XTreeConfig,
    ) -> Result<Self, BuildError>
    where
        E: WorkerEvaluator<N>,
    {
        Self::build_with_stats(evaluators, region, table, config).map(|result| result.tree)
    }

    /// Like [`XTree::build`], also returning the build report.
    pub fn build_with_stats<E>(
        evaluators: &mut [E],
        region: Region<N>,
        table: &MarchingTable<N>,
        config: &XTreeConfig,
    ) -> Result<BuildResult<N>, BuildError>
    where
        E: WorkerEvaluator<N>,
    {
        config.validate()?;
        if evaluators.is_empty() {
            return Err(BuildError::NoEvaluators);
        }

        let total_start = Instant::now();
        let stats = BuildStats::default();

        let workers = if config.parallel {
            evaluators
        } else {
            &mut evaluators[..1]
        };
        let worker_count = workers.len();

        log::debug!(
            "Building {}D tree over {:?} - {:?} with {} evaluator(s), min_feature {}",
            N,
            region.lower().as_slice(),
            region.upper().as_slice(),
            worker_count,
            config.min_feature
        );

        let ctx = BuildContext {
            table,
            config,
            stats: &stats,
        };
        let tree = build_node(&ctx, workers, region);

        let total_time = total_start.elapsed().as_secs_f64();
        let report = BuildReport::new(&stats, &tree, total_time, worker_count);
        log::debug!(
            "Built tree in {:.2}ms: {} nodes, {} boundary leaves, depth {}",
            total_time * 1000.0,
            report.nodes,
            report.boundary_leaves,
            report.depth
        );

        Ok(BuildResult {
            tree,
            stats: report,
        })
    }

    /// Build a tree, creating the marching table and the evaluators.
    ///
    /// `factory` is called once per worker: `config.num_threads` times, or
    /// once per rayon thread when that is 0 (just once when `config.parallel`
    /// is off).
    pub fn build_with<E, F>(
        factory: F,
        region: Region<N>,
        config: &XTreeConfig,
    ) -> Result<Self, BuildError>
    where
        E: WorkerEvaluator<N>,
        F: FnMut() -> E,
    {
        Self::build_with_factory_stats(factory, region, config).map(|result| result.tree)
    }

    /// Like [`XTree::build_with`], also returning the build report.
    pub fn build_with_factory_stats<E, F>(
        factory: F,
        region: Region<N>,
        config: &XTreeConfig,
    ) -> Result<BuildResult<N>, BuildError>
    where
        E: WorkerEvaluator<N>,
        F: FnMut() -> E,
    {
        let count = if !config.parallel {
            1
        } else if config.num_threads == 0 {
            parallel_iter::available_workers()
        } else {
            config.num_threads
        };

        let table = MarchingTable::<N>::new();
        let mut evaluators: Vec<E> = std::iter::repeat_with(factory).take(count).collect();
        Self::build_with_stats(&mut evaluators, region, &table, config)
    }
}
