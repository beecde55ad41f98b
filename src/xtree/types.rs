//! Type definitions for adaptive tree construction.
//!
//! Contains cell and corner classifications, configuration, error types,
//! statistics and output types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::xtree::node::XTree;

// =============================================================================
// CELL AND CORNER STATES
// =============================================================================

/// Result of a conservative interval evaluation over a whole region.
///
/// `Filled` and `Empty` are only reported when the sign of the field is
/// provably uniform over the region. Anything else is `Ambiguous`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntervalState {
    /// The field is negative everywhere in the region.
    Filled,
    /// The field is positive everywhere in the region.
    Empty,
    /// The region may contain the surface.
    Ambiguous,
}

/// Classification of a single cell corner on a finished node.
///
/// There is no ambiguous variant: point samples that land exactly on the
/// surface (or evaluate to NaN) are resolved to `Empty`. This is a biased
/// but deterministic tie-break which can thin features that are narrower
/// than the minimum feature size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CornerState {
    /// The field is negative at this corner.
    Filled,
    /// The field is positive (or zero) at this corner.
    Empty,
}

impl CornerState {
    /// Classify a field value, resolving zero and NaN to `Empty`.
    #[inline]
    pub fn from_value(value: f64) -> Self {
        if value < 0.0 {
            CornerState::Filled
        } else {
            CornerState::Empty
        }
    }
}

/// Overall classification of a tree cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Every corner (and, for interval leaves, every point) is inside.
    Filled,
    /// Every corner (and, for interval leaves, every point) is outside.
    Empty,
    /// Mixed corners; the surface passes through this cell.
    Boundary,
}

impl IntervalState {
    /// The leaf type implied by a certain interval result, if any.
    #[inline]
    pub fn cell_type(self) -> Option<CellType> {
        match self {
            IntervalState::Filled => Some(CellType::Filled),
            IntervalState::Empty => Some(CellType::Empty),
            IntervalState::Ambiguous => None,
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for tree construction.
///
/// Every field has a default, so partial settings can be deserialized:
///
/// ```
/// let config: xtree::XTreeConfig = serde_json::from_str(r#"{ "min_feature": 0.25 }"#).unwrap();
/// assert_eq!(config.min_feature, 0.25);
/// assert!(config.parallel);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XTreeConfig {
    /// Smallest cell edge length produced by subdivision (world units).
    ///
    /// Cells are split while any axis is longer than this; ambiguous cells
    /// at or below it become leaves and are resolved by point sampling.
    pub min_feature: f64,

    /// Distribute construction across worker threads.
    ///
    /// When false, only the first evaluator is used.
    pub parallel: bool,

    /// Number of evaluators created by [`XTree::build_with`]
    /// (0 = one per rayon worker thread).
    pub num_threads: usize,

    /// Fraction of the largest QEF eigenvalue below which an eigenvalue is
    /// treated as insignificant.
    ///
    /// Governs feature rank detection: larger values classify more cells as
    /// smooth (rank 1), smaller values detect edges and corners more eagerly.
    pub eigenvalue_cutoff: f64,

    /// Largest QEF residual for which a topologically safe branch is
    /// collapsed into a single leaf.
    pub max_collapse_error: f64,

    /// Number of bisection steps used to locate a surface crossing along a
    /// cell edge.
    pub crossing_iterations: usize,
}

impl Default for XTreeConfig {
    fn default() -> Self {
        Self {
            min_feature: 0.1,
            parallel: true,
            num_threads: 0,
            eigenvalue_cutoff: 0.1,
            max_collapse_error: 1e-8,
            crossing_iterations: 24,
        }
    }
}

impl XTreeConfig {
    /// Check the settings before construction starts.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(self.min_feature.is_finite() && self.min_feature > 0.0) {
            return Err(BuildError::InvalidMinFeature(self.min_feature));
        }
        if !(self.eigenvalue_cutoff.is_finite() && (0.0..1.0).contains(&self.eigenvalue_cutoff)) {
            return Err(BuildError::InvalidEigenvalueCutoff(self.eigenvalue_cutoff));
        }
        Ok(())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Precondition violations detected before construction starts.
///
/// Construction itself cannot fail once these checks pass.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("region axis {axis} has invalid bounds [{lower}, {upper}]")]
    InvalidRegion { axis: usize, lower: f64, upper: f64 },
    #[error("min_feature must be positive and finite, got {0}")]
    InvalidMinFeature(f64),
    #[error("eigenvalue_cutoff must be in [0, 1), got {0}")]
    InvalidEigenvalueCutoff(f64),
    #[error("at least one evaluator is required")]
    NoEvaluators,
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Counters shared by every worker during a build.
#[derive(Default, Debug)]
pub struct BuildStats {
    /// Regions classified with interval arithmetic
    pub interval_evaluations: AtomicU64,
    /// Corner point samples taken at the subdivision floor
    pub corner_samples: AtomicU64,
    /// Edge crossings located and added to a QEF
    pub crossings: AtomicU64,
    /// Leaves produced directly by a certain interval result
    pub interval_leaves: AtomicU64,
    /// Leaves produced at the subdivision floor
    pub floor_leaves: AtomicU64,
    /// Branches whose children were all filled or all empty
    pub uniform_collapses: AtomicU64,
    /// Boundary branches collapsed into a single vertex
    pub boundary_collapses: AtomicU64,
    /// Branches kept because a topology test failed
    pub topology_rejections: AtomicU64,
    /// Branches kept because collapsing would merge a sharp feature
    pub feature_rejections: AtomicU64,
    /// Branches kept because the merged QEF error was too large
    pub error_rejections: AtomicU64,
}

impl BuildStats {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Timing and counts for a finished build.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Wall-clock time for the whole build (seconds)
    pub total_time_secs: f64,
    /// Number of evaluators that took part in the build
    pub workers: usize,

    pub interval_evaluations: u64,
    pub corner_samples: u64,
    pub crossings: u64,
    pub interval_leaves: u64,
    pub floor_leaves: u64,
    pub uniform_collapses: u64,
    pub boundary_collapses: u64,
    pub topology_rejections: u64,
    pub feature_rejections: u64,
    pub error_rejections: u64,

    /// Shape of the finished tree
    pub nodes: usize,
    pub leaves: usize,
    pub boundary_leaves: usize,
    pub depth: u32,
}

impl BuildReport {
    pub(crate) fn new<const N: usize>(
        stats: &BuildStats,
        tree: &XTree<N>,
        total_time_secs: f64,
        workers: usize,
    ) -> Self {
        let mut nodes = 0;
        let mut leaves = 0;
        let mut boundary_leaves = 0;
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            nodes += 1;
            if node.is_branch() {
                stack.extend(node.children());
            } else {
                leaves += 1;
                if node.cell_type() == CellType::Boundary {
                    boundary_leaves += 1;
                }
            }
        }

        Self {
            total_time_secs,
            workers,
            interval_evaluations: stats.interval_evaluations.load(Ordering::Relaxed),
            corner_samples: stats.corner_samples.load(Ordering::Relaxed),
            crossings: stats.crossings.load(Ordering::Relaxed),
            interval_leaves: stats.interval_leaves.load(Ordering::Relaxed),
            floor_leaves: stats.floor_leaves.load(Ordering::Relaxed),
            uniform_collapses: stats.uniform_collapses.load(Ordering::Relaxed),
            boundary_collapses: stats.boundary_collapses.load(Ordering::Relaxed),
            topology_rejections: stats.topology_rejections.load(Ordering::Relaxed),
            feature_rejections: stats.feature_rejections.load(Ordering::Relaxed),
            error_rejections: stats.error_rejections.load(Ordering::Relaxed),
            nodes,
            leaves,
            boundary_leaves,
            depth: tree.level(),
        }
    }

    /// Write a human-readable profiling report to the `info` log level.
    pub fn log_report(&self) {
        log::info!("=== XTree build report ===");
        log::info!(
            "Total time: {:.2}ms on {} worker(s)",
            self.total_time_secs * 1000.0,
            self.workers
        );
        log::info!("  Interval evaluations: {}", self.interval_evaluations);
        log::info!("  Corner samples: {}", self.corner_samples);
        log::info!("  Edge crossings: {}", self.crossings);
        log::info!(
            "  Leaves: {} interval, {} floor",
            self.interval_leaves,
            self.floor_leaves
        );
        log::info!(
            "  Collapses: {} uniform, {} boundary",
            self.uniform_collapses,
            self.boundary_collapses
        );
        log::info!(
            "  Rejected collapses: {} topology, {} feature, {} error",
            self.topology_rejections,
            self.feature_rejections,
            self.error_rejections
        );
        log::info!(
            "  Tree: {} nodes, {} leaves ({} boundary), depth {}",
            self.nodes,
            self.leaves,
            self.boundary_leaves,
            self.depth
        );
    }
}

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// A finished tree together with its build report.
#[derive(Debug)]
pub struct BuildResult<const N: usize> {
    /// Root of the constructed tree
    pub tree: XTree<N>,
    /// Profiling statistics
    pub stats: BuildReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_state_tie_break() {
        assert_eq!(CornerState::from_value(-1e-300), CornerState::Filled);
        assert_eq!(CornerState::from_value(1e-300), CornerState::Empty);
        assert_eq!(CornerState::from_value(0.0), CornerState::Empty);
        assert_eq!(CornerState::from_value(-0.0), CornerState::Empty);
        assert_eq!(CornerState::from_value(f64::NAN), CornerState::Empty);
        assert_eq!(CornerState::from_value(f64::NEG_INFINITY), CornerState::Filled);
    }

    #[test]
    fn test_report_counts_feature_rejections() {
        let stats = BuildStats::default();
        BuildStats::bump(&stats.feature_rejections);
        BuildStats::bump(&stats.feature_rejections);
        let region = crate::xtree::region::Region::<2>::new([0.0, 0.0], [1.0, 1.0]).unwrap();
        let tree = XTree::uniform(region, CellType::Empty);

        let report = BuildReport::new(&stats, &tree, 0.0, 1);
        assert_eq!(report.feature_rejections, 2);
        assert_eq!(report.nodes, 1);
        assert_eq!(report.leaves, 1);
        assert_eq!(report.boundary_leaves, 0);
    }
}
