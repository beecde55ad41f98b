//! Adaptive spatial trees for contouring implicit surfaces.
//!
//! [`XTree`] is a quadtree (`N = 2`) or octree (`N = 3`) refined only where
//! the surface of an implicit function passes. Each boundary leaf carries
//! one vertex placed by a quadratic error function, so sharp edges and
//! corners are preserved, and leaves are merged bottom-up wherever that
//! keeps the contour's topology.
//!
//! ```
//! use nalgebra::SVector;
//! use xtree::{LipschitzEvaluator, MarchingTable, Region, XTree, XTreeConfig};
//!
//! let mut evals = vec![LipschitzEvaluator::distance(|p: &SVector<f64, 2>| p.norm() - 1.0)];
//! let config = XTreeConfig { min_feature: 0.5, ..Default::default() };
//! let table = MarchingTable::<2>::new();
//! let tree = XTree::build(&mut evals, Region::centered(2.0)?, &table, &config)?;
//! assert!(tree.leaves().any(|leaf| leaf.vertex().is_some()));
//! # Ok::<(), xtree::BuildError>(())
//! ```

pub mod xtree;

pub use xtree::{
    BuildError, BuildReport, BuildResult, CellType, CornerState, Evaluator, Interval,
    IntervalState, LipschitzEvaluator, MarchingTable, Qef, Region, XTree, XTreeConfig,
};
