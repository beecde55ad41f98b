//! Evaluator interface for implicit functions.
//!
//! The tree builder never looks inside the implicit function. It only needs
//! a conservative interval bound over a region, point values and gradients.
//! Evaluators are allowed to keep mutable state (caches, tapes, counters), so
//! every method takes `&mut self` and each construction thread owns its own
//! instance.

use std::fmt;

use nalgebra::SVector;

use crate::xtree::region::Region;
use crate::xtree::types::{CornerState, IntervalState};

/// A conservative bound on the field over some region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Classify the interval. NaN bounds are always ambiguous.
    #[inline]
    pub fn state(&self) -> IntervalState {
        if self.upper < 0.0 {
            IntervalState::Filled
        } else if self.lower > 0.0 {
            IntervalState::Empty
        } else {
            IntervalState::Ambiguous
        }
    }
}

// =============================================================================
// EVALUATOR TRAIT
// =============================================================================

/// Evaluates an implicit function where negative values are inside.
///
/// Implementations must be conservative in [`Evaluator::interval`]: reporting
/// an ambiguous interval for a uniform region only costs time, but a wrong
/// certain result silently drops surface.
pub trait Evaluator<const N: usize> {
    /// Bound the field over a whole region.
    fn interval(&mut self, region: &Region<N>) -> Interval;

    /// Field value at a point.
    fn value(&mut self, point: &SVector<f64, N>) -> f64;

    /// Field gradient at a point (not necessarily normalized).
    fn gradient(&mut self, point: &SVector<f64, N>) -> SVector<f64, N>;

    /// Classify a region as filled, empty or ambiguous.
    fn interval_classify(&mut self, region: &Region<N>) -> IntervalState {
        self.interval(region).state()
    }

    /// Classify a point, resolving values on the surface to empty.
    fn point_classify(&mut self, point: &SVector<f64, N>) -> CornerState {
        CornerState::from_value(self.value(point))
    }

    /// Locate the surface between a filled point and an empty point.
    ///
    /// Uses bisection on [`Evaluator::point_classify`], so the result is
    /// always on the segment between the two points.
    fn value_along(
        &mut self,
        inside: &SVector<f64, N>,
        outside: &SVector<f64, N>,
        iterations: usize,
    ) -> SVector<f64, N> {
        let mut lo = *inside;
        let mut hi = *outside;
        for _ in 0..iterations {
            let mid = (lo + hi) * 0.5;
            match self.point_classify(&mid) {
                CornerState::Filled => lo = mid,
                CornerState::Empty => hi = mid,
            }
        }
        (lo + hi) * 0.5
    }

    /// Unit surface normal at a point, or `None` where the gradient vanishes.
    fn gradient_at(&mut self, point: &SVector<f64, N>) -> Option<SVector<f64, N>> {
        self.gradient(point).try_normalize(f64::EPSILON)
    }
}

/// Evaluators that can be handed to construction workers.
///
/// On native builds, each worker runs on its own thread, so evaluators must
/// be `Send`. Without the `native` feature construction is single-threaded.
#[cfg(feature = "native")]
pub trait WorkerEvaluator<const N: usize>: Evaluator<N> + Send {}
#[cfg(feature = "native")]
impl<const N: usize, E> WorkerEvaluator<N> for E where E: Evaluator<N> + Send {}

#[cfg(not(feature = "native"))]
pub trait WorkerEvaluator<const N: usize>: Evaluator<N> {}
#[cfg(not(feature = "native"))]
impl<const N: usize, E> WorkerEvaluator<N> for E where E: Evaluator<N> {}

// =============================================================================
// LIPSCHITZ EVALUATOR
// =============================================================================

/// Evaluator for a closure with a known Lipschitz bound.
///
/// The interval over a region is `f(center) ± L * diagonal / 2`, which is
/// conservative for any function whose rate of change never exceeds `L`
/// (exact signed distance fields have `L = 1`). Gradients use central
/// differences.
#[derive(Clone)]
pub struct LipschitzEvaluator<const N: usize, F> {
    function: F,
    lipschitz: f64,
    gradient_step: f64,
    evaluations: u64,
}

impl<const N: usize, F> LipschitzEvaluator<N, F>
where
    F: Fn(&SVector<f64, N>) -> f64,
{
    /// Wrap a function whose rate of change is bounded by `lipschitz`.
    pub fn new(function: F, lipschitz: f64) -> Self {
        Self {
            function,
            lipschitz: lipschitz.abs(),
            gradient_step: 1e-6,
            evaluations: 0,
        }
    }

    /// Wrap an exact signed distance function (`L = 1`).
    pub fn distance(function: F) -> Self {
        Self::new(function, 1.0)
    }

    /// Override the central-difference step used for gradients.
    pub fn with_gradient_step(mut self, step: f64) -> Self {
        self.gradient_step = step;
        self
    }

    /// Number of point evaluations made so far by this instance.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    #[inline]
    fn eval(&mut self, point: &SVector<f64, N>) -> f64 {
        self.evaluations += 1;
        (self.function)(point)
    }
}

impl<const N: usize, F> Evaluator<N> for LipschitzEvaluator<N, F>
where
    F: Fn(&SVector<f64, N>) -> f64,
{
    fn interval(&mut self, region: &Region<N>) -> Interval {
        let center = self.eval(&region.center());
        let radius = self.lipschitz * region.diagonal() * 0.5;
        Interval::new(center - radius, center + radius)
    }

    fn value(&mut self, point: &SVector<f64, N>) -> f64 {
        self.eval(point)
    }

    fn gradient(&mut self, point: &SVector<f64, N>) -> SVector<f64, N> {
        let h = self.gradient_step;
        let mut grad = SVector::zeros();
        for axis in 0..N {
            let mut ahead = *point;
            let mut behind = *point;
            ahead[axis] += h;
            behind[axis] -= h;
            grad[axis] = (self.eval(&ahead) - self.eval(&behind)) / (2.0 * h);
        }
        grad
    }
}

impl<const N: usize, F> fmt::Debug for LipschitzEvaluator<N, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LipschitzEvaluator")
            .field("lipschitz", &self.lipschitz)
            .field("gradient_step", &self.gradient_step)
            .field("evaluations", &self.evaluations)
            .finish()
    }
}
