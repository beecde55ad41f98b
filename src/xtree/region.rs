//! Axis-aligned regions and their subdivision.

use nalgebra::SVector;

use crate::xtree::types::BuildError;

/// An axis-aligned box in N dimensions.
///
/// Bounds are validated on construction (finite, `lower < upper` on every
/// axis), so every `Region` in a tree has positive extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region<const N: usize> {
    lower: SVector<f64, N>,
    upper: SVector<f64, N>,
}

impl<const N: usize> Region<N> {
    /// Create a region from its lower and upper corners.
    ///
    /// Returns [`BuildError::InvalidRegion`] for inverted, zero-extent or
    /// non-finite bounds.
    pub fn new(lower: [f64; N], upper: [f64; N]) -> Result<Self, BuildError> {
        for axis in 0..N {
            let (lo, hi) = (lower[axis], upper[axis]);
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(BuildError::InvalidRegion {
                    axis,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self {
            lower: SVector::from(lower),
            upper: SVector::from(upper),
        })
    }

    /// A cube (or square) centered at the origin with the given half size.
    pub fn centered(half_size: f64) -> Result<Self, BuildError> {
        Self::new([-half_size; N], [half_size; N])
    }

    #[inline]
    pub fn lower(&self) -> &SVector<f64, N> {
        &self.lower
    }

    #[inline]
    pub fn upper(&self) -> &SVector<f64, N> {
        &self.upper
    }

    #[inline]
    pub fn center(&self) -> SVector<f64, N> {
        (self.lower + self.upper) * 0.5
    }

    /// Side lengths per axis.
    #[inline]
    pub fn extent(&self) -> SVector<f64, N> {
        self.upper - self.lower
    }

    /// Length of the main diagonal.
    #[inline]
    pub fn diagonal(&self) -> f64 {
        self.extent().norm()
    }

    /// Position of corner `i`.
    ///
    /// Bit `b` of `i` selects the upper bound on axis `b`.
    pub fn corner(&self, i: usize) -> SVector<f64, N> {
        SVector::from_fn(|axis, _| {
            if i & (1 << axis) != 0 {
                self.upper[axis]
            } else {
                self.lower[axis]
            }
        })
    }

    /// Check whether a point lies inside the closed box.
    pub fn contains(&self, point: &SVector<f64, N>) -> bool {
        (0..N).all(|axis| point[axis] >= self.lower[axis] && point[axis] <= self.upper[axis])
    }

    /// Clamp a point into the closed box, axis by axis.
    pub fn clamp(&self, point: &SVector<f64, N>) -> SVector<f64, N> {
        SVector::from_fn(|axis, _| point[axis].clamp(self.lower[axis], self.upper[axis]))
    }

    /// Check whether halving this region still produces smaller boxes at
    /// floating-point resolution.
    pub fn can_subdivide(&self) -> bool {
        let center = self.center();
        (0..N).all(|axis| center[axis] > self.lower[axis] && center[axis] < self.upper[axis])
    }

    /// Split into 2^N equal children.
    ///
    /// Child `i` takes the upper half on axis `b` when bit `b` of `i` is set,
    /// matching the corner numbering of [`Region::corner`]. Callers must check
    /// [`Region::can_subdivide`] first.
    pub fn subdivide(&self) -> Vec<Region<N>> {
        let center = self.center();
        (0..1usize << N)
            .map(|i| {
                let lower = SVector::from_fn(|axis, _| {
                    if i & (1 << axis) != 0 {
                        center[axis]
                    } else {
                        self.lower[axis]
                    }
                });
                let upper = SVector::from_fn(|axis, _| {
                    if i & (1 << axis) != 0 {
                        self.upper[axis]
                    } else {
                        center[axis]
                    }
                });
                Region { lower, upper }
            })
            .collect()
    }
}
