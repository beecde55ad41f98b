//! Quadratic error function accumulation and solving.
//!
//! Each surface crossing contributes a tangent-plane constraint
//! `n · (x - p) = 0`. Stacking them as `A x = b` (rows `nᵗ`, entries `n · p`)
//! gives the least-squares error
//!
//! ```text
//! E(x) = xᵗ AᵗA x - 2 xᵗ Aᵗb + bᵗb
//! ```
//!
//! which only needs the running sums `AᵗA`, `Aᵗb` and `bᵗb`. Sums are
//! associative, so a parent cell's QEF is the sum of its children's.
//!
//! See "Dual Contouring: The Secret Sauce" (Lindstrom, Schaefer) for the
//! mass-point recentering and eigenvalue truncation used here.

use std::ops::AddAssign;

use nalgebra::{DMatrix, SMatrix, SVector, SymmetricEigen};

use crate::xtree::region::Region;

/// Running sums for a quadratic error function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Qef<const N: usize> {
    /// Sum of `n nᵗ`
    pub ata: SMatrix<f64, N, N>,
    /// Sum of `n (n · p)`
    pub atb: SVector<f64, N>,
    /// Sum of `(n · p)²`
    pub btb: f64,
    /// Sum of crossing positions
    pub mass_point: SVector<f64, N>,
    /// Number of crossing positions summed into `mass_point`
    pub mass_count: u32,
}

/// A solved vertex position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QefSolution<const N: usize> {
    /// Vertex position, always inside the solved region
    pub vertex: SVector<f64, N>,
    /// Number of significant constraint directions (0 = unconstrained)
    pub rank: u8,
    /// Residual error at `vertex`
    pub error: f64,
}

impl<const N: usize> Default for Qef<N> {
    fn default() -> Self {
        Self {
            ata: SMatrix::zeros(),
            atb: SVector::zeros(),
            btb: 0.0,
            mass_point: SVector::zeros(),
            mass_count: 0,
        }
    }
}

impl<const N: usize> Qef<N> {
    /// Add a surface crossing at `position`.
    ///
    /// Crossings without a usable normal still move the mass point but add
    /// no plane constraint.
    pub fn insert(&mut self, position: &SVector<f64, N>, normal: Option<&SVector<f64, N>>) {
        self.mass_point += position;
        self.mass_count += 1;

        if let Some(n) = normal.filter(|n| n.iter().all(|c| c.is_finite())) {
            let d = n.dot(position);
            self.ata += n * n.transpose();
            self.atb += n * d;
            self.btb += d * d;
        }
    }

    /// Add another QEF's plane constraints without its mass point.
    pub fn add_planes(&mut self, other: &Qef<N>) {
        self.ata += other.ata;
        self.atb += other.atb;
        self.btb += other.btb;
    }

    /// Add another QEF's mass point without its plane constraints.
    pub fn add_mass_point(&mut self, other: &Qef<N>) {
        self.mass_point += other.mass_point;
        self.mass_count += other.mass_count;
    }

    /// Average crossing position, if any crossing has been added.
    pub fn average_mass_point(&self) -> Option<SVector<f64, N>> {
        (self.mass_count > 0).then(|| self.mass_point / f64::from(self.mass_count))
    }

    /// Evaluate the quadratic error at a point.
    pub fn error_at(&self, x: &SVector<f64, N>) -> f64 {
        x.dot(&(self.ata * x)) - 2.0 * x.dot(&self.atb) + self.btb
    }

    /// Find the vertex minimizing the error within `region`.
    ///
    /// The problem is solved relative to the mass point, keeping only
    /// eigen-directions of `AᵗA` whose eigenvalue is above `cutoff` times the
    /// largest one; the remaining directions stay at the mass point. If the
    /// solution leaves the region, the mass point (clamped into the region)
    /// is used instead. With no crossings at all, the region center is used.
    pub fn solve(&self, region: &Region<N>, cutoff: f64) -> QefSolution<N> {
        let center = self
            .average_mass_point()
            .map(|p| region.clamp(&p))
            .unwrap_or_else(|| region.center());

        // Symmetric eigendecomposition of AᵗA. The dynamic matrix keeps this
        // independent of the dimension.
        let eigen = SymmetricEigen::new(DMatrix::from_iterator(N, N, self.ata.iter().copied()));
        let largest = eigen.eigenvalues.amax();

        let rhs = self.atb - self.ata * center;
        let mut offset = SVector::<f64, N>::zeros();
        let mut rank = 0u8;
        if largest > f64::EPSILON {
            for (i, &lambda) in eigen.eigenvalues.iter().enumerate() {
                if lambda.abs() > cutoff * largest {
                    let u = SVector::<f64, N>::from_fn(|row, _| eigen.eigenvectors[(row, i)]);
                    offset += u * (u.dot(&rhs) / lambda);
                    rank += 1;
                }
            }
        }

        let mut vertex = center + offset;
        if !region.contains(&vertex) {
            vertex = center;
        }

        QefSolution {
            vertex,
            rank,
            error: self.error_at(&vertex),
        }
    }
}

impl<const N: usize> AddAssign<&Qef<N>> for Qef<N> {
    fn add_assign(&mut self, other: &Qef<N>) {
        self.add_planes(other);
        self.add_mass_point(other);
    }
}
