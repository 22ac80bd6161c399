//! Preconditioners exploiting the interior/interface partition.

use crate::error::PmError;
use crate::vec::ParVec;

/// A preconditioner M ≈ A⁻¹ for a matrix of type `M`.
///
/// `setup` rebuilds the internal factorization from the matrix's current
/// values; `apply` computes z ≈ A⁻¹ r. Both take the matrix, so a
/// preconditioner never holds its own reference to it: it owns only its
/// factors and scratch.
pub trait Preconditioner<M> {
    fn setup(&mut self, a: &M) -> Result<(), PmError>;
    fn apply(&mut self, a: &M, r: &ParVec, z: &mut ParVec) -> Result<(), PmError>;
}

pub mod schur;
pub mod schwarz;
pub mod sor;

pub use schur::{ApproxSchur, SchurMat};
pub use schwarz::AdditiveSchwarz;
pub use sor::ParSor;
