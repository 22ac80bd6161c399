//! Core linear-algebra traits for partmat.

use crate::error::PmError;
use crate::vec::ParVec;

/// A distributed linear operator y ← A x.
pub trait LinearOp {
    /// Compute y = A · x. Collective over the operator's communicator.
    fn mult(&self, x: &ParVec, y: &mut ParVec) -> Result<(), PmError>;
    /// Allocate a vector in the operator's row space.
    fn create_vec(&self) -> ParVec;
    /// Local (row, column) dimension in scalar unknowns.
    fn local_size(&self) -> (usize, usize);
}
