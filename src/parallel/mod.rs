//! Process-level communication.
//!
//! One process per rank, no intra-process threading assumed. All cross-rank
//! coordination in the crate goes through the object-safe [`Comm`] trait:
//! `SerialComm` for the single-rank case, [`ChannelComm`] for an in-process
//! universe of connected ranks (the shared-memory transport the test suite
//! runs on), and `MpiComm` behind the `mpi` feature for production runs.
//!
//! Point-to-point messages are matched by (source, tag) in posting order;
//! callers serialize operations on a given communicator, so a handful of
//! fixed tags is sufficient to keep independent exchanges apart.

pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Global sum reduction. Collective.
    fn all_reduce_sum(&self, x: f64) -> f64;
    /// Gather one value from every rank, in rank order. Collective.
    fn all_gather_usize(&self, x: usize) -> Vec<usize>;
    /// Post a tagged scalar message. Must not block on the receiver.
    fn send_scalars(&self, dest: usize, tag: usize, buf: &[f64]);
    /// Wait for the matching message and copy it into `buf`.
    fn recv_scalars(&self, src: usize, tag: usize, buf: &mut [f64]);
    /// Tagged index message (plan-setup traffic only).
    fn send_indices(&self, dest: usize, tag: usize, buf: &[usize]);
    fn recv_indices(&self, src: usize, tag: usize) -> Vec<usize>;
}

/// Tag for halo plan-setup request lists.
pub(crate) const HALO_SETUP_TAG: usize = 1;
/// Tag for forward halo value traffic.
pub(crate) const HALO_DATA_TAG: usize = 2;

/// The trivial single-rank communicator.
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce_sum(&self, x: f64) -> f64 {
        x
    }
    fn all_gather_usize(&self, x: usize) -> Vec<usize> {
        vec![x]
    }
    fn send_scalars(&self, _dest: usize, _tag: usize, _buf: &[f64]) {
        unreachable!("no peers on a serial communicator")
    }
    fn recv_scalars(&self, _src: usize, _tag: usize, _buf: &mut [f64]) {
        unreachable!("no peers on a serial communicator")
    }
    fn send_indices(&self, _dest: usize, _tag: usize, _buf: &[usize]) {
        unreachable!("no peers on a serial communicator")
    }
    fn recv_indices(&self, _src: usize, _tag: usize) -> Vec<usize> {
        unreachable!("no peers on a serial communicator")
    }
}

pub mod channel_comm;
pub mod halo;
pub mod rowmap;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub use channel_comm::ChannelComm;
pub use halo::{Halo, HaloCtx};
pub use rowmap::RowMap;
