//! partmat: partitioned block-sparse matrices with Schur-complement preconditioning
//!
//! The distributed linear-algebra core of a parallel finite-element solver.
//! A matrix is split per rank into a square diagonal block `A` over the owned
//! unknowns and a coupling block `B` acting on copies of foreign interface
//! unknowns gathered through a halo exchange. Interface unknowns are ordered
//! last on each rank, which the preconditioners exploit: rank-local (S)SOR
//! relaxation, zero-overlap additive Schwarz, and an approximate
//! Schur-complement preconditioner with an inner GMRES on the globally
//! coupled interface system.

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod parallel;
pub mod preconditioner;
pub mod solver;
pub mod utils;
pub mod vec;

// Re-exports for convenience
pub use crate::core::traits::*;
pub use config::*;
pub use error::*;
pub use matrix::*;
pub use parallel::*;
pub use preconditioner::*;
pub use solver::*;
pub use vec::ParVec;

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
pub use utils::monitor::{Monitor, WriterMonitor};
