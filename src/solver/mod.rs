//! Krylov solvers over distributed operators.

pub mod gmres;

pub use gmres::GmresSolver;
