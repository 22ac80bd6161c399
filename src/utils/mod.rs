pub mod convergence;
pub mod monitor;
