//! Convergence tracking & tolerance checks for iterative solvers.

/// Stopping criteria: relative and absolute residual targets plus an
/// iteration cap.
pub struct Convergence<T> {
    pub rtol: T,
    pub atol: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T = f64> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    /// The residual norm below which the solve counts as converged.
    pub fn target(&self, res0_norm: T) -> T {
        (self.rtol * res0_norm).max(self.atol)
    }

    /// Returns (should_stop, stats) given the current `res_norm` at
    /// iteration `i`.
    pub fn check(&self, res_norm: T, res0_norm: T, i: usize) -> (bool, SolveStats<T>) {
        let converged = res_norm <= self.target(res0_norm);
        (
            converged || i >= self.max_iters,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}
