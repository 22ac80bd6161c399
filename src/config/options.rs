//! Parameters for the partition-aware preconditioners.

use bitflags::bitflags;

bitflags! {
    /// Sweep selection for the rank-local relaxation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SorSweep: u32 {
        /// Start from y = 0 and skip the interface gather.
        const ZERO_GUESS = 0b001;
        const FORWARD    = 0b010;
        const BACKWARD   = 0b100;
        const SYMMETRIC  = Self::FORWARD.bits() | Self::BACKWARD.bits();
    }
}

/// Relaxation parameters: weight ω ∈ (0, 2), sweeps per application.
#[derive(Copy, Clone, Debug)]
pub struct SorOptions {
    pub omega: f64,
    pub iters: usize,
    pub sweep: SorSweep,
}

impl Default for SorOptions {
    fn default() -> Self {
        Self {
            omega: 1.0,
            iters: 1,
            sweep: SorSweep::FORWARD,
        }
    }
}

/// Parameters for the approximate Schur-complement preconditioner.
///
/// `lev_fill` and `fill` configure the incomplete factorization of the
/// diagonal block; `alpha` is a diagonal shift applied to the factored copy
/// only; the `inner_*` fields bound the interface solve.
#[derive(Copy, Clone, Debug)]
pub struct SchurOptions {
    /// Level of fill of the incomplete factorization.
    pub lev_fill: usize,
    /// Storage growth hint for the fill pattern, ≥ 1.0.
    pub fill: f64,
    /// Diagonal shift on the preconditioner copy.
    pub alpha: f64,
    /// Krylov directions for the interface solve (no restarts).
    pub inner_iters: usize,
    pub inner_rtol: f64,
    pub inner_atol: f64,
}

impl Default for SchurOptions {
    fn default() -> Self {
        Self {
            lev_fill: 1,
            fill: 10.0,
            alpha: 0.0,
            inner_iters: 10,
            inner_rtol: 1.0e-3,
            inner_atol: 1.0e-30,
        }
    }
}
