//! Restarted GMRES (Saad §6.4) over distributed operators.
//!
//! Modified Gram-Schmidt with a second orthogonalization pass, Givens
//! rotations for the least-squares update, happy-breakdown detection, and
//! zero-pivot-protected back-substitution. Preconditioning is applied on
//! the right, so the residual the stopping test sees is the true residual.
//!
//! Hitting the iteration cap is not an error: the best iterate is written
//! back with `converged: false` in the statistics. This is what lets the
//! solver double as the interface solve inside a preconditioner, where an
//! approximate result is absorbed by the outer method.
//!
//! All reductions (inner products and norms) are collective; every rank
//! runs the same control flow and reaches the same stopping decision.

use crate::core::traits::LinearOp;
use crate::error::PmError;
use crate::preconditioner::Preconditioner;
use crate::utils::convergence::{Convergence, SolveStats};
use crate::utils::monitor::Monitor;
use crate::vec::ParVec;

const EPSILON: f64 = 1e-14;

pub struct GmresSolver {
    /// Krylov directions per restart cycle.
    pub restart: usize,
    pub conv: Convergence<f64>,
    monitor: Option<Box<dyn Monitor>>,
}

impl GmresSolver {
    pub fn new(restart: usize, rtol: f64, atol: f64, max_iters: usize) -> Self {
        Self {
            restart: restart.max(1),
            conv: Convergence {
                rtol,
                atol,
                max_iters,
            },
            monitor: None,
        }
    }

    /// Report each iteration's residual to an injected reporter.
    pub fn set_monitor(&mut self, monitor: Box<dyn Monitor>) {
        self.monitor = Some(monitor);
    }

    /// Apply the accumulated Givens rotations to column `j` of the
    /// Hessenberg matrix, generate the new rotation, and update g.
    fn apply_givens_and_update_g(
        h: &mut [Vec<f64>],
        g: &mut [f64],
        cs: &mut [f64],
        sn: &mut [f64],
        j: usize,
    ) {
        for i in 0..j {
            let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
            h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
            h[i][j] = temp;
        }
        let h_kk = h[j][j];
        let h_k1k = h[j + 1][j];
        let r = (h_kk * h_kk + h_k1k * h_k1k).sqrt();
        if r.abs() < EPSILON {
            cs[j] = 1.0;
            sn[j] = 0.0;
        } else {
            cs[j] = h_kk / r;
            sn[j] = h_k1k / r;
        }
        h[j][j] = cs[j] * h_kk + sn[j] * h_k1k;
        h[j + 1][j] = 0.0;
        let temp = cs[j] * g[j] + sn[j] * g[j + 1];
        g[j + 1] = -sn[j] * g[j] + cs[j] * g[j + 1];
        g[j] = temp;
    }

    /// Solve the upper-triangular least-squares system H y = g.
    fn back_substitution(h: &[Vec<f64>], g: &[f64], y: &mut [f64], m: usize) {
        for i in (0..m).rev() {
            y[i] = g[i];
            for j in (i + 1)..m {
                y[i] -= h[i][j] * y[j];
            }
            if h[i][i].abs() > EPSILON {
                y[i] /= h[i][i];
            } else {
                y[i] = 0.0;
            }
        }
    }

    /// Solve A·x = b from the initial guess in `x`. With a preconditioner
    /// the Krylov space is built for A·M⁻¹ and the correction is mapped
    /// back through M⁻¹ when the solution is updated.
    pub fn solve<M: LinearOp>(
        &mut self,
        a: &M,
        mut pc: Option<&mut dyn Preconditioner<M>>,
        b: &ParVec,
        x: &mut ParVec,
    ) -> Result<SolveStats, PmError> {
        // r0 = b − A·x
        let mut r0 = a.create_vec();
        a.mult(x, &mut r0)?;
        r0.axpby(1.0, -1.0, b)?;
        let mut beta = r0.norm();
        let res0 = beta;

        let mut stats = SolveStats {
            iterations: 0,
            final_residual: beta,
            converged: beta <= self.conv.target(res0),
        };
        if stats.converged {
            return Ok(stats);
        }

        let n_outer = self.conv.max_iters.div_ceil(self.restart).max(1);
        let mut iteration = 0;
        for _ in 0..n_outer {
            let mut v_basis: Vec<ParVec> = Vec::with_capacity(self.restart + 1);
            let mut z_basis: Vec<ParVec> = Vec::with_capacity(self.restart);
            let mut v0 = r0.clone();
            v0.scale(1.0 / beta);
            v_basis.push(v0);

            let mut h = vec![vec![0.0; self.restart]; self.restart + 1];
            let mut g = vec![0.0; self.restart + 1];
            g[0] = beta;
            let mut cs = vec![0.0; self.restart];
            let mut sn = vec![0.0; self.restart];
            let mut m = 0;
            let mut happy = false;

            for j in 0..self.restart {
                iteration += 1;
                // w = A·v_j, through M⁻¹ when preconditioned.
                let mut w = a.create_vec();
                if let Some(p) = pc.as_mut() {
                    let mut zj = a.create_vec();
                    p.apply(a, &v_basis[j], &mut zj)?;
                    a.mult(&zj, &mut w)?;
                    z_basis.push(zj);
                } else {
                    a.mult(&v_basis[j], &mut w)?;
                }
                // Modified Gram-Schmidt with a refinement pass.
                for i in 0..=j {
                    h[i][j] = w.dot(&v_basis[i])?;
                    w.axpy(-h[i][j], &v_basis[i])?;
                }
                for i in 0..=j {
                    let t = w.dot(&v_basis[i])?;
                    h[i][j] += t;
                    w.axpy(-t, &v_basis[i])?;
                }
                h[j + 1][j] = w.norm();
                if h[j + 1][j].abs() < EPSILON {
                    happy = true;
                } else {
                    w.scale(1.0 / h[j + 1][j]);
                    v_basis.push(w);
                }

                Self::apply_givens_and_update_g(&mut h, &mut g, &mut cs, &mut sn, j);
                let res_norm = g[j + 1].abs();
                if let Some(mon) = self.monitor.as_mut() {
                    mon.residual(iteration, res_norm);
                }
                let (stop, s) = self.conv.check(res_norm, res0, iteration);
                stats = s;
                m = j + 1;
                if happy || (stop && stats.converged) || iteration >= self.conv.max_iters {
                    break;
                }
            }

            let mut y = vec![0.0; m];
            Self::back_substitution(&h, &g, &mut y, m);
            if pc.is_some() {
                for (yj, zj) in y.iter().zip(&z_basis) {
                    x.axpy(*yj, zj)?;
                }
            } else {
                for (yj, vj) in y.iter().zip(&v_basis) {
                    x.axpy(*yj, vj)?;
                }
            }

            // True residual for the restart decision and the statistics.
            a.mult(x, &mut r0)?;
            r0.axpby(1.0, -1.0, b)?;
            beta = r0.norm();
            stats.final_residual = beta;
            stats.converged = beta <= self.conv.target(res0);
            if stats.converged || iteration >= self.conv.max_iters {
                break;
            }
        }
        Ok(stats)
    }
}
