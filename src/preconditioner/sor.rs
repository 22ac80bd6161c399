//! Rank-local SOR/SSOR relaxation.
//!
//! The off-rank coupling is frozen for the duration of one application: the
//! current interface values are gathered once, B·y_ext is subtracted from
//! the right-hand side, and the sweeps then run on the diagonal block alone.
//! Across ranks this behaves like block Jacobi; within a rank it is plain
//! (S)SOR.

use crate::config::{SorOptions, SorSweep};
use crate::error::PmError;
use crate::matrix::PartMat;
use crate::parallel::HaloCtx;
use crate::preconditioner::Preconditioner;
use crate::vec::ParVec;

pub struct ParSor {
    omega: f64,
    iters: usize,
    sweep: SorSweep,
    /// Inverted diagonal blocks of A, rebuilt by `setup`.
    dinv: Vec<f64>,
    ctx: HaloCtx,
    y_ext: Vec<f64>,
    rhs: Vec<f64>,
    ext_offset: usize,
}

impl ParSor {
    /// All scratch is sized here, from the matrix's halo, so `apply` never
    /// allocates.
    pub fn new(a: &PartMat, opts: &SorOptions) -> ParSor {
        let halo = a.ext_halo();
        let b = a.block_size();
        ParSor {
            omega: opts.omega,
            iters: opts.iters,
            sweep: opts.sweep,
            dinv: Vec::new(),
            ctx: halo.create_ctx(b),
            y_ext: vec![0.0; b * halo.dim()],
            rhs: vec![0.0; b * a.local_rows()],
            ext_offset: b * a.interior_rows(),
        }
    }

    fn relax(&self, a: &PartMat, rhs: &[f64], y: &mut [f64]) {
        if self.sweep.contains(SorSweep::SYMMETRIC) {
            a.diag_block()
                .apply_ssor(&self.dinv, rhs, y, self.omega, self.iters);
        } else {
            a.diag_block()
                .apply_sor(&self.dinv, rhs, y, self.omega, self.iters);
        }
    }
}

impl Preconditioner<PartMat> for ParSor {
    /// Invert and cache the diagonal blocks. No communication.
    fn setup(&mut self, a: &PartMat) -> Result<(), PmError> {
        self.dinv = a.diag_block().factor_diag()?;
        Ok(())
    }

    fn apply(&mut self, a: &PartMat, x: &ParVec, y: &mut ParVec) -> Result<(), PmError> {
        if self.dinv.len() != a.local_rows() * a.block_size() * a.block_size() {
            return Err(PmError::StructureMismatch(
                "relaxation was not set up for this matrix".to_string(),
            ));
        }
        if x.local_len() != self.rhs.len() || y.local_len() != self.rhs.len() {
            return Err(PmError::StructureMismatch(
                "vector does not match the matrix row space".to_string(),
            ));
        }
        if self.sweep.contains(SorSweep::ZERO_GUESS) {
            y.zero_entries();
            self.relax(a, x.as_slice(), y.as_mut_slice());
        } else {
            // Gather the current interface iterate and freeze the coupling
            // as a right-hand-side correction: rhs = x − B·y_ext.
            let halo = a.ext_halo();
            halo.begin_forward(&mut self.ctx, y.as_slice());
            self.rhs.fill(0.0);
            halo.end_forward(&mut self.ctx, &mut self.y_ext);
            a.ext_block()
                .mult(&self.y_ext, &mut self.rhs[self.ext_offset..]);
            for (r, &xv) in self.rhs.iter_mut().zip(x.as_slice()) {
                *r = xv - *r;
            }
            self.relax(a, &self.rhs, y.as_mut_slice());
        }
        Ok(())
    }
}
