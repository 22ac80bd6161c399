//! Approximate Schur-complement preconditioning of the interface unknowns.
//!
//! The diagonal block is factored as
//!
//! ```text
//! A = [ L_b          0   ][ U_b  L_b⁻¹ E ]
//!     [ F U_b⁻¹      L_s ][ 0    U_s     ]
//! ```
//!
//! splitting at the first interface row. One application then runs in three
//! stages: eliminate the interior (L⁻¹ over the full block, then U_s⁻¹ over
//! the interface slice), solve the globally coupled interface system with an
//! inner GMRES on the implicit operator
//!
//! ```text
//! S v = v + U_s⁻¹ L_s⁻¹ B_ext · v_ext ,
//! ```
//!
//! and back-substitute the interior from the interface values. When the
//! inner solve hits its iteration cap the best iterate is used and the
//! outer Krylov method absorbs the difference.
//!
//! On a single rank there is no interface system and the application
//! reduces to the plain U⁻¹L⁻¹ of the factored block.

use std::cell::RefCell;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::SchurOptions;
use crate::core::traits::LinearOp;
use crate::error::PmError;
use crate::matrix::partmat::write_pattern;
use crate::matrix::{BcsrMat, PartMat};
use crate::parallel::{Comm, Halo, HaloCtx, RowMap};
use crate::preconditioner::Preconditioner;
use crate::solver::GmresSolver;
use crate::utils::monitor::Monitor;
use crate::vec::ParVec;

pub(crate) struct SchurScratch {
    ctx: HaloCtx,
    x_ext: Vec<f64>,
    /// Full-length buffer the interface vector is embedded into before the
    /// gather; only its trailing slice is ever read.
    embed: Vec<f64>,
}

/// The implicit interface operator S = I + U_s⁻¹ L_s⁻¹ B_ext, assembled
/// per application from the preconditioner's factored block and the
/// matrix's coupling pieces. Never materialized.
pub struct SchurMat<'a> {
    apc: &'a BcsrMat,
    bext: &'a BcsrMat,
    halo: &'a Halo,
    rmap: &'a Arc<RowMap>,
    comm: &'a Arc<dyn Comm>,
    bsize: usize,
    /// Interior block rows of the factored block.
    split: usize,
    scratch: &'a RefCell<SchurScratch>,
}

impl LinearOp for SchurMat<'_> {
    fn mult(&self, x: &ParVec, y: &mut ParVec) -> Result<(), PmError> {
        let nvars = self.bsize * (self.apc.row_dim() - self.split);
        if x.local_len() != nvars || y.local_len() != nvars {
            return Err(PmError::StructureMismatch(
                "vector does not match the interface row space".to_string(),
            ));
        }
        let mut s = self.scratch.borrow_mut();
        let SchurScratch { ctx, x_ext, embed } = &mut *s;
        let off = self.bsize * self.split;
        embed[off..].copy_from_slice(x.as_slice());
        self.halo.begin_forward(ctx, embed);
        self.halo.end_forward(ctx, x_ext);
        // y = U_s⁻¹ L_s⁻¹ (B_ext · x_ext), then add the identity part.
        self.bext.mult(x_ext, y.as_mut_slice());
        self.apc.apply_partial_lower(y.as_mut_slice(), self.split);
        self.apc.apply_partial_upper(y.as_mut_slice(), self.split);
        y.axpy(1.0, x)
    }

    fn create_vec(&self) -> ParVec {
        ParVec::new(self.rmap.clone(), self.comm.clone(), self.bsize)
    }

    fn local_size(&self) -> (usize, usize) {
        let nvars = self.bsize * (self.apc.row_dim() - self.split);
        (nvars, nvars)
    }
}

struct InnerSchur {
    /// Dedicated row map over the interface rows only.
    srmap: Arc<RowMap>,
    gmres: GmresSolver,
    rvec: ParVec,
    wvec: ParVec,
    scratch: RefCell<SchurScratch>,
}

pub struct ApproxSchur {
    apc: BcsrMat,
    alpha: f64,
    /// Interface machinery; absent on a single rank, where the application
    /// degenerates to the local factorization.
    inner: Option<InnerSchur>,
}

impl ApproxSchur {
    /// Collective: the interface row map is built over the communicator.
    pub fn new(a: &PartMat, opts: &SchurOptions) -> Result<ApproxSchur, PmError> {
        let apc = BcsrMat::ilu_symbolic(a.diag_block(), opts.lev_fill, opts.fill)?;
        let inner = if a.comm().size() > 1 {
            let b = a.block_size();
            let halo = a.ext_halo();
            let srmap = RowMap::new(a.comm().as_ref(), a.interface_rows());
            let rvec = ParVec::new(srmap.clone(), a.comm().clone(), b);
            let wvec = rvec.clone();
            let scratch = RefCell::new(SchurScratch {
                ctx: halo.create_ctx(b),
                x_ext: vec![0.0; b * halo.dim()],
                embed: vec![0.0; b * a.local_rows()],
            });
            // A single cycle of inner_iters directions, no restarts.
            let gmres = GmresSolver::new(
                opts.inner_iters,
                opts.inner_rtol,
                opts.inner_atol,
                opts.inner_iters,
            );
            Some(InnerSchur {
                srmap,
                gmres,
                rvec,
                wvec,
                scratch,
            })
        } else {
            None
        };
        Ok(ApproxSchur {
            apc,
            alpha: opts.alpha,
            inner,
        })
    }

    /// Diagonal shift applied to the factored copy only.
    pub fn set_diag_shift(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    /// Forward the convergence reporter to the inner solve.
    pub fn set_monitor(&mut self, monitor: Box<dyn Monitor>) {
        if let Some(inner) = &mut self.inner {
            inner.gmres.set_monitor(monitor);
        }
    }

    pub fn factor_block(&self) -> &BcsrMat {
        &self.apc
    }

    /// Dump the factored pattern (diagonal zone from the fill pattern,
    /// off-diagonal zone from the coupling block).
    pub fn write_nz_pattern<W: Write>(&self, a: &PartMat, w: &mut W) -> io::Result<()> {
        let rank = a.comm().rank();
        let (lo, _hi) = a.row_map().owner_range(rank);
        write_pattern(
            w,
            rank,
            lo,
            a.interior_rows(),
            &self.apc,
            a.ext_block(),
            a.ext_halo().indices(),
        )
    }

    pub fn print_nz_pattern<P: AsRef<Path>>(&self, a: &PartMat, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(std::fs::File::create(path)?);
        self.write_nz_pattern(a, &mut w)
    }
}

impl Preconditioner<PartMat> for ApproxSchur {
    fn setup(&mut self, a: &PartMat) -> Result<(), PmError> {
        self.apc.copy_values(a.diag_block())?;
        if self.alpha != 0.0 {
            self.apc.add_diag(self.alpha)?;
        }
        self.apc.factor()
    }

    fn apply(&mut self, a: &PartMat, x: &ParVec, y: &mut ParVec) -> Result<(), PmError> {
        let n = self.apc.block_size() * self.apc.row_dim();
        if x.local_len() != n || y.local_len() != n {
            return Err(PmError::StructureMismatch(
                "vector does not match the factored block".to_string(),
            ));
        }
        match self.inner.as_mut() {
            Some(inner) => {
                let np = a.interior_rows();
                let start = a.block_size() * np;
                // Interior elimination: y = L⁻¹ x on the full block, then
                // finish the interface slice with U_s⁻¹.
                self.apc.apply_lower(x.as_slice(), y.as_mut_slice());
                self.apc
                    .apply_partial_upper(&mut y.as_mut_slice()[start..], np);

                inner
                    .rvec
                    .as_mut_slice()
                    .copy_from_slice(&y.as_slice()[start..]);
                let op = SchurMat {
                    apc: &self.apc,
                    bext: a.ext_block(),
                    halo: a.ext_halo(),
                    rmap: &inner.srmap,
                    comm: a.comm(),
                    bsize: a.block_size(),
                    split: np,
                    scratch: &inner.scratch,
                };
                // The best iterate stands in if the inner solve does not
                // converge.
                inner.wvec.zero_entries();
                inner
                    .gmres
                    .solve(&op, None, &inner.rvec, &mut inner.wvec)?;
                y.as_mut_slice()[start..].copy_from_slice(inner.wvec.as_slice());

                // Interior back-substitution from the interface values.
                self.apc.apply_factor_schur(y.as_mut_slice(), np);
            }
            None => self.apc.apply_factor(x.as_slice(), y.as_mut_slice()),
        }
        Ok(())
    }
}
