//! The distributed partitioned matrix.
//!
//! Each rank holds a square diagonal block A over its owned unknowns and a
//! coupling block B over copies of foreign interface unknowns,
//!
//! ```text
//! A_i u_i + [0; B_i] · u_ext = f_i
//! ```
//!
//! with the rank's interface unknowns ordered last: rows `[0, Np)` of A are
//! strictly interior, rows `[Np, N)` may couple off-rank, and B has one row
//! per interface row. A matrix-vector product gathers the foreign interface
//! values through the halo while the local product with A is in flight, then
//! adds B against the gathered buffer into the interface slice of the
//! result.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::traits::LinearOp;
use crate::error::PmError;
use crate::matrix::{BcMap, BcsrMat};
use crate::parallel::{Comm, Halo, HaloCtx, RowMap};
use crate::vec::ParVec;

struct HaloScratch {
    ctx: HaloCtx,
    x_ext: Vec<f64>,
}

pub struct PartMat {
    comm: Arc<dyn Comm>,
    rmap: Arc<RowMap>,
    aloc: BcsrMat,
    bext: BcsrMat,
    halo: Halo,
    bcs: Option<Arc<BcMap>>,
    // Exchange scratch mutated inside `mult`; one in-flight exchange per
    // matrix, callers serialize operations on a given object.
    scratch: RefCell<HaloScratch>,
    bsize: usize,
    n: usize,
    nc: usize,
    /// Scalar offset of the interface slice, bsize·(N − Nc).
    ext_offset: usize,
}

impl PartMat {
    /// Wire the diagonal block, the coupling block, and the halo together.
    /// Dimension mismatches between the pieces are construction errors.
    pub fn new(
        comm: Arc<dyn Comm>,
        rmap: Arc<RowMap>,
        aloc: BcsrMat,
        bext: BcsrMat,
        halo: Halo,
        bcs: Option<Arc<BcMap>>,
    ) -> Result<PartMat, PmError> {
        let n = aloc.row_dim();
        if aloc.col_dim() != n {
            return Err(PmError::Configuration(
                "diagonal block must be square".to_string(),
            ));
        }
        let nc = bext.row_dim();
        if nc > n {
            return Err(PmError::Configuration(format!(
                "more interface rows than owned rows: {} > {}",
                nc, n
            )));
        }
        if rmap.local_dim() != n {
            return Err(PmError::Configuration(format!(
                "row map owns {} block rows but the diagonal block has {}",
                rmap.local_dim(),
                n
            )));
        }
        if bext.col_dim() != halo.dim() {
            return Err(PmError::Configuration(format!(
                "coupling block has {} external columns but the halo gathers {}",
                bext.col_dim(),
                halo.dim()
            )));
        }
        let bsize = aloc.block_size();
        if bext.block_size() != bsize {
            return Err(PmError::Configuration(
                "block sizes of the diagonal and coupling blocks differ".to_string(),
            ));
        }
        let scratch = RefCell::new(HaloScratch {
            ctx: halo.create_ctx(bsize),
            x_ext: vec![0.0; bsize * halo.dim()],
        });
        Ok(PartMat {
            comm,
            rmap,
            aloc,
            bext,
            halo,
            bcs,
            scratch,
            bsize,
            n,
            nc,
            ext_offset: bsize * (n - nc),
        })
    }

    pub fn comm(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    pub fn row_map(&self) -> &Arc<RowMap> {
        &self.rmap
    }

    pub fn block_size(&self) -> usize {
        self.bsize
    }

    /// Owned block rows.
    pub fn local_rows(&self) -> usize {
        self.n
    }

    /// Interface block rows (the trailing rows).
    pub fn interface_rows(&self) -> usize {
        self.nc
    }

    /// Strictly-interior block rows.
    pub fn interior_rows(&self) -> usize {
        self.n - self.nc
    }

    pub fn diag_block(&self) -> &BcsrMat {
        &self.aloc
    }

    pub fn ext_block(&self) -> &BcsrMat {
        &self.bext
    }

    /// Assembly access to both blocks.
    pub fn blocks_mut(&mut self) -> (&mut BcsrMat, &mut BcsrMat) {
        (&mut self.aloc, &mut self.bext)
    }

    pub fn ext_halo(&self) -> &Halo {
        &self.halo
    }

    pub fn zero_entries(&mut self) {
        self.aloc.zero_entries();
        self.bext.zero_entries();
    }

    /// Copy values from a structurally identical matrix.
    pub fn copy_values(&mut self, other: &PartMat) -> Result<(), PmError> {
        self.aloc.copy_values(&other.aloc)?;
        self.bext.copy_values(&other.bext)
    }

    pub fn scale(&mut self, alpha: f64) {
        self.aloc.scale(alpha);
        self.bext.scale(alpha);
    }

    /// self += α·other
    pub fn axpy(&mut self, alpha: f64, other: &PartMat) -> Result<(), PmError> {
        self.aloc.axpy(alpha, &other.aloc)?;
        self.bext.axpy(alpha, &other.bext)
    }

    /// self = α·other + β·self
    pub fn axpby(&mut self, alpha: f64, beta: f64, other: &PartMat) -> Result<(), PmError> {
        self.aloc.axpby(alpha, beta, &other.aloc)?;
        self.bext.axpby(alpha, beta, &other.bext)
    }

    /// Diagonal shift; the coupling block has no diagonal.
    pub fn add_diag(&mut self, alpha: f64) -> Result<(), PmError> {
        self.aloc.add_diag(alpha)
    }

    /// Zero the constrained rows owned by this rank, substituting the
    /// identity on the diagonal of A. Interface rows are zeroed in B as
    /// well, with no diagonal substitution there.
    pub fn apply_bcs(&mut self) {
        let Some(bcs) = self.bcs.clone() else {
            return;
        };
        let np = self.n - self.nc;
        for (global, vars, _values) in bcs.iter() {
            if let Some(local) = self.rmap.to_local(global) {
                self.aloc.zero_row(local, vars, true);
                if local >= np {
                    self.bext.zero_row(local - np, vars, false);
                }
            }
        }
    }

    fn check_vec(&self, v: &ParVec) -> Result<(), PmError> {
        if v.local_len() != self.bsize * self.n || !Arc::ptr_eq(v.row_map(), &self.rmap) {
            return Err(PmError::StructureMismatch(
                "vector does not match the matrix row map".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the non-zero block pattern in global indices: a diagonal zone,
    /// and an off-diagonal zone when the coupling block is non-empty.
    pub fn write_nz_pattern<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let rank = self.comm.rank();
        let (lo, _hi) = self.rmap.owner_range(rank);
        write_pattern(
            w,
            rank,
            lo,
            self.n - self.nc,
            &self.aloc,
            &self.bext,
            self.halo.indices(),
        )
    }

    /// Dump the non-zero pattern to a per-rank file.
    pub fn print_nz_pattern<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_nz_pattern(&mut w)
    }
}

impl LinearOp for PartMat {
    /// y = A·x + [0; B·x_ext]. The halo runs while the local product is
    /// computed; the gathered buffer is read only after the exchange
    /// completes.
    fn mult(&self, x: &ParVec, y: &mut ParVec) -> Result<(), PmError> {
        self.check_vec(x)?;
        self.check_vec(y)?;
        let mut s = self.scratch.borrow_mut();
        let HaloScratch { ctx, x_ext } = &mut *s;
        self.halo.begin_forward(ctx, x.as_slice());
        self.aloc.mult(x.as_slice(), y.as_mut_slice());
        self.halo.end_forward(ctx, x_ext);
        self.bext
            .mult_add(x_ext, &mut y.as_mut_slice()[self.ext_offset..]);
        Ok(())
    }

    fn create_vec(&self) -> ParVec {
        ParVec::new(self.rmap.clone(), self.comm.clone(), self.bsize)
    }

    fn local_size(&self) -> (usize, usize) {
        (self.bsize * self.n, self.bsize * self.n)
    }
}

/// Shared pattern writer: the preconditioner dumps its factored pattern
/// through the same format.
pub(crate) fn write_pattern<W: Write>(
    w: &mut W,
    rank: usize,
    lo: usize,
    np: usize,
    a: &BcsrMat,
    b: &BcsrMat,
    ext_ids: &[usize],
) -> io::Result<()> {
    write!(
        w,
        "VARIABLES = \"i\", \"j\" \nZONE T = \"Diagonal block {}\"\n",
        rank
    )?;
    let (rowp, cols, _) = a.arrays();
    for i in 0..a.row_dim() {
        for p in rowp[i]..rowp[i + 1] {
            writeln!(w, "{} {}", i + lo, cols[p] + lo)?;
        }
    }
    let (browp, bcols, _) = b.arrays();
    if b.nnz() > 0 {
        write!(w, "ZONE T = \"Off-diagonal block {}\"\n", rank)?;
        for i in 0..b.row_dim() {
            for p in browp[i]..browp[i + 1] {
                writeln!(w, "{} {}", i + np + lo, ext_ids[bcols[p]])?;
            }
        }
    }
    Ok(())
}
