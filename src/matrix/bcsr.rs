//! Block compressed-sparse-row matrices and their numeric kernels.
//!
//! Storage is CSR over fixed b×b dense blocks kept row-major, with the
//! column indices of each row sorted. The same type serves both as the
//! assembled matrix and, after [`BcsrMat::factor`], as its incomplete LU
//! factorization: the strictly-lower entries hold the multipliers of a unit
//! lower factor, the upper entries hold U, and each diagonal block is stored
//! INVERTED; every solve kernel below relies on that contract.
//!
//! The fill pattern of the factorization is produced separately by
//! [`BcsrMat::ilu_symbolic`] with the classical level-of-fill rule
//! lev(i,j) = min_k(lev(i,k) + lev(k,j) + 1), entries kept while the level
//! stays ≤ k (Saad, Iterative Methods for Sparse Linear Systems, §10.3).
//!
//! Partial solves split the row space at `var_offset`: the lower/upper pair
//! acts on the trailing rows with slice-relative indexing, and
//! [`BcsrMat::apply_factor_schur`] back-solves the leading rows of a
//! full-length vector treating the trailing entries as known.

use crate::error::PmError;

// ---- dense b×b block helpers ----

/// y += A·x
#[inline]
fn blk_mult_add(y: &mut [f64], a: &[f64], x: &[f64], b: usize) {
    for r in 0..b {
        let ar = &a[r * b..(r + 1) * b];
        let mut s = 0.0;
        for c in 0..b {
            s += ar[c] * x[c];
        }
        y[r] += s;
    }
}

/// y -= A·x
#[inline]
fn blk_mult_sub(y: &mut [f64], a: &[f64], x: &[f64], b: usize) {
    for r in 0..b {
        let ar = &a[r * b..(r + 1) * b];
        let mut s = 0.0;
        for c in 0..b {
            s += ar[c] * x[c];
        }
        y[r] -= s;
    }
}

/// C = A·B
#[inline]
fn blk_gemm(c: &mut [f64], a: &[f64], bm: &[f64], b: usize) {
    for r in 0..b {
        for j in 0..b {
            let mut s = 0.0;
            for k in 0..b {
                s += a[r * b + k] * bm[k * b + j];
            }
            c[r * b + j] = s;
        }
    }
}

/// C -= A·B
#[inline]
fn blk_gemm_sub(c: &mut [f64], a: &[f64], bm: &[f64], b: usize) {
    for r in 0..b {
        for j in 0..b {
            let mut s = 0.0;
            for k in 0..b {
                s += a[r * b + k] * bm[k * b + j];
            }
            c[r * b + j] -= s;
        }
    }
}

/// Invert `a` in place, Gauss-Jordan with partial pivoting. `work` is a
/// b×b scratch. Fails on a zero pivot.
fn blk_invert(a: &mut [f64], work: &mut [f64], b: usize) -> Result<(), ()> {
    work.copy_from_slice(a);
    a.fill(0.0);
    for k in 0..b {
        a[k * b + k] = 1.0;
    }
    for k in 0..b {
        let mut piv = k;
        for r in (k + 1)..b {
            if work[r * b + k].abs() > work[piv * b + k].abs() {
                piv = r;
            }
        }
        if work[piv * b + k] == 0.0 {
            return Err(());
        }
        if piv != k {
            for c in 0..b {
                work.swap(k * b + c, piv * b + c);
                a.swap(k * b + c, piv * b + c);
            }
        }
        let inv = 1.0 / work[k * b + k];
        for c in 0..b {
            work[k * b + c] *= inv;
            a[k * b + c] *= inv;
        }
        for r in 0..b {
            if r == k {
                continue;
            }
            let f = work[r * b + k];
            if f == 0.0 {
                continue;
            }
            for c in 0..b {
                work[r * b + c] -= f * work[k * b + c];
                a[r * b + c] -= f * a[k * b + c];
            }
        }
    }
    Ok(())
}

pub struct BcsrMat {
    bsize: usize,
    nrows: usize,
    ncols: usize,
    rowp: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    /// Entry index of (i, i) per row; `usize::MAX` when absent.
    diag: Vec<usize>,
    factored: bool,
}

impl BcsrMat {
    /// Build a zero matrix over a block pattern. Column indices must be
    /// sorted and unique within each row.
    pub fn from_pattern(
        bsize: usize,
        nrows: usize,
        ncols: usize,
        rowp: Vec<usize>,
        cols: Vec<usize>,
    ) -> Result<BcsrMat, PmError> {
        if bsize == 0 {
            return Err(PmError::Configuration("block size must be positive".to_string()));
        }
        if rowp.len() != nrows + 1 || rowp[0] != 0 || rowp[nrows] != cols.len() {
            return Err(PmError::Configuration(
                "row pointer array does not describe the column array".to_string(),
            ));
        }
        for i in 0..nrows {
            if rowp[i] > rowp[i + 1] {
                return Err(PmError::Configuration(
                    "row pointer array must be non-decreasing".to_string(),
                ));
            }
            let row = &cols[rowp[i]..rowp[i + 1]];
            for (k, &c) in row.iter().enumerate() {
                if c >= ncols {
                    return Err(PmError::Configuration(format!(
                        "column {} out of range in block row {}",
                        c, i
                    )));
                }
                if k > 0 && row[k - 1] >= c {
                    return Err(PmError::Configuration(format!(
                        "columns of block row {} are not sorted",
                        i
                    )));
                }
            }
        }
        let diag = (0..nrows)
            .map(|i| {
                let row = &cols[rowp[i]..rowp[i + 1]];
                match row.binary_search(&i) {
                    Ok(k) => rowp[i] + k,
                    Err(_) => usize::MAX,
                }
            })
            .collect();
        let nnz = cols.len();
        Ok(BcsrMat {
            bsize,
            nrows,
            ncols,
            rowp,
            cols,
            vals: vec![0.0; bsize * bsize * nnz],
            diag,
            factored: false,
        })
    }

    /// Build the ILU(k) pattern of `a`: same shape, entries of `a` at level
    /// zero plus fill up to level `lev_fill`. `fill` (≥ 1.0) is a storage
    /// reservation hint for the grown pattern. Values start at zero; follow
    /// with [`copy_values`](Self::copy_values) and [`factor`](Self::factor).
    pub fn ilu_symbolic(a: &BcsrMat, lev_fill: usize, fill: f64) -> Result<BcsrMat, PmError> {
        if a.nrows != a.ncols {
            return Err(PmError::Configuration(
                "incomplete factorization requires a square matrix".to_string(),
            ));
        }
        let n = a.nrows;
        let est = (a.nnz() as f64 * fill.max(1.0)) as usize;
        let mut rowp = Vec::with_capacity(n + 1);
        let mut cols: Vec<usize> = Vec::with_capacity(est);
        let mut levels: Vec<u32> = Vec::with_capacity(est);
        rowp.push(0);

        for i in 0..n {
            if a.diag[i] == usize::MAX {
                return Err(PmError::FactorError(format!(
                    "no diagonal block in row {}",
                    i
                )));
            }
            let mut wcols: Vec<usize> = a.cols[a.rowp[i]..a.rowp[i + 1]].to_vec();
            let mut wlevs: Vec<u32> = vec![0; wcols.len()];

            // Eliminate below-diagonal entries in column order; rows < i are
            // already final, so their U parts can be merged directly.
            let mut kp = 0;
            while kp < wcols.len() && wcols[kp] < i {
                let k = wcols[kp];
                let lik = wlevs[kp];
                let row_k = &cols[rowp[k]..rowp[k + 1]];
                let dk = rowp[k]
                    + row_k
                        .binary_search(&k)
                        .expect("diagonal kept at level zero");
                for q in (dk + 1)..rowp[k + 1] {
                    let j = cols[q];
                    let lev = lik + levels[q] + 1;
                    if (lev as usize) <= lev_fill {
                        match wcols.binary_search(&j) {
                            Ok(pos) => wlevs[pos] = wlevs[pos].min(lev),
                            Err(pos) => {
                                wcols.insert(pos, j);
                                wlevs.insert(pos, lev);
                            }
                        }
                    }
                }
                kp += 1;
            }

            cols.extend_from_slice(&wcols);
            levels.extend_from_slice(&wlevs);
            rowp.push(cols.len());
        }

        BcsrMat::from_pattern(a.bsize, n, n, rowp, cols)
    }

    // ---- introspection ----

    pub fn row_dim(&self) -> usize {
        self.nrows
    }

    pub fn col_dim(&self) -> usize {
        self.ncols
    }

    pub fn block_size(&self) -> usize {
        self.bsize
    }

    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    pub fn is_factored(&self) -> bool {
        self.factored
    }

    /// Raw (rowp, cols, values) arrays; values are b×b row-major blocks.
    pub fn arrays(&self) -> (&[usize], &[usize], &[f64]) {
        (&self.rowp, &self.cols, &self.vals)
    }

    fn find(&self, i: usize, j: usize) -> Option<usize> {
        let row = &self.cols[self.rowp[i]..self.rowp[i + 1]];
        row.binary_search(&j).ok().map(|k| self.rowp[i] + k)
    }

    pub fn block(&self, i: usize, j: usize) -> Option<&[f64]> {
        let bb = self.bsize * self.bsize;
        self.find(i, j).map(|p| &self.vals[p * bb..(p + 1) * bb])
    }

    /// Overwrite the block at (i, j); the entry must exist in the pattern.
    pub fn set_block(&mut self, i: usize, j: usize, block: &[f64]) -> Result<(), PmError> {
        let bb = self.bsize * self.bsize;
        assert_eq!(block.len(), bb);
        let p = self.find(i, j).ok_or_else(|| {
            PmError::StructureMismatch(format!("no entry at block ({}, {})", i, j))
        })?;
        self.vals[p * bb..(p + 1) * bb].copy_from_slice(block);
        self.factored = false;
        Ok(())
    }

    /// Accumulate into the block at (i, j); the entry must exist.
    pub fn add_block(&mut self, i: usize, j: usize, block: &[f64]) -> Result<(), PmError> {
        let bb = self.bsize * self.bsize;
        assert_eq!(block.len(), bb);
        let p = self.find(i, j).ok_or_else(|| {
            PmError::StructureMismatch(format!("no entry at block ({}, {})", i, j))
        })?;
        for (v, &a) in self.vals[p * bb..(p + 1) * bb].iter_mut().zip(block) {
            *v += a;
        }
        self.factored = false;
        Ok(())
    }

    // ---- value operations ----

    pub fn zero_entries(&mut self) {
        self.vals.fill(0.0);
        self.factored = false;
    }

    /// Copy the values of `src`; the destination pattern must contain every
    /// source entry, and destination fill entries absent from the source are
    /// zeroed.
    pub fn copy_values(&mut self, src: &BcsrMat) -> Result<(), PmError> {
        if self.nrows != src.nrows || self.ncols != src.ncols || self.bsize != src.bsize {
            return Err(PmError::StructureMismatch(
                "matrix dimensions differ".to_string(),
            ));
        }
        let bb = self.bsize * self.bsize;
        self.vals.fill(0.0);
        for i in 0..self.nrows {
            let mut t = self.rowp[i];
            let te = self.rowp[i + 1];
            for p in src.rowp[i]..src.rowp[i + 1] {
                let c = src.cols[p];
                while t < te && self.cols[t] < c {
                    t += 1;
                }
                if t == te || self.cols[t] != c {
                    return Err(PmError::StructureMismatch(format!(
                        "source entry ({}, {}) absent from destination pattern",
                        i, c
                    )));
                }
                self.vals[t * bb..(t + 1) * bb].copy_from_slice(&src.vals[p * bb..(p + 1) * bb]);
                t += 1;
            }
        }
        self.factored = false;
        Ok(())
    }

    pub fn scale(&mut self, alpha: f64) {
        for v in &mut self.vals {
            *v *= alpha;
        }
        self.factored = false;
    }

    fn check_same_pattern(&self, x: &BcsrMat) -> Result<(), PmError> {
        if self.bsize != x.bsize || self.rowp != x.rowp || self.cols != x.cols {
            return Err(PmError::StructureMismatch(
                "matrix patterns differ".to_string(),
            ));
        }
        Ok(())
    }

    /// self += α·x; identical patterns required.
    pub fn axpy(&mut self, alpha: f64, x: &BcsrMat) -> Result<(), PmError> {
        self.check_same_pattern(x)?;
        for (v, &xv) in self.vals.iter_mut().zip(&x.vals) {
            *v += alpha * xv;
        }
        self.factored = false;
        Ok(())
    }

    /// self = α·x + β·self; identical patterns required.
    pub fn axpby(&mut self, alpha: f64, beta: f64, x: &BcsrMat) -> Result<(), PmError> {
        self.check_same_pattern(x)?;
        for (v, &xv) in self.vals.iter_mut().zip(&x.vals) {
            *v = alpha * xv + beta * *v;
        }
        self.factored = false;
        Ok(())
    }

    /// Add α to every scalar diagonal entry.
    pub fn add_diag(&mut self, alpha: f64) -> Result<(), PmError> {
        let b = self.bsize;
        let bb = b * b;
        for i in 0..self.nrows {
            let d = self.diag[i];
            if d == usize::MAX {
                return Err(PmError::StructureMismatch(format!(
                    "no diagonal block in row {}",
                    i
                )));
            }
            for k in 0..b {
                self.vals[d * bb + k * b + k] += alpha;
            }
        }
        self.factored = false;
        Ok(())
    }

    /// Zero the scalar rows `vars` of block row `row`; with `ident`, put
    /// 1.0 on the matching diagonal entries.
    pub fn zero_row(&mut self, row: usize, vars: &[usize], ident: bool) {
        let b = self.bsize;
        let bb = b * b;
        for p in self.rowp[row]..self.rowp[row + 1] {
            let on_diag = self.cols[p] == row;
            let blk = &mut self.vals[p * bb..(p + 1) * bb];
            for &v in vars {
                debug_assert!(v < b);
                blk[v * b..(v + 1) * b].fill(0.0);
                if ident && on_diag {
                    blk[v * b + v] = 1.0;
                }
            }
        }
        self.factored = false;
    }

    // ---- multiplication kernels ----

    /// y = A·x
    pub fn mult(&self, x: &[f64], y: &mut [f64]) {
        let b = self.bsize;
        assert_eq!(x.len(), b * self.ncols);
        assert_eq!(y.len(), b * self.nrows);
        y.fill(0.0);
        self.mult_add(x, y);
    }

    /// y += A·x
    pub fn mult_add(&self, x: &[f64], y: &mut [f64]) {
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * self.ncols);
        assert_eq!(y.len(), b * self.nrows);
        for i in 0..self.nrows {
            let yi = &mut y[i * b..(i + 1) * b];
            for p in self.rowp[i]..self.rowp[i + 1] {
                let j = self.cols[p];
                blk_mult_add(yi, &self.vals[p * bb..(p + 1) * bb], &x[j * b..(j + 1) * b], b);
            }
        }
    }

    // ---- relaxation ----

    /// Invert each diagonal block; the returned slab is consumed by the SOR
    /// sweeps.
    pub fn factor_diag(&self) -> Result<Vec<f64>, PmError> {
        let b = self.bsize;
        let bb = b * b;
        let mut dinv = vec![0.0; self.nrows * bb];
        let mut work = vec![0.0; bb];
        for i in 0..self.nrows {
            let d = self.diag[i];
            if d == usize::MAX {
                return Err(PmError::FactorError(format!(
                    "no diagonal block in row {}",
                    i
                )));
            }
            let out = &mut dinv[i * bb..(i + 1) * bb];
            out.copy_from_slice(&self.vals[d * bb..(d + 1) * bb]);
            blk_invert(out, &mut work, b).map_err(|_| PmError::ZeroPivot(i))?;
        }
        Ok(dinv)
    }

    /// y_i ← (1−ω)·y_i + ω·D_i⁻¹·(rhs_i − Σ_{j≠i} A_ij y_j)
    #[inline]
    fn sor_row(
        &self,
        i: usize,
        dinv: &[f64],
        rhs: &[f64],
        y: &mut [f64],
        omega: f64,
        t: &mut [f64],
        z: &mut [f64],
    ) {
        let b = self.bsize;
        let bb = b * b;
        t.copy_from_slice(&rhs[i * b..(i + 1) * b]);
        for p in self.rowp[i]..self.rowp[i + 1] {
            let j = self.cols[p];
            if j == i {
                continue;
            }
            blk_mult_sub(t, &self.vals[p * bb..(p + 1) * bb], &y[j * b..(j + 1) * b], b);
        }
        z.fill(0.0);
        blk_mult_add(z, &dinv[i * bb..(i + 1) * bb], t, b);
        for k in 0..b {
            let yi = &mut y[i * b + k];
            *yi += omega * (z[k] - *yi);
        }
    }

    fn sor_sweep(
        &self,
        dinv: &[f64],
        rhs: &[f64],
        y: &mut [f64],
        omega: f64,
        backward: bool,
        t: &mut [f64],
        z: &mut [f64],
    ) {
        if backward {
            for i in (0..self.nrows).rev() {
                self.sor_row(i, dinv, rhs, y, omega, t, z);
            }
        } else {
            for i in 0..self.nrows {
                self.sor_row(i, dinv, rhs, y, omega, t, z);
            }
        }
    }

    /// `iters` forward SOR sweeps of A·y = rhs, updating y in place.
    pub fn apply_sor(&self, dinv: &[f64], rhs: &[f64], y: &mut [f64], omega: f64, iters: usize) {
        let b = self.bsize;
        assert_eq!(self.nrows, self.ncols);
        assert_eq!(dinv.len(), self.nrows * b * b);
        assert_eq!(rhs.len(), b * self.nrows);
        assert_eq!(y.len(), b * self.nrows);
        let mut t = vec![0.0; b];
        let mut z = vec![0.0; b];
        for _ in 0..iters {
            self.sor_sweep(dinv, rhs, y, omega, false, &mut t, &mut z);
        }
    }

    /// `iters` symmetric (forward then backward) SOR sweeps.
    pub fn apply_ssor(&self, dinv: &[f64], rhs: &[f64], y: &mut [f64], omega: f64, iters: usize) {
        let b = self.bsize;
        assert_eq!(self.nrows, self.ncols);
        assert_eq!(dinv.len(), self.nrows * b * b);
        assert_eq!(rhs.len(), b * self.nrows);
        assert_eq!(y.len(), b * self.nrows);
        let mut t = vec![0.0; b];
        let mut z = vec![0.0; b];
        for _ in 0..iters {
            self.sor_sweep(dinv, rhs, y, omega, false, &mut t, &mut z);
            self.sor_sweep(dinv, rhs, y, omega, true, &mut t, &mut z);
        }
    }

    // ---- incomplete factorization ----

    /// Numeric ILU over the existing pattern, in place. Diagonal blocks end
    /// up inverted.
    pub fn factor(&mut self) -> Result<(), PmError> {
        if self.nrows != self.ncols {
            return Err(PmError::FactorError(
                "factorization requires a square matrix".to_string(),
            ));
        }
        let b = self.bsize;
        let bb = b * b;
        let mut lik = vec![0.0; bb];
        let mut ub = vec![0.0; bb];
        let mut work = vec![0.0; bb];
        for i in 0..self.nrows {
            let dpos = self.diag[i];
            if dpos == usize::MAX {
                return Err(PmError::FactorError(format!(
                    "no diagonal block in row {}",
                    i
                )));
            }
            for p in self.rowp[i]..dpos {
                let k = self.cols[p];
                let dk = self.diag[k];
                // L_ik = Ã_ik · U_kk⁻¹; the inverse is already in place.
                blk_gemm(
                    &mut lik,
                    &self.vals[p * bb..(p + 1) * bb],
                    &self.vals[dk * bb..(dk + 1) * bb],
                    b,
                );
                self.vals[p * bb..(p + 1) * bb].copy_from_slice(&lik);
                // Ã_ij -= L_ik · U_kj over the shared pattern only.
                let mut q = dk + 1;
                let mut t = p + 1;
                let ke = self.rowp[k + 1];
                let re = self.rowp[i + 1];
                while q < ke && t < re {
                    if self.cols[q] == self.cols[t] {
                        ub.copy_from_slice(&self.vals[q * bb..(q + 1) * bb]);
                        blk_gemm_sub(&mut self.vals[t * bb..(t + 1) * bb], &lik, &ub, b);
                        q += 1;
                        t += 1;
                    } else if self.cols[q] < self.cols[t] {
                        q += 1;
                    } else {
                        t += 1;
                    }
                }
            }
            blk_invert(&mut self.vals[dpos * bb..(dpos + 1) * bb], &mut work, b)
                .map_err(|_| PmError::ZeroPivot(i))?;
        }
        self.factored = true;
        Ok(())
    }

    // ---- solves against the factorization ----

    /// y = U⁻¹ L⁻¹ x
    pub fn apply_factor(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), y.len());
        y.copy_from_slice(x);
        self.apply_factor_in_place(y);
    }

    /// x = U⁻¹ L⁻¹ x
    pub fn apply_factor_in_place(&self, x: &mut [f64]) {
        assert!(self.factored, "matrix is not factored");
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * self.nrows);
        let mut t = vec![0.0; b];
        let mut z = vec![0.0; b];
        // forward, unit lower
        for i in 0..self.nrows {
            t.copy_from_slice(&x[i * b..(i + 1) * b]);
            for p in self.rowp[i]..self.diag[i] {
                let j = self.cols[p];
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &x[j * b..(j + 1) * b], b);
            }
            x[i * b..(i + 1) * b].copy_from_slice(&t);
        }
        // backward, inverted diagonal
        for i in (0..self.nrows).rev() {
            t.copy_from_slice(&x[i * b..(i + 1) * b]);
            for p in self.diag[i] + 1..self.rowp[i + 1] {
                let j = self.cols[p];
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &x[j * b..(j + 1) * b], b);
            }
            z.fill(0.0);
            blk_mult_add(&mut z, &self.vals[self.diag[i] * bb..(self.diag[i] + 1) * bb], &t, b);
            x[i * b..(i + 1) * b].copy_from_slice(&z);
        }
    }

    /// y = L⁻¹ x over the full row space.
    pub fn apply_lower(&self, x: &[f64], y: &mut [f64]) {
        assert!(self.factored, "matrix is not factored");
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * self.nrows);
        assert_eq!(y.len(), b * self.nrows);
        let mut t = vec![0.0; b];
        for i in 0..self.nrows {
            t.copy_from_slice(&x[i * b..(i + 1) * b]);
            for p in self.rowp[i]..self.diag[i] {
                let j = self.cols[p];
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &y[j * b..(j + 1) * b], b);
            }
            y[i * b..(i + 1) * b].copy_from_slice(&t);
        }
    }

    /// Forward solve restricted to rows `[var_offset, n)`. `x` holds only
    /// that trailing slice; couplings to columns below the split are
    /// skipped.
    pub fn apply_partial_lower(&self, x: &mut [f64], var_offset: usize) {
        assert!(self.factored, "matrix is not factored");
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * (self.nrows - var_offset));
        let mut t = vec![0.0; b];
        for i in (var_offset + 1)..self.nrows {
            let xi = (i - var_offset) * b;
            t.copy_from_slice(&x[xi..xi + b]);
            for p in self.rowp[i]..self.diag[i] {
                let j = self.cols[p];
                if j < var_offset {
                    continue;
                }
                let xj = (j - var_offset) * b;
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &x[xj..xj + b], b);
            }
            x[xi..xi + b].copy_from_slice(&t);
        }
    }

    /// Back solve restricted to rows `[var_offset, n)`; `x` holds only that
    /// trailing slice.
    pub fn apply_partial_upper(&self, x: &mut [f64], var_offset: usize) {
        assert!(self.factored, "matrix is not factored");
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * (self.nrows - var_offset));
        let mut t = vec![0.0; b];
        let mut z = vec![0.0; b];
        for i in (var_offset..self.nrows).rev() {
            let xi = (i - var_offset) * b;
            t.copy_from_slice(&x[xi..xi + b]);
            for p in self.diag[i] + 1..self.rowp[i + 1] {
                let j = self.cols[p];
                let xj = (j - var_offset) * b;
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &x[xj..xj + b], b);
            }
            z.fill(0.0);
            blk_mult_add(&mut z, &self.vals[self.diag[i] * bb..(self.diag[i] + 1) * bb], &t, b);
            x[xi..xi + b].copy_from_slice(&z);
        }
    }

    /// Back solve of the leading rows `[0, var_offset)` of the full-length
    /// `x`, treating the trailing entries as known:
    /// x_b := U_b⁻¹ (L_b⁻¹ f − L_b⁻¹ E · x_s).
    pub fn apply_factor_schur(&self, x: &mut [f64], var_offset: usize) {
        assert!(self.factored, "matrix is not factored");
        let b = self.bsize;
        let bb = b * b;
        assert_eq!(x.len(), b * self.nrows);
        let mut t = vec![0.0; b];
        let mut z = vec![0.0; b];
        for i in (0..var_offset).rev() {
            t.copy_from_slice(&x[i * b..(i + 1) * b]);
            for p in self.diag[i] + 1..self.rowp[i + 1] {
                let j = self.cols[p];
                blk_mult_sub(&mut t, &self.vals[p * bb..(p + 1) * bb], &x[j * b..(j + 1) * b], b);
            }
            z.fill(0.0);
            blk_mult_add(&mut z, &self.vals[self.diag[i] * bb..(self.diag[i] + 1) * bb], &t, b);
            x[i * b..(i + 1) * b].copy_from_slice(&z);
        }
    }
}
