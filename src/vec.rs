//! Distributed block vectors.

use std::sync::Arc;

use crate::error::PmError;
use crate::parallel::{Comm, RowMap};

/// The owned slice of a global block vector: `bsize · local_dim` scalars
/// over a shared row map. Reductions are collective over the communicator.
#[derive(Clone)]
pub struct ParVec {
    rmap: Arc<RowMap>,
    comm: Arc<dyn Comm>,
    bsize: usize,
    vals: Vec<f64>,
}

impl ParVec {
    pub fn new(rmap: Arc<RowMap>, comm: Arc<dyn Comm>, bsize: usize) -> ParVec {
        let n = rmap.local_dim() * bsize;
        ParVec {
            rmap,
            comm,
            bsize,
            vals: vec![0.0; n],
        }
    }

    pub fn block_size(&self) -> usize {
        self.bsize
    }

    pub fn local_len(&self) -> usize {
        self.vals.len()
    }

    pub fn row_map(&self) -> &Arc<RowMap> {
        &self.rmap
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.vals
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.vals
    }

    pub fn zero_entries(&mut self) {
        self.vals.fill(0.0);
    }

    pub fn set_all(&mut self, v: f64) {
        self.vals.fill(v);
    }

    pub fn scale(&mut self, alpha: f64) {
        for v in &mut self.vals {
            *v *= alpha;
        }
    }

    fn check_compatible(&self, x: &ParVec) -> Result<(), PmError> {
        if !Arc::ptr_eq(&self.rmap, &x.rmap) || self.vals.len() != x.vals.len() {
            return Err(PmError::StructureMismatch(
                "vectors built over different row maps".to_string(),
            ));
        }
        Ok(())
    }

    pub fn copy_values(&mut self, x: &ParVec) -> Result<(), PmError> {
        self.check_compatible(x)?;
        self.vals.copy_from_slice(&x.vals);
        Ok(())
    }

    /// self += α·x
    pub fn axpy(&mut self, alpha: f64, x: &ParVec) -> Result<(), PmError> {
        self.check_compatible(x)?;
        for (s, &xv) in self.vals.iter_mut().zip(&x.vals) {
            *s += alpha * xv;
        }
        Ok(())
    }

    /// self = α·x + β·self
    pub fn axpby(&mut self, alpha: f64, beta: f64, x: &ParVec) -> Result<(), PmError> {
        self.check_compatible(x)?;
        for (s, &xv) in self.vals.iter_mut().zip(&x.vals) {
            *s = alpha * xv + beta * *s;
        }
        Ok(())
    }

    /// Global inner product. Collective.
    pub fn dot(&self, x: &ParVec) -> Result<f64, PmError> {
        self.check_compatible(x)?;
        let local: f64 = self.vals.iter().zip(&x.vals).map(|(&a, &b)| a * b).sum();
        Ok(self.comm.all_reduce_sum(local))
    }

    /// Global 2-norm. Collective.
    pub fn norm(&self) -> f64 {
        let local: f64 = self.vals.iter().map(|&v| v * v).sum();
        self.comm.all_reduce_sum(local).sqrt()
    }
}
