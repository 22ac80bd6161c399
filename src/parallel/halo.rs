//! Forward halo exchange of interface block values.
//!
//! A `Halo` gathers copies of foreign interface blocks into a contiguous
//! external buffer. The exchange is split into `begin_forward` (pack and
//! post the sends) and `end_forward` (wait for the receives) so a local
//! kernel can run while the messages are in flight; the destination buffer
//! is consistent only after `end_forward` returns.

use std::sync::Arc;

use crate::error::PmError;

use super::{Comm, RowMap, HALO_DATA_TAG, HALO_SETUP_TAG};

pub struct Halo {
    comm: Arc<dyn Comm>,
    /// Global block ids of the foreign values, in buffer order.
    indices: Vec<usize>,
    /// Per peer: the local block ids to pack and send there.
    send_plan: Vec<(usize, Vec<usize>)>,
    /// Per peer: the buffer positions its message scatters into.
    recv_plan: Vec<(usize, Vec<usize>)>,
}

/// Scratch for one concurrent exchange.
pub struct HaloCtx {
    bsize: usize,
    send_bufs: Vec<Vec<f64>>,
    recv_bufs: Vec<Vec<f64>>,
}

impl Halo {
    /// Build the exchange plan for the foreign blocks named by
    /// `ext_indices` (global block ids). Collective: every rank calls with
    /// its own, possibly empty, request list, and the constructor trades
    /// request lists so each owner learns what to pack for whom.
    pub fn new(
        comm: Arc<dyn Comm>,
        rmap: &RowMap,
        ext_indices: Vec<usize>,
    ) -> Result<Halo, PmError> {
        let rank = comm.rank();
        let size = comm.size();

        // Group the requests by owning rank, remembering where each value
        // lands in the external buffer.
        let mut wants: Vec<Vec<usize>> = (0..size).map(|_| Vec::new()).collect();
        let mut positions: Vec<Vec<usize>> = (0..size).map(|_| Vec::new()).collect();
        for (pos, &g) in ext_indices.iter().enumerate() {
            if g >= rmap.global_dim() {
                return Err(PmError::Configuration(format!(
                    "external block {} is outside the global index space",
                    g
                )));
            }
            let owner = rmap.owner_of(g);
            if owner == rank {
                return Err(PmError::Configuration(format!(
                    "external block {} is owned locally",
                    g
                )));
            }
            wants[owner].push(g);
            positions[owner].push(pos);
        }

        for peer in 0..size {
            if peer != rank {
                comm.send_indices(peer, HALO_SETUP_TAG, &wants[peer]);
            }
        }

        let (lo, hi) = rmap.owner_range(rank);
        let mut send_plan = Vec::new();
        for peer in 0..size {
            if peer == rank {
                continue;
            }
            let req = comm.recv_indices(peer, HALO_SETUP_TAG);
            if req.is_empty() {
                continue;
            }
            let mut locals = Vec::with_capacity(req.len());
            for g in req {
                if g < lo || g >= hi {
                    return Err(PmError::Communication(format!(
                        "rank {} requested block {} not owned by rank {}",
                        peer, g, rank
                    )));
                }
                locals.push(g - lo);
            }
            send_plan.push((peer, locals));
        }

        let recv_plan = positions
            .into_iter()
            .enumerate()
            .filter(|(_, p)| !p.is_empty())
            .collect();

        Ok(Halo {
            comm,
            indices: ext_indices,
            send_plan,
            recv_plan,
        })
    }

    /// Number of foreign blocks gathered by this halo.
    pub fn dim(&self) -> usize {
        self.indices.len()
    }

    /// Global block ids of the foreign values, in buffer order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn comm(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    /// Allocate scratch for one concurrent exchange of blocks of `bsize`.
    pub fn create_ctx(&self, bsize: usize) -> HaloCtx {
        HaloCtx {
            bsize,
            send_bufs: self
                .send_plan
                .iter()
                .map(|(_, l)| vec![0.0; bsize * l.len()])
                .collect(),
            recv_bufs: self
                .recv_plan
                .iter()
                .map(|(_, p)| vec![0.0; bsize * p.len()])
                .collect(),
        }
    }

    /// Pack the owned values out of `src` and post the sends. Does not
    /// block; pair with `end_forward` before reading the gathered buffer.
    pub fn begin_forward(&self, ctx: &mut HaloCtx, src: &[f64]) {
        let b = ctx.bsize;
        for ((peer, locals), buf) in self.send_plan.iter().zip(ctx.send_bufs.iter_mut()) {
            for (k, &lb) in locals.iter().enumerate() {
                buf[k * b..(k + 1) * b].copy_from_slice(&src[lb * b..(lb + 1) * b]);
            }
            self.comm.send_scalars(*peer, HALO_DATA_TAG, buf);
        }
    }

    /// Complete the exchange, scattering the received values into `dst`.
    pub fn end_forward(&self, ctx: &mut HaloCtx, dst: &mut [f64]) {
        let b = ctx.bsize;
        for ((peer, positions), buf) in self.recv_plan.iter().zip(ctx.recv_bufs.iter_mut()) {
            self.comm.recv_scalars(*peer, HALO_DATA_TAG, buf);
            for (k, &pos) in positions.iter().enumerate() {
                dst[pos * b..(pos + 1) * b].copy_from_slice(&buf[k * b..(k + 1) * b]);
            }
        }
    }
}
