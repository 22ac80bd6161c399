//! Shared fixtures: a block-tridiagonal chain partitioned over ranks with
//! interface-last local ordering, and a thread-per-rank runner over the
//! in-process communicator.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread;

use partmat::{BcMap, BcsrMat, ChannelComm, Comm, Halo, PartMat, RowMap, SerialComm};

/// Run `f` on every rank of an in-process universe, returning the results
/// in rank order.
pub fn run_ranks<T, F>(p: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, Arc<ChannelComm>) -> T + Send + Sync + 'static,
{
    let comms = ChannelComm::universe(p);
    let f = Arc::new(f);
    let handles: Vec<_> = comms
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            let f = f.clone();
            thread::spawn(move || f(rank, comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// Local ordering of the `m` physical nodes a rank owns on a chain of `p`
/// ranks: interior nodes first, partition-edge nodes last. Returns the
/// physical offsets in local order and the interface count.
pub fn chain_ordering(rank: usize, m: usize, p: usize) -> (Vec<usize>, usize) {
    let has_left = rank > 0;
    let has_right = rank + 1 < p;
    let mut interface = Vec::new();
    if has_left {
        interface.push(0);
    }
    if has_right && !(m == 1 && has_left) {
        interface.push(m - 1);
    }
    let mut order: Vec<usize> = (0..m).filter(|k| !interface.contains(k)).collect();
    order.extend_from_slice(&interface);
    (order, interface.len())
}

/// Global block index of physical chain node `phys` under the
/// interface-last ordering.
pub fn phys_to_global(phys: usize, m: usize, p: usize) -> usize {
    let owner = phys / m;
    let k = phys % m;
    let (order, _) = chain_ordering(owner, m, p);
    owner * m + order.iter().position(|&x| x == k).unwrap()
}

pub struct ChainBlocks {
    pub aloc: BcsrMat,
    pub bext: BcsrMat,
    pub ext: Vec<usize>,
    pub nc: usize,
}

/// One rank's pieces of the block-tridiagonal chain: diagonal blocks `d`,
/// off-diagonal blocks `o` (both b×b row-major).
pub fn chain_blocks(
    rank: usize,
    m: usize,
    p: usize,
    bs: usize,
    d: &[f64],
    o: &[f64],
) -> ChainBlocks {
    let (order, nc) = chain_ordering(rank, m, p);
    let np = m - nc;
    let base = rank * m;
    let mut inv = vec![0; m];
    for (l, &k) in order.iter().enumerate() {
        inv[k] = l;
    }

    // Per local row: the local columns of A and the foreign global columns.
    let mut a_ent: Vec<Vec<(usize, bool)>> = vec![Vec::new(); m];
    let mut b_ent: Vec<Vec<usize>> = vec![Vec::new(); m];
    for l in 0..m {
        let q = base + order[l];
        a_ent[l].push((l, true));
        let left = q.checked_sub(1);
        let right = if q + 1 < p * m { Some(q + 1) } else { None };
        for nb in [left, right].into_iter().flatten() {
            if nb / m == rank {
                a_ent[l].push((inv[nb - base], false));
            } else {
                b_ent[l].push(phys_to_global(nb, m, p));
            }
        }
    }
    // Interior rows never couple off-rank under this ordering.
    for (l, row) in b_ent.iter().enumerate().take(np) {
        assert!(row.is_empty(), "interior row {} couples off-rank", l);
    }

    let mut ext: Vec<usize> = b_ent.iter().flatten().copied().collect();
    ext.sort_unstable();
    ext.dedup();

    let mut rowp = vec![0];
    let mut cols = Vec::new();
    for row in &mut a_ent {
        row.sort_by_key(|&(c, _)| c);
        cols.extend(row.iter().map(|&(c, _)| c));
        rowp.push(cols.len());
    }
    let mut aloc = BcsrMat::from_pattern(bs, m, m, rowp, cols).unwrap();
    for (l, row) in a_ent.iter().enumerate() {
        for &(c, is_diag) in row {
            aloc.set_block(l, c, if is_diag { d } else { o }).unwrap();
        }
    }

    let mut browp = vec![0];
    let mut bcols = Vec::new();
    for row in &b_ent[np..] {
        let mut idx: Vec<usize> = row
            .iter()
            .map(|g| ext.binary_search(g).unwrap())
            .collect();
        idx.sort_unstable();
        bcols.extend(idx);
        browp.push(bcols.len());
    }
    let mut bext = BcsrMat::from_pattern(bs, nc, ext.len(), browp, bcols).unwrap();
    for (r, row) in b_ent[np..].iter().enumerate() {
        for g in row {
            bext.set_block(r, ext.binary_search(g).unwrap(), o).unwrap();
        }
    }

    ChainBlocks {
        aloc,
        bext,
        ext,
        nc,
    }
}

/// Assemble one rank's distributed chain matrix over its communicator.
pub fn chain_partmat(
    comm: Arc<dyn Comm>,
    m: usize,
    p: usize,
    bs: usize,
    d: &[f64],
    o: &[f64],
    bcs: Option<Arc<BcMap>>,
) -> PartMat {
    let rank = comm.rank();
    let blocks = chain_blocks(rank, m, p, bs, d, o);
    let rmap = RowMap::new(comm.as_ref(), m);
    let halo = Halo::new(comm.clone(), &rmap, blocks.ext.clone()).unwrap();
    PartMat::new(comm, rmap, blocks.aloc, blocks.bext, halo, bcs).unwrap()
}

/// Single-rank chain matrix over the serial communicator.
pub fn serial_chain_partmat(m: usize, bs: usize, d: &[f64], o: &[f64]) -> PartMat {
    let comm: Arc<dyn Comm> = Arc::new(SerialComm);
    chain_partmat(comm, m, 1, bs, d, o, None)
}

/// Strictly diagonally dominant block pair for the given block size.
pub fn dominant_blocks(bs: usize) -> (Vec<f64>, Vec<f64>) {
    let mut d = vec![0.0; bs * bs];
    let mut o = vec![0.0; bs * bs];
    for r in 0..bs {
        d[r * bs + r] = 4.0;
        o[r * bs + r] = -1.0;
    }
    if bs > 1 {
        // A little off-diagonal coupling inside each block.
        d[1] = -1.0;
        d[bs] = -1.0;
    }
    (d, o)
}
