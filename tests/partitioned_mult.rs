//! Distributed matrix-vector products, scalar operations, boundary
//! conditions, and the non-zero pattern dump.

mod common;

use std::sync::Arc;

use common::*;
use partmat::{BcMap, BcsrMat, Comm, Halo, LinearOp, PartMat, PmError, RowMap, SerialComm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dense reference for the partitioned chain, in the same global ordering.
fn chain_dense(p: usize, m: usize, bs: usize, d: &[f64], o: &[f64]) -> faer::Mat<f64> {
    let n = p * m * bs;
    let mut dense = vec![0.0; n * n];
    let mut put = |gi: usize, gj: usize, blk: &[f64]| {
        for r in 0..bs {
            for c in 0..bs {
                dense[(gi * bs + r) * n + gj * bs + c] = blk[r * bs + c];
            }
        }
    };
    for q in 0..p * m {
        let gq = phys_to_global(q, m, p);
        put(gq, gq, d);
        if q > 0 {
            put(gq, phys_to_global(q - 1, m, p), o);
        }
        if q + 1 < p * m {
            put(gq, phys_to_global(q + 1, m, p), o);
        }
    }
    faer::Mat::from_fn(n, n, |i, j| dense[i * n + j])
}

#[test]
fn two_rank_product_matches_dense_reference() {
    let (p, m, bs) = (2, 4, 1);
    let (d, o) = dominant_blocks(bs);
    let (dd, oo) = (d.clone(), o.clone());

    let out = run_ranks(p, move |rank, comm| {
        let mat = chain_partmat(comm, m, p, bs, &dd, &oo, None);
        let mut x = mat.create_vec();
        let mut rng = StdRng::seed_from_u64(17 + rank as u64);
        for v in x.as_mut_slice() {
            *v = rng.gen_range(-1.0..1.0);
        }
        let mut y = mat.create_vec();
        mat.mult(&x, &mut y).unwrap();
        (x.as_slice().to_vec(), y.as_slice().to_vec())
    });

    let x_global: Vec<f64> = out.iter().flat_map(|(x, _)| x.clone()).collect();
    let y_global: Vec<f64> = out.iter().flat_map(|(_, y)| y.clone()).collect();

    let a = chain_dense(p, m, bs, &d, &o);
    let n = p * m * bs;
    let xcol = faer::Mat::from_fn(n, 1, |i, _| x_global[i]);
    let want = &a * &xcol;
    for i in 0..n {
        approx::assert_relative_eq!(y_global[i], want[(i, 0)], epsilon = 1e-12);
    }
}

#[test]
fn four_rank_block_product_matches_dense_reference() {
    let (p, m, bs) = (4, 3, 2);
    let (d, o) = dominant_blocks(bs);
    let (dd, oo) = (d.clone(), o.clone());

    let out = run_ranks(p, move |rank, comm| {
        let mat = chain_partmat(comm, m, p, bs, &dd, &oo, None);
        let mut x = mat.create_vec();
        let mut rng = StdRng::seed_from_u64(5 + rank as u64);
        for v in x.as_mut_slice() {
            *v = rng.gen_range(-2.0..2.0);
        }
        let mut y = mat.create_vec();
        mat.mult(&x, &mut y).unwrap();
        (x.as_slice().to_vec(), y.as_slice().to_vec())
    });

    let x_global: Vec<f64> = out.iter().flat_map(|(x, _)| x.clone()).collect();
    let y_global: Vec<f64> = out.iter().flat_map(|(_, y)| y.clone()).collect();

    let a = chain_dense(p, m, bs, &d, &o);
    let n = p * m * bs;
    let xcol = faer::Mat::from_fn(n, 1, |i, _| x_global[i]);
    let want = &a * &xcol;
    for i in 0..n {
        approx::assert_relative_eq!(y_global[i], want[(i, 0)], epsilon = 1e-12);
    }
}

#[test]
fn copy_then_scale_matches_scaled_matrix() {
    let (d, o) = dominant_blocks(1);
    let a = serial_chain_partmat(5, 1, &d, &o);
    let mut b = serial_chain_partmat(5, 1, &d, &o);
    b.zero_entries();
    b.copy_values(&a).unwrap();
    b.scale(2.5);

    let mut x = a.create_vec();
    for (i, v) in x.as_mut_slice().iter_mut().enumerate() {
        *v = 1.0 + i as f64;
    }
    let mut ya = a.create_vec();
    let mut yb = a.create_vec();
    a.mult(&x, &mut ya).unwrap();
    b.mult(&x, &mut yb).unwrap();
    for (va, vb) in ya.as_slice().iter().zip(yb.as_slice()) {
        approx::assert_relative_eq!(2.5 * va, vb, epsilon = 1e-13);
    }
}

#[test]
fn axpy_and_diag_shift_touch_the_right_blocks() {
    let (d, o) = dominant_blocks(1);
    let a = serial_chain_partmat(4, 1, &d, &o);
    let mut b = serial_chain_partmat(4, 1, &d, &o);
    // b := b + a doubles every entry.
    b.axpy(1.0, &a).unwrap();
    assert_eq!(b.diag_block().block(0, 0).unwrap(), &[8.0]);
    assert_eq!(b.diag_block().block(0, 1).unwrap(), &[-2.0]);
    // The shift lands on the diagonal block only.
    b.add_diag(1.0).unwrap();
    assert_eq!(b.diag_block().block(0, 0).unwrap(), &[9.0]);
    assert_eq!(b.diag_block().block(0, 1).unwrap(), &[-2.0]);
}

#[test]
fn construction_rejects_mismatched_pieces() {
    let comm: Arc<dyn Comm> = Arc::new(SerialComm);
    let rmap = RowMap::new(comm.as_ref(), 3);
    let aloc = BcsrMat::from_pattern(1, 3, 3, vec![0, 1, 2, 3], vec![0, 1, 2]).unwrap();
    // The coupling block claims an external column the halo does not gather.
    let bext = BcsrMat::from_pattern(1, 1, 1, vec![0, 1], vec![0]).unwrap();
    let halo = Halo::new(comm.clone(), &rmap, Vec::new()).unwrap();
    let err = PartMat::new(comm.clone(), rmap.clone(), aloc, bext, halo, None);
    assert!(matches!(err, Err(PmError::Configuration(_))));

    // More interface rows than owned rows.
    let aloc = BcsrMat::from_pattern(1, 3, 3, vec![0, 1, 2, 3], vec![0, 1, 2]).unwrap();
    let bext = BcsrMat::from_pattern(1, 4, 0, vec![0, 0, 0, 0, 0], vec![]).unwrap();
    let halo = Halo::new(comm.clone(), &rmap, Vec::new()).unwrap();
    let err = PartMat::new(comm.clone(), rmap.clone(), aloc, bext, halo, None);
    assert!(matches!(err, Err(PmError::Configuration(_))));

    // Mismatched block sizes.
    let aloc = BcsrMat::from_pattern(2, 3, 3, vec![0, 1, 2, 3], vec![0, 1, 2]).unwrap();
    let bext = BcsrMat::from_pattern(1, 0, 0, vec![0], vec![]).unwrap();
    let halo = Halo::new(comm.clone(), &rmap, Vec::new()).unwrap();
    let err = PartMat::new(comm, rmap, aloc, bext, halo, None);
    assert!(matches!(err, Err(PmError::Configuration(_))));
}

#[test]
fn bc_rows_become_identity_and_clear_the_coupling() {
    let (p, m, bs) = (2, 4, 1);
    let (d, o) = dominant_blocks(bs);
    let mut bcs = BcMap::new();
    // Global row 0 is rank 0's first interior row; global row 7 is rank 1's
    // interface row (physical node 4, ordered last).
    bcs.add_bc(0, &[0], &[0.0]);
    bcs.add_bc(7, &[0], &[0.0]);
    let bcs = Arc::new(bcs);

    let out = run_ranks(p, move |_rank, comm| {
        let mut mat = chain_partmat(comm, m, p, bs, &d, &o, Some(bcs.clone()));
        mat.apply_bcs();
        let a = mat.diag_block();
        let b = mat.ext_block();
        let (rowp, cols, avals) = a.arrays();
        let mut rows = Vec::new();
        for i in 0..a.row_dim() {
            let row: Vec<(usize, f64)> = (rowp[i]..rowp[i + 1])
                .map(|q| (cols[q], avals[q]))
                .collect();
            rows.push(row);
        }
        let (_, _, bvals) = b.arrays();
        (rows, bvals.to_vec())
    });

    // Rank 0, local row 0: identity on the diagonal, zeros elsewhere.
    for &(c, v) in &out[0].0[0] {
        assert_eq!(v, if c == 0 { 1.0 } else { 0.0 });
    }
    // Rank 1, local row 3: identity in A, and its B row zeroed.
    for &(c, v) in &out[1].0[3] {
        assert_eq!(v, if c == 3 { 1.0 } else { 0.0 });
    }
    assert!(out[1].1.iter().all(|&v| v == 0.0));
    // Rank 0's interface row is untouched: its B row keeps the coupling.
    assert!(out[0].1.iter().any(|&v| v != 0.0));
}

#[test]
fn bc_clears_coupling_when_every_row_is_interface() {
    // One node per rank: Np = 0, so a constraint on the first local row
    // must reach row 0 of the coupling block.
    let (p, m, bs) = (2, 1, 1);
    let (d, o) = dominant_blocks(bs);
    let mut bcs = BcMap::new();
    bcs.add_bc(0, &[0], &[0.0]);
    let bcs = Arc::new(bcs);

    let out = run_ranks(p, move |_rank, comm| {
        let mut mat = chain_partmat(comm, m, p, bs, &d, &o, Some(bcs.clone()));
        assert_eq!(mat.interior_rows(), 0);
        mat.apply_bcs();
        let (_, _, bvals) = mat.ext_block().arrays();
        let diag = mat.diag_block().block(0, 0).unwrap().to_vec();
        (diag, bvals.to_vec())
    });

    assert_eq!(out[0].0, vec![1.0]);
    assert!(out[0].1.iter().all(|&v| v == 0.0));
    // Rank 1 owns no constrained row; everything is intact there.
    assert_eq!(out[1].0, vec![4.0]);
    assert!(out[1].1.iter().any(|&v| v != 0.0));
}

#[test]
fn pattern_dump_lists_blocks_with_global_offsets() {
    let out = run_ranks(2, |rank, comm| {
        let comm: Arc<dyn Comm> = comm;
        let rmap = RowMap::new(comm.as_ref(), 3);
        // Rank 1 carries the pattern under test; rank 0 is a plain
        // diagonal with a matching one-entry coupling row.
        let (aloc, ext) = if rank == 0 {
            (
                BcsrMat::from_pattern(1, 3, 3, vec![0, 1, 2, 3], vec![0, 1, 2]).unwrap(),
                vec![5],
            )
        } else {
            (
                BcsrMat::from_pattern(1, 3, 3, vec![0, 1, 3, 4], vec![0, 0, 1, 2]).unwrap(),
                vec![2],
            )
        };
        let mut bext = BcsrMat::from_pattern(1, 1, 1, vec![0, 1], vec![0]).unwrap();
        bext.set_block(0, 0, &[1.0]).unwrap();
        let halo = Halo::new(comm.clone(), &rmap, ext).unwrap();
        let mat = PartMat::new(comm, rmap, aloc, bext, halo, None).unwrap();
        let mut buf = Vec::new();
        mat.write_nz_pattern(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    });

    let lines: Vec<&str> = out[1].lines().collect();
    assert_eq!(lines[0], "VARIABLES = \"i\", \"j\" ");
    assert_eq!(lines[1], "ZONE T = \"Diagonal block 1\"");
    assert_eq!(&lines[2..6], &["3 3", "4 3", "4 4", "5 5"]);
    assert_eq!(lines[6], "ZONE T = \"Off-diagonal block 1\"");
    assert_eq!(lines[7], "5 2");
    assert_eq!(lines.len(), 8);
}
