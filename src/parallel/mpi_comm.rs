// MPI-based communication backend (feature "mpi").

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::Comm;

pub struct MpiComm {
    // Keep the universe alive for the lifetime of the communicator; dropping
    // it finalizes MPI.
    _universe: mpi::environment::Universe,
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    pub fn new() -> Self {
        let universe = mpi::initialize().expect("MPI initialization failed");
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm {
            _universe: universe,
            world,
            rank,
            size,
        }
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn all_reduce_sum(&self, x: f64) -> f64 {
        use mpi::collective::SystemOperation;
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        y
    }

    fn all_gather_usize(&self, x: usize) -> Vec<usize> {
        let local = x as u64;
        let mut out = vec![0u64; self.size];
        self.world.all_gather_into(&local, &mut out[..]);
        out.into_iter().map(|v| v as usize).collect()
    }

    fn send_scalars(&self, dest: usize, tag: usize, buf: &[f64]) {
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(buf, tag as i32);
    }

    fn recv_scalars(&self, src: usize, tag: usize, buf: &mut [f64]) {
        self.world
            .process_at_rank(src as i32)
            .receive_into_with_tag(buf, tag as i32);
    }

    fn send_indices(&self, dest: usize, tag: usize, buf: &[usize]) {
        let wide: Vec<u64> = buf.iter().map(|&v| v as u64).collect();
        self.world
            .process_at_rank(dest as i32)
            .send_with_tag(&wide[..], tag as i32);
    }

    fn recv_indices(&self, src: usize, tag: usize) -> Vec<usize> {
        let (v, _status) = self
            .world
            .process_at_rank(src as i32)
            .receive_vec_with_tag::<u64>(tag as i32);
        v.into_iter().map(|x| x as usize).collect()
    }
}
