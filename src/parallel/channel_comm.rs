//! In-process communicator over std channels.
//!
//! A universe of `size` connected ranks inside one process, one thread per
//! rank: the shared-memory counterpart of the MPI backend. Sends never block
//! (unbounded channels); receives block until the matching (source, tag)
//! message arrives, holding any earlier out-of-order traffic in a pending
//! queue. The multi-rank test scenarios run entirely on this transport.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::Comm;

// Tags reserved for the built-in collectives.
const REDUCE_TAG: usize = usize::MAX;
const GATHER_TAG: usize = usize::MAX - 1;

enum Payload {
    Scalars(Vec<f64>),
    Indices(Vec<usize>),
}

struct Message {
    src: usize,
    tag: usize,
    payload: Payload,
}

struct Inbox {
    rx: Receiver<Message>,
    // Per-source queues of messages received ahead of their matching recv.
    pending: Vec<VecDeque<Message>>,
}

pub struct ChannelComm {
    rank: usize,
    size: usize,
    peers: Vec<Sender<Message>>,
    inbox: Mutex<Inbox>,
}

impl ChannelComm {
    /// Create a fully connected universe of `size` ranks.
    pub fn universe(size: usize) -> Vec<Arc<ChannelComm>> {
        let mut txs = Vec::with_capacity(size);
        let mut rxs = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = channel();
            txs.push(tx);
            rxs.push(rx);
        }
        rxs.into_iter()
            .enumerate()
            .map(|(rank, rx)| {
                Arc::new(ChannelComm {
                    rank,
                    size,
                    peers: txs.clone(),
                    inbox: Mutex::new(Inbox {
                        rx,
                        pending: (0..size).map(|_| VecDeque::new()).collect(),
                    }),
                })
            })
            .collect()
    }

    fn post(&self, dest: usize, tag: usize, payload: Payload) {
        self.peers[dest]
            .send(Message {
                src: self.rank,
                tag,
                payload,
            })
            .expect("peer rank hung up");
    }

    fn take(&self, src: usize, tag: usize) -> Payload {
        let mut inbox = self.inbox.lock().expect("inbox poisoned");
        if let Some(pos) = inbox.pending[src].iter().position(|m| m.tag == tag) {
            return inbox.pending[src].remove(pos).map(|m| m.payload).expect("queued message");
        }
        loop {
            let msg = inbox.rx.recv().expect("peer rank hung up");
            if msg.src == src && msg.tag == tag {
                return msg.payload;
            }
            inbox.pending[msg.src].push_back(msg);
        }
    }
}

impl Comm for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.all_gather_usize(0);
    }

    fn all_reduce_sum(&self, x: f64) -> f64 {
        if self.size == 1 {
            return x;
        }
        if self.rank == 0 {
            let mut acc = x;
            let mut buf = [0.0];
            for src in 1..self.size {
                self.recv_scalars(src, REDUCE_TAG, &mut buf);
                acc += buf[0];
            }
            for dest in 1..self.size {
                self.send_scalars(dest, REDUCE_TAG, &[acc]);
            }
            acc
        } else {
            self.send_scalars(0, REDUCE_TAG, &[x]);
            let mut buf = [0.0];
            self.recv_scalars(0, REDUCE_TAG, &mut buf);
            buf[0]
        }
    }

    fn all_gather_usize(&self, x: usize) -> Vec<usize> {
        if self.size == 1 {
            return vec![x];
        }
        if self.rank == 0 {
            let mut all = vec![0; self.size];
            all[0] = x;
            for src in 1..self.size {
                let v = self.recv_indices(src, GATHER_TAG);
                all[src] = v[0];
            }
            for dest in 1..self.size {
                self.send_indices(dest, GATHER_TAG, &all);
            }
            all
        } else {
            self.send_indices(0, GATHER_TAG, &[x]);
            self.recv_indices(0, GATHER_TAG)
        }
    }

    fn send_scalars(&self, dest: usize, tag: usize, buf: &[f64]) {
        self.post(dest, tag, Payload::Scalars(buf.to_vec()));
    }

    fn recv_scalars(&self, src: usize, tag: usize, buf: &mut [f64]) {
        match self.take(src, tag) {
            Payload::Scalars(v) => {
                assert_eq!(v.len(), buf.len(), "scalar message length mismatch");
                buf.copy_from_slice(&v);
            }
            Payload::Indices(_) => unreachable!("index message where scalars were expected"),
        }
    }

    fn send_indices(&self, dest: usize, tag: usize, buf: &[usize]) {
        self.post(dest, tag, Payload::Indices(buf.to_vec()));
    }

    fn recv_indices(&self, src: usize, tag: usize) -> Vec<usize> {
        match self.take(src, tag) {
            Payload::Indices(v) => v,
            Payload::Scalars(_) => unreachable!("scalar message where indices were expected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_all<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(usize, Arc<ChannelComm>) -> T + Send + Sync + 'static,
    {
        let comms = ChannelComm::universe(size);
        let f = Arc::new(f);
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let f = f.clone();
                thread::spawn(move || f(rank, comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
    }

    #[test]
    fn all_reduce_sums_ranks() {
        let sums = run_all(4, |rank, comm| comm.all_reduce_sum(rank as f64 + 1.0));
        assert_eq!(sums, vec![10.0; 4]);
    }

    #[test]
    fn all_gather_is_rank_ordered() {
        let gathered = run_all(3, |rank, comm| comm.all_gather_usize(10 * rank));
        for g in gathered {
            assert_eq!(g, vec![0, 10, 20]);
        }
    }

    #[test]
    fn point_to_point_matches_by_tag() {
        let out = run_all(2, |rank, comm| {
            if rank == 0 {
                // Post tag 7 then tag 3; the receiver asks in the other order.
                comm.send_scalars(1, 7, &[1.0, 2.0]);
                comm.send_scalars(1, 3, &[5.0]);
                Vec::new()
            } else {
                let mut first = [0.0];
                comm.recv_scalars(0, 3, &mut first);
                let mut second = [0.0; 2];
                comm.recv_scalars(0, 7, &mut second);
                vec![first[0], second[0], second[1]]
            }
        });
        assert_eq!(out[1], vec![5.0, 1.0, 2.0]);
    }
}
