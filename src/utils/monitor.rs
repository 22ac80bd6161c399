//! Injected reporters for solver convergence histories.
//!
//! Nothing in the crate writes to a stream it was not handed: a `Monitor`
//! is passed in by the caller and forwarded down to the inner solve.

use std::io::Write;

/// Receives the residual norm at each solver iteration.
pub trait Monitor: Send {
    fn residual(&mut self, iteration: usize, rnorm: f64);
}

/// Monitor writing one line per iteration to an output stream.
pub struct WriterMonitor<W: Write + Send> {
    out: W,
    label: String,
}

impl<W: Write + Send> WriterMonitor<W> {
    pub fn new(out: W, label: &str) -> Self {
        Self {
            out,
            label: label.to_string(),
        }
    }
}

impl<W: Write + Send> Monitor for WriterMonitor<W> {
    fn residual(&mut self, iteration: usize, rnorm: f64) {
        // A full diagnostic stream is best-effort; drop write failures.
        let _ = writeln!(self.out, "{} iter {:4} residual {:.6e}", self.label, iteration, rnorm);
    }
}
