//! Reusable host buffer for partial inner products.

/// Host scratch buffer, grown on demand and never shrunk.
///
/// One instance serves one inner product at a time. Concurrent inner
/// products need independent instances.
#[derive(Debug, Default)]
pub struct InnerScratch {
    buf: Vec<f64>,
}

impl InnerScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch region of exactly `len` doubles, growing the buffer if needed.
    pub fn reserve(&mut self, len: usize) -> &mut [f64] {
        if len > self.buf.len() {
            self.buf.resize(len, 0.0);
        }
        &mut self.buf[..len]
    }

    /// Number of doubles currently allocated.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}
