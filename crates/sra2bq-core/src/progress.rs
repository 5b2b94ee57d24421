// Fixed-cadence progress reporting for chunked byte transfers.
//
// Emits one log line every `every` chunks, with a percentage when the total
// size is known up front.

use tracing::info;

pub struct Progress {
    label: &'static str,
    every: u64,
    chunks: u64,
    bytes: u64,
    total: Option<u64>,
}

impl Progress {
    pub fn new(label: &'static str, every: u64, total: Option<u64>) -> Self {
        Self {
            label,
            every: every.max(1),
            chunks: 0,
            bytes: 0,
            total,
        }
    }

    /// Account for one chunk of `len` bytes, logging at the configured cadence.
    pub fn tick(&mut self, len: usize) {
        self.bytes += len as u64;
        self.chunks += 1;

        if self.chunks % self.every == 0 {
            let mib = crate::to_mib(self.bytes);
            match self.total {
                Some(total) if total > 0 => {
                    let percent = (self.bytes as f64 / total as f64) * 100.0;
                    info!("{}: {:.1} MB ({:.1}%)", self.label, mib, percent);
                }
                _ => {
                    info!("{}: {:.1} MB", self.label, mib);
                }
            }
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounting() {
        let mut progress = Progress::new("download", 10, Some(100));
        progress.tick(30);
        progress.tick(30);
        progress.tick(40);
        assert_eq!(progress.bytes(), 100);
        assert_eq!(progress.chunks(), 3);
    }

    #[test]
    fn test_zero_cadence_clamped() {
        // every = 0 would never log and would divide by zero; clamp to 1
        let mut progress = Progress::new("download", 0, None);
        progress.tick(1);
        assert_eq!(progress.chunks(), 1);
    }
}
