//! Aggregate progress across the concurrent puts of one batch.
//!
//! Overall percent is `Σ transferred / Σ total × 100`, recomputed on every
//! observation. Each file's transferred count never moves backwards, so the
//! aggregate never does either.

use bridge_traits::storage::TransferProgress;

#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    slots: Vec<Slot>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    transferred: u64,
    total: u64,
}

impl ProgressAggregator {
    /// One slot per file, seeded with the file sizes.
    pub fn new(sizes: impl IntoIterator<Item = u64>) -> Self {
        Self {
            slots: sizes
                .into_iter()
                .map(|total| Slot {
                    transferred: 0,
                    total,
                })
                .collect(),
        }
    }

    /// Record an observation for `slot` and return the new overall percent.
    ///
    /// Unknown slots are ignored. A reported total replaces the seeded size.
    pub fn update(&mut self, slot: usize, progress: TransferProgress) -> f64 {
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.total = progress.total_bytes;
            entry.transferred = entry
                .transferred
                .max(progress.bytes_transferred)
                .min(entry.total);
        }
        self.percent()
    }

    /// Mark `slot` as fully transferred.
    pub fn complete(&mut self, slot: usize) -> f64 {
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.transferred = entry.total;
        }
        self.percent()
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.slots.iter().map(|slot| slot.transferred).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.slots.iter().map(|slot| slot.total).sum()
    }

    /// Overall percent in `0.0..=100.0`. Nothing to send counts as done.
    pub fn percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 100.0;
        }
        self.transferred_bytes() as f64 / total as f64 * 100.0
    }

    /// [`percent`](Self::percent) rounded down, for display.
    pub fn percent_floor(&self) -> u8 {
        self.percent().floor().clamp(0.0, 100.0) as u8
    }
}
