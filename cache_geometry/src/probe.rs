use crate::pattern::AccessPattern;
use cache_utils::arena::{abort_on_allocation_failure, AlignedArena};
use cache_utils::reset::trash_caches;
use cache_utils::{chase, do_not_optimize};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Source of per-access latency samples, one sample per repetition.
///
/// Sweeps only depend on this, so they can be driven by something other than real memory.
pub trait LatencyProbe {
    fn sample(&mut self, pattern: &AccessPattern, repetitions: usize) -> Vec<f64>;
}

impl<P: LatencyProbe + ?Sized> LatencyProbe for &mut P {
    fn sample(&mut self, pattern: &AccessPattern, repetitions: usize) -> Vec<f64> {
        (**self).sample(pattern, repetitions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Bytes written and released to flush the caches around the chain construction.
    pub reset_bytes: usize,
    /// Lower bound on the timed traversal length, rounded up to whole laps.
    pub min_accesses: usize,
    /// Full laps run before timing.
    pub warmup_laps: usize,
    /// Blocks of the line size pattern.
    pub line_blocks: usize,
    /// Block length of the line size pattern, also bounds the largest stride it can test.
    pub line_block_len: usize,
    /// Slots of the tag boundary pattern. An `A` way cache only shows its boundary when
    /// `tag_slots / 2 <= A < tag_slots`, below that bit the slots spread over several sets and
    /// a wider pattern already thrashes there.
    pub tag_slots: usize,
    /// Sets replicated by the associativity pattern.
    pub conflict_sets: usize,
    /// Seed of the shuffled visit orders.
    pub seed: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            reset_bytes: cache_utils::reset::TRASH_LEN,
            min_accesses: 1 << 18,
            warmup_laps: 2,
            line_blocks: 2048,
            line_block_len: cache_utils::PAGE_LEN,
            tag_slots: 16,
            conflict_sets: 16,
            seed: 0x5eed_cafe,
        }
    }
}

impl ProbeConfig {
    /// Number of laps over `slots` slots to time, at least one.
    pub fn laps(&self, slots: usize) -> usize {
        ((self.min_accesses + slots - 1) / slots).max(1)
    }
}

/// Times pointer chases over real memory.
pub struct MemoryProbe {
    config: ProbeConfig,
}

impl MemoryProbe {
    pub fn new(config: ProbeConfig) -> MemoryProbe {
        MemoryProbe { config }
    }

    #[track_caller]
    fn reset(&self) {
        if let Err(e) = trash_caches(self.config.reset_bytes) {
            abort_on_allocation_failure(self.config.reset_bytes, &e);
        }
    }

    /// One repetition: fresh arena, cold caches, warm up, then time whole laps.
    fn measure_once(&self, pattern: &AccessPattern) -> f64 {
        let slots = pattern.slots();

        self.reset();
        let mut arena = AlignedArena::new(pattern.arena_len());
        let start = pattern.link(&mut arena);
        self.reset();

        let warmup = self.config.warmup_laps * slots;
        do_not_optimize(unsafe { chase(start, warmup) });

        let steps = self.config.laps(slots) * slots;
        let t = Instant::now();
        let end = unsafe { chase(start, steps) };
        let elapsed = t.elapsed();
        do_not_optimize(end);

        elapsed.as_nanos() as f64 / steps as f64
    }
}

impl LatencyProbe for MemoryProbe {
    fn sample(&mut self, pattern: &AccessPattern, repetitions: usize) -> Vec<f64> {
        (0..repetitions).map(|_| self.measure_once(pattern)).collect()
    }
}
