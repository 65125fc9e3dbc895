use cache_utils::arena::AlignedArena;
use cache_utils::WORD_LEN;
use core::ptr;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern has no slot")]
    Empty,
    #[error("{0} is not a multiple of the {} bytes link size", WORD_LEN)]
    Misaligned(usize),
    #[error("offset {offset} does not fit in a {block_len} bytes block")]
    OffsetOutOfBlock { offset: usize, block_len: usize },
    #[error("footprint {footprint} is not a multiple of the line size {line_size}")]
    RaggedFootprint { footprint: usize, line_size: usize },
    #[error("{sets} sets of {set_stride} bytes overlap the next way at {way_stride} bytes")]
    OverlappingWays {
        sets: usize,
        set_stride: usize,
        way_stride: usize,
    },
    #[error("pattern spans more than the address space")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPattern {
    /// `slots` cells `stride` bytes apart, visited in address order.
    Strided { slots: usize, stride: usize },
    /// Two cells per block, at the block base and `offset` bytes after it. Blocks are visited
    /// in shuffled order, the second access of a block only misses once `offset` leaves the
    /// line of the first.
    LinePair {
        blocks: usize,
        block_len: usize,
        offset: usize,
        seed: u64,
    },
    /// One cell per line over `footprint` bytes, visited in shuffled order.
    Ring {
        footprint: usize,
        line_size: usize,
        seed: u64,
    },
    /// `ways` cells `way_stride` apart, repeated in `sets` consecutive sets `set_stride` apart.
    Conflict {
        ways: usize,
        way_stride: usize,
        sets: usize,
        set_stride: usize,
    },
}

fn check_word(value: usize) -> Result<(), PatternError> {
    if value == 0 || value % WORD_LEN != 0 {
        Err(PatternError::Misaligned(value))
    } else {
        Ok(())
    }
}

impl AccessPattern {
    pub fn strided(slots: usize, stride: usize) -> Result<AccessPattern, PatternError> {
        if slots == 0 {
            return Err(PatternError::Empty);
        }
        check_word(stride)?;
        slots.checked_mul(stride).ok_or(PatternError::Overflow)?;
        Ok(AccessPattern::Strided { slots, stride })
    }

    pub fn line_pair(
        blocks: usize,
        block_len: usize,
        offset: usize,
        seed: u64,
    ) -> Result<AccessPattern, PatternError> {
        if blocks == 0 {
            return Err(PatternError::Empty);
        }
        check_word(block_len)?;
        check_word(offset)?;
        if offset >= block_len {
            return Err(PatternError::OffsetOutOfBlock { offset, block_len });
        }
        blocks.checked_mul(block_len).ok_or(PatternError::Overflow)?;
        Ok(AccessPattern::LinePair {
            blocks,
            block_len,
            offset,
            seed,
        })
    }

    pub fn ring(footprint: usize, line_size: usize, seed: u64) -> Result<AccessPattern, PatternError> {
        check_word(line_size)?;
        if footprint == 0 {
            return Err(PatternError::Empty);
        }
        if footprint % line_size != 0 {
            return Err(PatternError::RaggedFootprint {
                footprint,
                line_size,
            });
        }
        Ok(AccessPattern::Ring {
            footprint,
            line_size,
            seed,
        })
    }

    pub fn conflict(
        ways: usize,
        way_stride: usize,
        sets: usize,
        set_stride: usize,
    ) -> Result<AccessPattern, PatternError> {
        if ways == 0 || sets == 0 {
            return Err(PatternError::Empty);
        }
        check_word(way_stride)?;
        check_word(set_stride)?;
        let span = sets.checked_mul(set_stride).ok_or(PatternError::Overflow)?;
        if span > way_stride {
            return Err(PatternError::OverlappingWays {
                sets,
                set_stride,
                way_stride,
            });
        }
        ways.checked_mul(way_stride).ok_or(PatternError::Overflow)?;
        Ok(AccessPattern::Conflict {
            ways,
            way_stride,
            sets,
            set_stride,
        })
    }

    /// Number of slots in the cycle.
    pub fn slots(&self) -> usize {
        match *self {
            AccessPattern::Strided { slots, .. } => slots,
            AccessPattern::LinePair { blocks, .. } => 2 * blocks,
            AccessPattern::Ring {
                footprint,
                line_size,
                ..
            } => footprint / line_size,
            AccessPattern::Conflict { ways, sets, .. } => ways * sets,
        }
    }

    /// Bytes of arena the pattern needs past the aligned entry.
    pub fn arena_len(&self) -> usize {
        match *self {
            AccessPattern::Strided { slots, stride } => (slots - 1) * stride + WORD_LEN,
            AccessPattern::LinePair {
                blocks, block_len, ..
            } => blocks * block_len,
            AccessPattern::Ring { footprint, .. } => footprint,
            AccessPattern::Conflict {
                ways, way_stride, ..
            } => ways * way_stride,
        }
    }

    /// Slot offsets in visit order.
    pub fn offsets(&self) -> Vec<usize> {
        match *self {
            AccessPattern::Strided { slots, stride } => (0..slots).map(|i| i * stride).collect(),
            AccessPattern::LinePair {
                blocks,
                block_len,
                offset,
                seed,
            } => {
                let mut order: Vec<usize> = (0..blocks).collect();
                order.shuffle(&mut StdRng::seed_from_u64(seed));
                order
                    .into_iter()
                    .flat_map(|b| [b * block_len, b * block_len + offset])
                    .collect()
            }
            AccessPattern::Ring {
                footprint,
                line_size,
                seed,
            } => {
                let mut lines: Vec<usize> = (0..footprint / line_size)
                    .map(|i| i * line_size)
                    .collect();
                lines.shuffle(&mut StdRng::seed_from_u64(seed));
                lines
            }
            AccessPattern::Conflict {
                ways,
                way_stride,
                sets,
                set_stride,
            } => (0..sets)
                .flat_map(|s| (0..ways).map(move |w| w * way_stride + s * set_stride))
                .collect(),
        }
    }

    /// Write the chain into `arena` and return the address of the first slot. The last slot
    /// points back at the first, so the chain is one closed cycle through every slot.
    pub fn link(&self, arena: &mut AlignedArena) -> *const u8 {
        assert!(
            self.arena_len() <= arena.len(),
            "arena of {} bytes too small for {:?}",
            arena.len(),
            self
        );
        let base = arena.entry();
        let offsets = self.offsets();
        for (i, &from) in offsets.iter().enumerate() {
            let to = offsets[(i + 1) % offsets.len()];
            unsafe { ptr::write(base.add(from) as *mut *const u8, base.add(to) as *const u8) };
        }
        unsafe { base.add(offsets[0]) as *const u8 }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessPattern, PatternError};
    use cache_utils::arena::AlignedArena;
    use cache_utils::{chase, WORD_LEN};
    use std::collections::HashSet;

    fn patterns() -> Vec<AccessPattern> {
        vec![
            AccessPattern::strided(1, 64).unwrap(),
            AccessPattern::strided(37, 1 << 12).unwrap(),
            AccessPattern::line_pair(64, 4096, 8, 1).unwrap(),
            AccessPattern::line_pair(64, 4096, 256, 7).unwrap(),
            AccessPattern::ring(8 << 10, 64, 42).unwrap(),
            AccessPattern::ring(24 << 10, 128, 3).unwrap(),
            AccessPattern::conflict(9, 1 << 12, 4, 64).unwrap(),
            AccessPattern::conflict(2, 1 << 16, 1, 64).unwrap(),
        ]
    }

    #[test]
    fn offsets_are_distinct_and_in_bounds() {
        for pattern in patterns() {
            let offsets = pattern.offsets();
            assert_eq!(offsets.len(), pattern.slots());
            let unique: HashSet<_> = offsets.iter().collect();
            assert_eq!(unique.len(), offsets.len(), "{:?}", pattern);
            for &o in &offsets {
                assert_eq!(o % WORD_LEN, 0);
                assert!(o + WORD_LEN <= pattern.arena_len(), "{:?}", pattern);
            }
        }
    }

    #[test]
    fn chain_is_a_single_closed_cycle() {
        for pattern in patterns() {
            let mut arena = AlignedArena::new(pattern.arena_len());
            pattern.link(&mut arena);
            let n = pattern.slots();
            for &start in &pattern.offsets() {
                let start = unsafe { arena.entry().add(start) } as *const u8;
                let mut p = start;
                for step in 1..n {
                    p = unsafe { chase(p, 1) };
                    assert_ne!(p, start, "{:?} closes after {} of {} steps", pattern, step, n);
                }
                assert_eq!(unsafe { chase(p, 1) }, start, "{:?}", pattern);
            }
        }
    }

    #[test]
    fn shuffled_orders_are_reproducible() {
        let a = AccessPattern::ring(16 << 10, 64, 9).unwrap();
        let b = AccessPattern::ring(16 << 10, 64, 9).unwrap();
        assert_eq!(a.offsets(), b.offsets());
    }

    #[test]
    fn line_pair_keeps_pairs_together() {
        let pattern = AccessPattern::line_pair(16, 4096, 64, 5).unwrap();
        for pair in pattern.offsets().chunks(2) {
            assert_eq!(pair[0] % 4096, 0);
            assert_eq!(pair[1], pair[0] + 64);
        }
    }

    #[test]
    fn conflict_lines_share_set_bits() {
        let pattern = AccessPattern::conflict(5, 1 << 12, 2, 64).unwrap();
        let offsets = pattern.offsets();
        assert!(offsets[..5].iter().all(|o| o % (1 << 12) == 0));
        assert!(offsets[5..].iter().all(|o| o % (1 << 12) == 64));
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert_eq!(AccessPattern::strided(0, 64), Err(PatternError::Empty));
        assert_eq!(AccessPattern::strided(4, 3), Err(PatternError::Misaligned(3)));
        assert_eq!(
            AccessPattern::line_pair(4, 64, 64, 0),
            Err(PatternError::OffsetOutOfBlock {
                offset: 64,
                block_len: 64
            })
        );
        assert_eq!(
            AccessPattern::ring(100 * 8, 64, 0),
            Err(PatternError::RaggedFootprint {
                footprint: 800,
                line_size: 64
            })
        );
        assert_eq!(
            AccessPattern::conflict(4, 256, 8, 64),
            Err(PatternError::OverlappingWays {
                sets: 8,
                set_stride: 64,
                way_stride: 256
            })
        );
        assert_eq!(
            AccessPattern::strided(usize::MAX, 64),
            Err(PatternError::Overflow)
        );
    }
}
