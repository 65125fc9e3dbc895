use crate::mmap::MMappedMemory;
use crate::{do_not_optimize, maccess, PAGE_LEN};

/// Default volume swept by `trash_caches`, larger than any last level cache we expect to meet.
pub const TRASH_LEN: usize = 16 << 20;

/// Write zeros over a fresh `len` bytes block then release it.
///
/// Whatever lines or TLB entries were live before are evicted by the time this returns.
pub fn trash_caches(len: usize) -> Result<(), nix::Error> {
    let block = MMappedMemory::<u8>::try_new(len, false, |_| 0)?;
    let mut sum = 0u8;
    for i in (0..block.len()).step_by(PAGE_LEN) {
        sum = sum.wrapping_add(unsafe { maccess(&block[i]) });
    }
    do_not_optimize(sum);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::trash_caches;
    use crate::PAGE_LEN;

    #[test]
    fn trash_small_block() {
        assert!(trash_caches(16 * PAGE_LEN).is_ok());
    }

    #[test]
    fn trash_empty_block_fails() {
        assert!(trash_caches(0).is_err());
    }
}
