#![allow(clippy::missing_safety_doc)]
#![deny(unsafe_op_in_unsafe_fn)]

use core::hint::black_box;
use core::ptr;

pub mod affinity;
pub mod arena;
pub mod cache_info;
pub mod mmap;
pub mod reset;

pub const PAGE_SHIFT: usize = 12;
pub const PAGE_LEN: usize = 1 << PAGE_SHIFT;

/// Size of one link in a pointer chain.
pub const WORD_LEN: usize = core::mem::size_of::<*const u8>();

pub unsafe fn maccess<T: Copy>(p: *const T) -> T {
    unsafe { ptr::read_volatile(p) }
}

/// Opaque use of a value, the optimizer has to assume it is observed.
pub fn do_not_optimize<T>(value: T) -> T {
    black_box(value)
}

/// Follow a pointer chain for `steps` hops starting at `start`, returns where it ended.
///
/// Each hop loads the next address from the current one, so no two loads can overlap.
#[inline(never)]
pub unsafe fn chase(start: *const u8, steps: usize) -> *const u8 {
    let mut p = start as *const *const u8;
    for _ in 0..steps {
        p = unsafe { maccess(p) } as *const *const u8;
    }
    p as *const u8
}
