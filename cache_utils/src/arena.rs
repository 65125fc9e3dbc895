use crate::PAGE_LEN;
use core::fmt;
use core::panic::Location;
use core::ptr::NonNull;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    ZeroSized,
    Overflow(usize),
    NoMem(usize),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArenaError::ZeroSized => write!(f, "zero sized arena requested"),
            ArenaError::Overflow(len) => write!(f, "arena of {} bytes overflows usize", len),
            ArenaError::NoMem(len) => write!(f, "calloc of {} bytes failed", len),
        }
    }
}

impl std::error::Error for ArenaError {}

pub struct AlignedArena {
    raw: NonNull<u8>,
    entry: NonNull<u8>,
    len: usize,
}

impl AlignedArena {
    pub fn try_new(len: usize) -> Result<AlignedArena, ArenaError> {
        if len == 0 {
            return Err(ArenaError::ZeroSized);
        }
        let total = len.checked_add(PAGE_LEN).ok_or(ArenaError::Overflow(len))?;
        let raw = unsafe { libc::calloc(total, 1) } as *mut u8;
        let raw = NonNull::new(raw).ok_or(ArenaError::NoMem(total))?;

        let mut entry = raw.as_ptr();
        while entry as usize & (PAGE_LEN - 1) != 0 {
            entry = unsafe { entry.add(1) };
        }
        Ok(AlignedArena {
            raw,
            // entry is at most PAGE_LEN - 1 bytes past a non null pointer
            entry: unsafe { NonNull::new_unchecked(entry) },
            len,
        })
    }

    /// Same as `try_new`, but a failed allocation terminates the process.
    #[track_caller]
    pub fn new(len: usize) -> AlignedArena {
        match Self::try_new(len) {
            Ok(arena) => arena,
            Err(e) => abort_on_allocation_failure(len, &e),
        }
    }

    pub fn entry(&self) -> *mut u8 {
        self.entry.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.entry.as_ptr(), self.len) }
    }
}

impl Drop for AlignedArena {
    fn drop(&mut self) {
        unsafe { libc::free(self.raw.as_ptr() as *mut libc::c_void) };
    }
}

fn allocation_failure_message(
    caller: &Location<'_>,
    len: usize,
    error: &dyn fmt::Display,
) -> String {
    format!(
        "{}: allocation of {} bytes failed ({}), aborting",
        caller, len, error
    )
}

/// Measurements without their memory are meaningless, log where it happened and stop.
#[track_caller]
pub fn abort_on_allocation_failure(len: usize, error: &dyn fmt::Display) -> ! {
    log::error!("{}", allocation_failure_message(Location::caller(), len, error));
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::{allocation_failure_message, AlignedArena, ArenaError};
    use crate::PAGE_LEN;
    use core::panic::Location;

    #[test]
    fn entry_is_page_aligned_and_zeroed() {
        for len in [1, 64, PAGE_LEN - 1, PAGE_LEN, 5 * PAGE_LEN + 17] {
            let arena = AlignedArena::new(len);
            assert_eq!(arena.entry() as usize % PAGE_LEN, 0);
            assert_eq!(arena.len(), len);
            assert!(arena.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn entry_stays_inside_allocation() {
        let arena = AlignedArena::new(PAGE_LEN);
        let offset = arena.entry() as usize - arena.raw.as_ptr() as usize;
        assert!(offset < PAGE_LEN);
    }

    #[test]
    fn zero_sized_is_rejected() {
        assert_eq!(AlignedArena::try_new(0).err(), Some(ArenaError::ZeroSized));
    }

    #[test]
    fn overflow_is_rejected() {
        assert_eq!(
            AlignedArena::try_new(usize::MAX).err(),
            Some(ArenaError::Overflow(usize::MAX))
        );
    }

    #[test]
    fn failure_message_names_caller_and_size() {
        let caller = Location::caller();
        let message = allocation_failure_message(caller, 4096, &ArenaError::NoMem(8192));
        assert_eq!(
            message,
            format!(
                "{}: allocation of 4096 bytes failed (calloc of 8192 bytes failed), aborting",
                caller
            )
        );
        assert!(message.contains(file!()));
    }
}
