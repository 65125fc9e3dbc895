use core::ffi::c_void;
use core::mem::size_of;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::num::NonZeroUsize;
use core::ptr::NonNull;
use core::slice::{from_raw_parts, from_raw_parts_mut};
use nix::errno::Errno;
use nix::sys::mman;

/* from linux kernel headers.
#define HUGETLB_FLAG_ENCODE_SHIFT       26
#define HUGETLB_FLAG_ENCODE_MASK        0x3f

#define HUGETLB_FLAG_ENCODE_2MB         (21 << HUGETLB_FLAG_ENCODE_SHIFT)
*/

/// Anonymous private mapping holding `len` values of `T`, every element written on creation.
///
/// Only meant for plain data : elements are never dropped.
pub struct MMappedMemory<T: Copy> {
    pointer: NonNull<T>,
    len: usize,
}

impl<T: Copy> MMappedMemory<T> {
    pub fn try_new(
        len: usize,
        huge: bool,
        initializer: impl Fn(usize) -> T,
    ) -> Result<MMappedMemory<T>, nix::Error> {
        assert_ne!(size_of::<T>(), 0);
        let bytes = len.checked_mul(size_of::<T>()).ok_or(Errno::EINVAL)?;
        let length = NonZeroUsize::new(bytes).ok_or(Errno::EINVAL)?;
        let p = unsafe {
            mman::mmap(
                None,
                length,
                mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
                mman::MapFlags::MAP_PRIVATE
                    | mman::MapFlags::MAP_ANONYMOUS
                    | if huge {
                        mman::MapFlags::MAP_HUGETLB
                    } else {
                        mman::MapFlags::empty()
                    },
                -1,
                0,
            )?
        };
        let pointer = NonNull::new(p as *mut T).ok_or(Errno::ENOMEM)?;
        let m = MMappedMemory { pointer, len };
        for i in 0..len {
            unsafe { ptr::write_volatile(m.pointer.as_ptr().add(i), initializer(i)) };
        }
        Ok(m)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slice(&self) -> &[T] {
        unsafe { from_raw_parts(self.pointer.as_ptr(), self.len) }
    }

    pub fn slice_mut(&mut self) -> &mut [T] {
        unsafe { from_raw_parts_mut(self.pointer.as_ptr(), self.len) }
    }
}

impl<T: Copy> Drop for MMappedMemory<T> {
    fn drop(&mut self) {
        let bytes = self.len * size_of::<T>();
        if let Err(e) = unsafe { mman::munmap(self.pointer.as_ptr() as *mut c_void, bytes) } {
            log::warn!("munmap of {} bytes failed: {}", bytes, e);
        }
    }
}

impl<T: Copy> Deref for MMappedMemory<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.slice()
    }
}

impl<T: Copy> DerefMut for MMappedMemory<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slice_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::MMappedMemory;
    use crate::PAGE_LEN;
    use nix::errno::Errno;

    #[test]
    fn initializer_runs_on_every_element() {
        let m = MMappedMemory::try_new(3 * PAGE_LEN, false, |i| (i % 251) as u8).unwrap();
        assert_eq!(m.len(), 3 * PAGE_LEN);
        assert_eq!(m[0], 0);
        assert_eq!(m[252], 1);
        assert_eq!(m.as_ptr() as usize % PAGE_LEN, 0);
    }

    #[test]
    fn empty_mapping_is_einval() {
        let m = MMappedMemory::<u8>::try_new(0, false, |_| 0);
        assert_eq!(m.err(), Some(Errno::EINVAL));
    }
}
