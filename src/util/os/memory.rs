use crate::util::conversions::raw_is_aligned;
use crate::util::Address;
use libc::{MAP_ANON, MAP_FIXED, MAP_NORESERVE, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE};
use std::io::Result;

lazy_static! {
    static ref PAGE_SIZE: usize = {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            crate::util::constants::BYTES_IN_PAGE
        } else {
            size as usize
        }
    };
}

/// The page size of the OS in bytes.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Reserve `size` bytes of address space, aligned to `alignment`.
///
/// The reserved range is not accessible and does not occupy any physical memory or swap space.
/// Before using any part of the range, [`commit`] must be called.
pub fn reserve(size: usize, alignment: usize) -> Result<Address> {
    debug_assert!(alignment.is_power_of_two());
    debug_assert!(raw_is_aligned(size, page_size()));
    let flags = MAP_PRIVATE | MAP_ANON | MAP_NORESERVE;
    if alignment <= page_size() {
        return mmap(Address::ZERO, size, PROT_NONE, flags);
    }
    // Over-reserve, then trim the unaligned head and the tail.
    let start = mmap(Address::ZERO, size + alignment, PROT_NONE, flags)?;
    let aligned = start.align_up(alignment);
    let head = aligned - start;
    let tail = alignment - head;
    if head > 0 {
        release(start, head)?;
    }
    if tail > 0 {
        release(aligned + size, tail)?;
    }
    Ok(aligned)
}

/// Back the given range with memory. The memory is readable, writable and zeroed.
pub fn commit(start: Address, size: usize) -> Result<()> {
    mmap_fixed(start, size, PROT_READ | PROT_WRITE, MAP_PRIVATE | MAP_ANON | MAP_FIXED)
}

/// Return the memory behind the given range to the OS. The range stays reserved.
pub fn uncommit(start: Address, size: usize) -> Result<()> {
    mmap_fixed(
        start,
        size,
        PROT_NONE,
        MAP_PRIVATE | MAP_ANON | MAP_FIXED | MAP_NORESERVE,
    )
}

/// Release the given range of address space.
pub fn release(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

fn mmap(start: Address, size: usize, prot: libc::c_int, flags: libc::c_int) -> Result<Address> {
    let ret = unsafe { libc::mmap(start.to_mut_ptr(), size, prot, flags, -1, 0) };
    if ret == libc::MAP_FAILED {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ret))
    }
}

fn mmap_fixed(start: Address, size: usize, prot: libc::c_int, flags: libc::c_int) -> Result<()> {
    let ptr: *mut libc::c_void = start.to_mut_ptr();
    wrap_libc_call(
        &|| unsafe { libc::mmap(start.to_mut_ptr(), size, prot, flags, -1, 0) },
        ptr,
    )
}

fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// An owned range of reserved address space. The range is released when the reservation is dropped.
#[derive(Debug)]
pub struct Reservation {
    start: Address,
    size: usize,
}

impl Reservation {
    /// Reserve `size` bytes aligned to `alignment`. See [`reserve`].
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        let start = reserve(size, alignment)?;
        trace!("Reserved [{}, {})", start, start + size);
        Ok(Reservation { start, size })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.is_in_range(self.start, self.end())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(e) = release(self.start, self.size) {
            error!(
                "Failed to release reservation [{}, {}): {}",
                self.start,
                self.end(),
                e
            );
        }
    }
}
