//! Scoped access to shared guest memory for device models.
//!
//! Devices never hold Rust references into guest RAM across calls. Instead they acquire one of:
//! - a plain read ([`MemoryView::read`]) into a caller buffer,
//! - a private copy ([`MemoryView::read_copy`]) they own for as long as they like, or
//! - a write mapping ([`MemoryView::map_write`]), a staging buffer that is written back to guest
//!   memory when it is flushed, unmapped or dropped.
//!
//! The write-back on drop covers every exit path of the owner, including early returns through `?`.

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::phys::{GuestMemory, GuestMemoryError, GuestMemoryResult};

/// Guest memory shared between a machine and the devices that DMA into it.
pub type SharedGuestMemory = Rc<RefCell<dyn GuestMemory>>;

/// Wrap a backend into a [`SharedGuestMemory`] handle.
pub fn shared<M: GuestMemory + 'static>(mem: M) -> SharedGuestMemory {
    Rc::new(RefCell::new(mem))
}

/// Bounds-checked accessor over one guest address space.
#[derive(Clone)]
pub struct MemoryView {
    mem: SharedGuestMemory,
}

impl fmt::Debug for MemoryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryView")
            .field("size", &self.size())
            .finish()
    }
}

impl MemoryView {
    pub fn new(mem: SharedGuestMemory) -> Self {
        Self { mem }
    }

    /// Size of the underlying address space in bytes (0 if it is currently borrowed elsewhere).
    pub fn size(&self) -> u64 {
        self.mem.try_borrow().map(|m| m.size()).unwrap_or(0)
    }

    fn borrow(&self) -> GuestMemoryResult<Ref<'_, dyn GuestMemory + 'static>> {
        self.mem.try_borrow().map_err(|_| GuestMemoryError::Busy)
    }

    pub fn read(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        self.borrow()?.read_into(paddr, dst)
    }

    /// Read `len` bytes into a freshly allocated buffer owned by the caller.
    ///
    /// The range is checked before anything is allocated.
    pub fn read_copy(&self, paddr: u64, len: usize) -> GuestMemoryResult<Vec<u8>> {
        let mem = self.borrow()?;
        mem.check_range(paddr, len)?;
        let mut buf = vec![0u8; len];
        mem.read_into(paddr, &mut buf)?;
        Ok(buf)
    }

    /// Map `len` bytes at `paddr` for writing.
    ///
    /// The mapping must cover the whole request; a range running past the end of the address
    /// space yields [`GuestMemoryError::MappingTruncated`] rather than a shorter mapping.
    pub fn map_write(&self, paddr: u64, len: usize) -> GuestMemoryResult<WriteMapping> {
        let mem = self.borrow()?;
        mem.check_mapping(paddr, len)?;
        let mut data = vec![0u8; len];
        mem.read_into(paddr, &mut data)?;
        Ok(WriteMapping {
            mem: self.mem.clone(),
            paddr,
            data,
            released: false,
        })
    }
}

/// A writable window over guest memory, committed back on release.
pub struct WriteMapping {
    mem: SharedGuestMemory,
    paddr: u64,
    data: Vec<u8>,
    released: bool,
}

impl fmt::Debug for WriteMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteMapping")
            .field("paddr", &format_args!("0x{:x}", self.paddr))
            .field("len", &self.data.len())
            .field("released", &self.released)
            .finish()
    }
}

impl WriteMapping {
    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    /// Commit the current contents to guest memory, keeping the mapping alive.
    pub fn flush(&mut self) -> GuestMemoryResult<()> {
        self.mem
            .try_borrow_mut()
            .map_err(|_| GuestMemoryError::Busy)?
            .write_from(self.paddr, &self.data)
    }

    /// Commit and release the mapping.
    pub fn unmap(mut self) -> GuestMemoryResult<()> {
        self.released = true;
        self.flush()
    }
}

impl Deref for WriteMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for WriteMapping {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for WriteMapping {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.flush() {
            tracing::warn!(paddr = self.paddr, len = self.data.len(), %err, "write mapping flush on drop failed");
        }
    }
}
