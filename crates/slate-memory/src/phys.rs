use std::collections::BTreeMap;
use std::ops::Range;

use thiserror::Error;

/// Errors returned by [`GuestMemory`] backends and the views built on top of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestMemoryError {
    #[error("guest memory access out of range: paddr=0x{paddr:x} len={len} size=0x{size:x}")]
    OutOfRange { paddr: u64, len: usize, size: u64 },

    /// The requested size cannot be held by the current platform's `usize`.
    #[error("guest memory size {size} does not fit in usize")]
    SizeTooLarge { size: u64 },

    /// Sparse page sizes must be a non-zero power of two.
    #[error("invalid guest memory page size {page_size}")]
    InvalidPageSize { page_size: usize },

    /// A write mapping could only cover part of the requested range.
    #[error(
        "guest memory mapping truncated: paddr=0x{paddr:x} requested={requested} mapped={mapped}"
    )]
    MappingTruncated {
        paddr: u64,
        requested: usize,
        mapped: u64,
    },

    /// The backing store is already borrowed by another view.
    #[error("guest memory is already borrowed")]
    Busy,
}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// One guest physical address space.
///
/// Backends only move bytes; range policy lives in the provided methods so every backend reports
/// the same errors for the same request.
pub trait GuestMemory {
    fn size(&self) -> u64;

    /// Reads `dst.len()` bytes at `paddr`. Fails without touching `dst` when out of range.
    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()>;

    /// Writes `src` at `paddr`. Fails without writing anything when out of range.
    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()>;

    /// `Ok` when `[paddr, paddr + len)` lies inside the address space.
    fn check_range(&self, paddr: u64, len: usize) -> GuestMemoryResult<()> {
        let size = self.size();
        match paddr.checked_add(len as u64) {
            Some(end) if end <= size => Ok(()),
            _ => Err(GuestMemoryError::OutOfRange { paddr, len, size }),
        }
    }

    /// Like [`GuestMemory::check_range`], but reports how much of the range could be mapped.
    fn check_mapping(&self, paddr: u64, len: usize) -> GuestMemoryResult<()> {
        let mapped = self.size().saturating_sub(paddr);
        if mapped < len as u64 {
            return Err(GuestMemoryError::MappingTruncated {
                paddr,
                requested: len,
                mapped,
            });
        }
        Ok(())
    }

    fn read_u8_le(&self, paddr: u64) -> GuestMemoryResult<u8> {
        let mut buf = [0u8; 1];
        self.read_into(paddr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u32_le(&self, paddr: u64) -> GuestMemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(paddr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u8_le(&mut self, paddr: u64, value: u8) -> GuestMemoryResult<()> {
        self.write_from(paddr, &[value])
    }

    fn write_u32_le(&mut self, paddr: u64, value: u32) -> GuestMemoryResult<()> {
        self.write_from(paddr, &value.to_le_bytes())
    }
}

/// Flat, fully populated memory. Used for small windows such as the asset flash.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    bytes: Vec<u8>,
}

impl DenseMemory {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            bytes: vec![0; len],
        })
    }

    /// Build a dense memory whose contents are exactly `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    fn span(&self, paddr: u64, len: usize) -> GuestMemoryResult<Range<usize>> {
        self.check_range(paddr, len)?;
        // In range of a Vec, so the start fits in usize.
        let start = paddr as usize;
        Ok(start..start + len)
    }
}

impl GuestMemory for DenseMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let span = self.span(paddr, dst.len())?;
        dst.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        let span = self.span(paddr, src.len())?;
        self.bytes[span].copy_from_slice(src);
        Ok(())
    }
}

/// Memory whose pages are allocated on first write; untouched pages read as zero.
///
/// This backs the board's full 32-bit physical space, of which only SRAM, the framebuffer and the
/// command list block are ever touched.
#[derive(Debug, Clone)]
pub struct SparseMemory {
    size: u64,
    page_shift: u32,
    pages: BTreeMap<u64, Box<[u8]>>,
}

/// One page-local piece of an access: page number, offset within it, and the matching range of
/// the caller's buffer.
type Piece = (u64, usize, Range<usize>);

impl SparseMemory {
    pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        Self::with_page_size(size, Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(size: u64, page_size: usize) -> GuestMemoryResult<Self> {
        if !page_size.is_power_of_two() {
            return Err(GuestMemoryError::InvalidPageSize { page_size });
        }
        Ok(Self {
            size,
            page_shift: page_size.trailing_zeros(),
            pages: BTreeMap::new(),
        })
    }

    fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Number of pages that have been written to.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Split `[paddr, paddr + len)` at page boundaries. The range must already be checked.
    fn pieces(shift: u32, paddr: u64, len: usize) -> impl Iterator<Item = Piece> {
        let page_size = 1usize << shift;
        let mut done = 0usize;
        std::iter::from_fn(move || {
            if done == len {
                return None;
            }
            let addr = paddr + done as u64;
            let offset = (addr & (page_size as u64 - 1)) as usize;
            let take = (page_size - offset).min(len - done);
            let piece = (addr >> shift, offset, done..done + take);
            done += take;
            Some(piece)
        })
    }
}

impl GuestMemory for SparseMemory {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        self.check_range(paddr, dst.len())?;
        for (page, offset, span) in Self::pieces(self.page_shift, paddr, dst.len()) {
            let end = offset + span.len();
            let out = &mut dst[span];
            match self.pages.get(&page) {
                Some(bytes) => out.copy_from_slice(&bytes[offset..end]),
                None => out.fill(0),
            }
        }
        Ok(())
    }

    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        self.check_range(paddr, src.len())?;
        let page_size = self.page_size();
        for (page, offset, span) in Self::pieces(self.page_shift, paddr, src.len()) {
            let bytes = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0; page_size].into_boxed_slice());
            bytes[offset..offset + span.len()].copy_from_slice(&src[span]);
        }
        Ok(())
    }
}
