//! Pixel surfaces bound through `BIND_TEX`.
//!
//! A destination surface is a write mapping over primary memory and commits its bytes back when
//! released (or dropped). Source and mask surfaces are private copies.

use core::fmt;
use std::fmt::Write as _;

use nema_protocol::NemaTexSlot;
use slate_memory::{MemoryView, WriteMapping};

use crate::config::AssetWindow;
use crate::error::NemaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit little-endian `0xAARRGGBB`, premultiplied.
    Argb8888,
    /// 8-bit coverage.
    A8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Argb8888 => 4,
            Self::A8 => 1,
        }
    }

    pub const fn for_slot(slot: NemaTexSlot) -> Self {
        match slot {
            NemaTexSlot::Destination | NemaTexSlot::Source => Self::Argb8888,
            NemaTexSlot::Mask => Self::A8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceLayout {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
}

impl SurfaceLayout {
    /// Check a guest-supplied layout before any memory is touched.
    pub fn validate(
        width: u32,
        height: u32,
        stride: i32,
        format: PixelFormat,
    ) -> Result<Self, NemaError> {
        let invalid = NemaError::InvalidStride {
            stride,
            width,
            format,
        };
        let Ok(stride_bytes) = usize::try_from(stride) else {
            return Err(invalid);
        };
        let row_bytes = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(NemaError::SurfaceTooLarge { stride, height })?;
        if stride_bytes < row_bytes {
            return Err(invalid);
        }
        if format == PixelFormat::Argb8888 && stride_bytes % 4 != 0 {
            return Err(invalid);
        }

        let layout = Self {
            width,
            height,
            stride: stride_bytes,
            format,
        };
        match layout.checked_byte_len() {
            Some(len) if u32::try_from(len).is_ok() => Ok(layout),
            _ => Err(NemaError::SurfaceTooLarge { stride, height }),
        }
    }

    fn checked_byte_len(&self) -> Option<usize> {
        self.stride.checked_mul(self.height as usize)
    }

    pub fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(y as usize * self.stride + x as usize * self.format.bytes_per_pixel())
    }
}

enum Backing {
    Mapped(WriteMapping),
    Owned(Vec<u8>),
}

pub struct Surface {
    layout: SurfaceLayout,
    backing: Backing,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("layout", &self.layout)
            .field("write_mapped", &self.is_write_mapped())
            .finish()
    }
}

impl Surface {
    /// Surface over a private buffer of exactly `layout.byte_len()` bytes.
    pub fn owned(layout: SurfaceLayout, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), layout.byte_len());
        Self {
            layout,
            backing: Backing::Owned(data),
        }
    }

    fn mapped(layout: SurfaceLayout, mapping: WriteMapping) -> Self {
        Self {
            layout,
            backing: Backing::Mapped(mapping),
        }
    }

    pub fn layout(&self) -> SurfaceLayout {
        self.layout
    }

    pub fn is_write_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(m) => &m[..],
            Backing::Owned(v) => &v[..],
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Mapped(m) => &mut m[..],
            Backing::Owned(v) => &mut v[..],
        }
    }

    /// Release the surface, committing a write-mapped destination back to guest memory.
    pub fn release(self) -> Result<(), NemaError> {
        match self.backing {
            Backing::Mapped(m) => Ok(m.unmap()?),
            Backing::Owned(_) => Ok(()),
        }
    }

    pub fn pixels(&self) -> PixelView<'_> {
        PixelView {
            layout: self.layout,
            data: self.bytes(),
        }
    }

    pub fn pixels_mut(&mut self) -> PixelViewMut<'_> {
        let layout = self.layout;
        PixelViewMut {
            layout,
            data: self.bytes_mut(),
        }
    }

    /// Raw ARGB target for path rendering. Has no notion of masks.
    pub fn drawable(&mut self) -> Option<Drawable<'_>> {
        if self.layout.format != PixelFormat::Argb8888 {
            return None;
        }
        let SurfaceLayout {
            width,
            height,
            stride,
            ..
        } = self.layout;
        Some(Drawable {
            width,
            height,
            stride,
            data: self.bytes_mut(),
        })
    }
}

/// Read access to a surface with transparent sampling outside its bounds.
#[derive(Clone, Copy)]
pub struct PixelView<'a> {
    layout: SurfaceLayout,
    data: &'a [u8],
}

impl PixelView<'_> {
    pub fn layout(&self) -> SurfaceLayout {
        self.layout
    }

    /// Premultiplied ARGB at `(x, y)`, or 0 outside the surface.
    pub fn argb(&self, x: i64, y: i64) -> u32 {
        match self.layout.format {
            PixelFormat::Argb8888 => self
                .layout
                .offset(x, y)
                .and_then(|o| self.data.get(o..o + 4))
                .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            PixelFormat::A8 => u32::from(self.coverage(x, y)) << 24,
        }
    }

    /// Coverage at `(x, y)`: the byte for `A8`, the alpha channel for ARGB, 0 outside.
    pub fn coverage(&self, x: i64, y: i64) -> u8 {
        match self.layout.format {
            PixelFormat::A8 => self
                .layout
                .offset(x, y)
                .and_then(|o| self.data.get(o).copied())
                .unwrap_or(0),
            PixelFormat::Argb8888 => (self.argb(x, y) >> 24) as u8,
        }
    }
}

pub struct PixelViewMut<'a> {
    layout: SurfaceLayout,
    data: &'a mut [u8],
}

impl PixelViewMut<'_> {
    pub fn layout(&self) -> SurfaceLayout {
        self.layout
    }

    pub fn argb(&self, x: i64, y: i64) -> u32 {
        PixelView {
            layout: self.layout,
            data: &*self.data,
        }
        .argb(x, y)
    }

    /// Store an ARGB pixel; writes outside the surface are dropped.
    pub fn put_argb(&mut self, x: i64, y: i64, argb: u32) {
        if self.layout.format != PixelFormat::Argb8888 {
            return;
        }
        if let Some(px) = self
            .layout
            .offset(x, y)
            .and_then(|o| self.data.get_mut(o..o + 4))
        {
            px.copy_from_slice(&argb.to_le_bytes());
        }
    }
}

/// Mutable ARGB8888 pixel rows handed to the vector rasterizer.
pub struct Drawable<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a mut [u8],
}

/// Copy `height` rows of `stride` bytes into rows padded to a multiple of 4, zeroing the padding.
///
/// Returns the new buffer and stride, or `None` if the stride is already aligned.
pub fn pad_mask_rows(data: &[u8], stride: usize, height: u32) -> Option<(Vec<u8>, usize)> {
    if stride % 4 == 0 {
        return None;
    }
    let padded = stride.next_multiple_of(4);
    let mut out = vec![0u8; padded * height as usize];
    for (src, dst) in data
        .chunks_exact(stride)
        .zip(out.chunks_exact_mut(padded))
        .take(height as usize)
    {
        dst[..stride].copy_from_slice(src);
    }
    Some((out, padded))
}

/// Resolves `BIND_TEX` records into surfaces.
pub struct SurfaceAcquirer<'a> {
    primary: &'a MemoryView,
    assets: &'a MemoryView,
    asset_window: AssetWindow,
    trace_masks: bool,
}

impl<'a> SurfaceAcquirer<'a> {
    pub fn new(
        primary: &'a MemoryView,
        assets: &'a MemoryView,
        asset_window: AssetWindow,
        trace_masks: bool,
    ) -> Self {
        Self {
            primary,
            assets,
            asset_window,
            trace_masks,
        }
    }

    pub fn acquire(
        &self,
        slot: NemaTexSlot,
        paddr: u32,
        width: u32,
        height: u32,
        stride: i32,
    ) -> Result<Surface, NemaError> {
        let layout = SurfaceLayout::validate(width, height, stride, PixelFormat::for_slot(slot))?;
        let paddr = u64::from(paddr);
        let len = layout.byte_len();

        match slot {
            NemaTexSlot::Destination => {
                let mapping = self.primary.map_write(paddr, len)?;
                Ok(Surface::mapped(layout, mapping))
            }
            NemaTexSlot::Source => Ok(Surface::owned(layout, self.read_copy(paddr, len)?)),
            NemaTexSlot::Mask => {
                let data = self.read_copy(paddr, len)?;
                let surface = match pad_mask_rows(&data, layout.stride, height) {
                    Some((padded, stride)) => Surface::owned(SurfaceLayout { stride, ..layout }, padded),
                    None => Surface::owned(layout, data),
                };
                if self.trace_masks {
                    trace_mask(&surface);
                }
                Ok(surface)
            }
        }
    }

    fn read_copy(&self, paddr: u64, len: usize) -> Result<Vec<u8>, NemaError> {
        Ok(match self.asset_window.translate(paddr) {
            Some(asset_addr) => self.assets.read_copy(asset_addr, len)?,
            None => self.primary.read_copy(paddr, len)?,
        })
    }
}

fn trace_mask(mask: &Surface) {
    let layout = mask.layout();
    tracing::trace!(
        width = layout.width,
        height = layout.height,
        stride = layout.stride,
        "mask"
    );
    for (y, row) in mask
        .bytes()
        .chunks_exact(layout.stride.max(1))
        .take(layout.height as usize)
        .enumerate()
    {
        let mut line = String::with_capacity(layout.width as usize * 3);
        for b in &row[..layout.width as usize] {
            let _ = write!(line, "{b:02x} ");
        }
        tracing::trace!(row = y, "{}", line.trim_end());
    }
}
