//! Single-channel conversion buffers and the YUYV plane splitters.
//!
//! The stereo camera packs its two sensors into one YUYV stream: every even
//! byte belongs to the left image and every odd byte to the right one.

use crate::error::DeviceCode;
use crate::traits::{DeviceResult, FourCC, RawFrame};

/// Source of conversion buffers.
pub trait FrameAllocator: Send + Sync {
    /// Allocate a zeroed buffer of `len` bytes, or `None` if memory is short.
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;

    /// Take back a buffer handed out by [`FrameAllocator::allocate`].
    fn release(&self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Heap allocator that reports exhaustion instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl FrameAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).ok()?;
        buffer.resize(len, 0);
        Some(buffer)
    }
}

/// A width×height single-channel buffer, returned to its allocator on drop.
pub struct GrayBuffer<'a> {
    width: u32,
    height: u32,
    data: Option<Vec<u8>>,
    allocator: &'a dyn FrameAllocator,
}

impl<'a> GrayBuffer<'a> {
    /// Allocate a buffer for a `width`×`height` image.
    pub fn allocate(allocator: &'a dyn FrameAllocator, width: u32, height: u32) -> Option<Self> {
        let len = (width as usize).checked_mul(height as usize)?;
        let data = allocator.allocate(len)?;
        Some(Self {
            width,
            height,
            data: Some(data),
            allocator,
        })
    }

    /// Writable bytes of the buffer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }

    /// Read/write image view over the buffer.
    pub fn view_mut(&mut self) -> GrayView<'_> {
        GrayView {
            width: self.width,
            height: self.height,
            data: self.data.as_deref_mut().unwrap_or_default(),
        }
    }
}

impl Drop for GrayBuffer<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.allocator.release(data);
        }
    }
}

/// Borrowed 8-bit single-channel image.
#[derive(Debug)]
pub struct GrayView<'a> {
    width: u32,
    height: u32,
    data: &'a mut [u8],
}

impl<'a> GrayView<'a> {
    /// Wrap `data` as a `width`×`height` image. `None` if the sizes disagree.
    pub fn new(width: u32, height: u32, data: &'a mut [u8]) -> Option<Self> {
        let len = (width as usize).checked_mul(height as usize)?;
        (data.len() == len).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Image width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel data.
    pub fn as_slice(&self) -> &[u8] {
        self.data
    }

    /// Mutable row-major pixel data.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data
    }

    /// One row of pixels.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if self.width == 0 {
            return None;
        }
        self.data.chunks_exact(self.width as usize).nth(y as usize)
    }

    /// Pixel value at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        self.offset(x, y).and_then(|offset| self.data.get(offset).copied())
    }

    /// Overwrite the pixel at (`x`, `y`). Returns `false` when out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u8) -> bool {
        match self.offset(x, y).and_then(|offset| self.data.get_mut(offset)) {
            Some(pixel) => {
                *pixel = value;
                true
            }
            None => false,
        }
    }

    /// Mean intensity of the image.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&p| u64::from(p)).sum();
        #[allow(clippy::cast_precision_loss)]
        {
            sum as f64 / self.data.len() as f64
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }
}

/// Copy the luma bytes of a YUYV frame into `out`.
pub fn yuyv_to_luma(frame: &RawFrame<'_>, out: &mut [u8]) -> DeviceResult<()> {
    split_plane(frame, out, 0)
}

/// Copy the chroma bytes of a YUYV frame into `out`.
pub fn yuyv_to_chroma(frame: &RawFrame<'_>, out: &mut [u8]) -> DeviceResult<()> {
    split_plane(frame, out, 1)
}

fn split_plane(frame: &RawFrame<'_>, out: &mut [u8], phase: usize) -> DeviceResult<()> {
    if frame.fourcc != FourCC::YUYV {
        return Err(DeviceCode::InvalidParam);
    }
    let pixels = frame.pixel_count().ok_or(DeviceCode::InvalidParam)?;
    if frame.data.len() < pixels.saturating_mul(2) {
        return Err(DeviceCode::InvalidParam);
    }
    if out.len() < pixels {
        return Err(DeviceCode::NoMem);
    }

    let source = frame.data.iter().skip(phase).step_by(2);
    for (dst, src) in out.iter_mut().take(pixels).zip(source) {
        *dst = *src;
    }
    Ok(())
}
