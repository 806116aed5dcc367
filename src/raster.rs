//! Pixel buffers and the one-shot render path
//!
//! Pixels are RGBA with premultiplied alpha, row-major from the top-left
//! corner, 4 bytes per pixel.

use log::debug;
use rayon::prelude::*;

use crate::backend::NativePage;
use crate::error::{BridgeError, BridgeResult};
use crate::geometry::{self, Size};
use crate::viewport::{self, Viewport};

pub const BYTES_PER_PIXEL: usize = 4;

/// Byte written to every channel when the background is filled
pub const BACKGROUND_FILL: u8 = 0xFF;

/// Largest side accepted when no limit is configured
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// Validates a surface size and returns its byte length.
pub fn checked_byte_len(width: u32, height: u32, max_dimension: u32) -> BridgeResult<usize> {
    if width == 0 || height == 0 {
        return Err(BridgeError::invalid(format!(
            "Invalid surface size {width}x{height}"
        )));
    }
    if width > max_dimension || height > max_dimension {
        return Err(BridgeError::invalid(format!(
            "Surface size {width}x{height} exceeds the {max_dimension}px limit"
        )));
    }
    (width as usize)
        .checked_mul(BYTES_PER_PIXEL)
        .and_then(|stride| stride.checked_mul(height as usize))
        .ok_or_else(|| BridgeError::invalid(format!("Surface size {width}x{height} overflows")))
}

/// Owned RGBA pixel buffer
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl PixelBuffer {
    /// Allocates a buffer with every byte set to `fill`.
    pub fn filled(width: u32, height: u32, fill: u8, max_dimension: u32) -> BridgeResult<Self> {
        let len = checked_byte_len(width, height, max_dimension)?;
        Ok(Self {
            width,
            height,
            pixels: vec![fill; len],
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA value at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = &self.pixels[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn region_mut(&mut self) -> PixelRegion<'_> {
        let stride = self.stride();
        PixelRegion {
            data: &mut self.pixels,
            width: self.width,
            height: self.height,
            stride,
        }
    }

    /// Mutable view of the `width` x `height` rectangle at `(x, y)`.
    pub fn sub_region_mut(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> BridgeResult<PixelRegion<'_>> {
        let fits_x = x.checked_add(width).is_some_and(|right| right <= self.width);
        let fits_y = y.checked_add(height).is_some_and(|bottom| bottom <= self.height);
        if width == 0 || height == 0 || !fits_x || !fits_y {
            return Err(BridgeError::invalid(format!(
                "Rectangle {width}x{height}+{x}+{y} does not fit a {}x{} surface",
                self.width, self.height
            )));
        }

        let stride = self.stride();
        let start = y as usize * stride + x as usize * BYTES_PER_PIXEL;
        Ok(PixelRegion {
            data: &mut self.pixels[start..],
            width,
            height,
            stride,
        })
    }
}

/// Mutable rectangular view into a pixel buffer.
///
/// Row `r` starts at `r * stride` bytes into `data` and spans
/// `width * 4` bytes.
pub struct PixelRegion<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl PixelRegion<'_> {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    pub fn fill(&mut self, value: u8) {
        for y in 0..self.height {
            self.row_mut(y).fill(value);
        }
    }
}

/// Flags and viewport for one render
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRequest {
    pub viewport: Viewport,
    pub background_fill: bool,
    pub antialias: bool,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            background_fill: true,
            antialias: true,
        }
    }
}

/// Completed one-shot render
#[derive(Debug)]
pub struct RasterResult {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub full_width: f64,
    pub full_height: f64,
    /// Effective page size
    pub page_size: Size,
    pub buffer: PixelBuffer,
}

/// Renders the requested part of `page` into a freshly allocated buffer.
///
/// The buffer is validated before it is allocated and dropped on every
/// error path.
pub fn render_to_buffer<P: NativePage>(
    page: &P,
    request: &RenderRequest,
    max_dimension: u32,
) -> BridgeResult<RasterResult> {
    let page_geometry = page.geometry();
    let page_size = geometry::effective_size(&page_geometry);
    let mapping = viewport::map(page_size, &request.viewport)?;

    let fill = if request.background_fill {
        BACKGROUND_FILL
    } else {
        0
    };
    let mut buffer =
        PixelBuffer::filled(mapping.out_width, mapping.out_height, fill, max_dimension)?;

    let transform = geometry::rotation_transform(&page_geometry).then(&mapping.device_transform());
    page.draw(&mut buffer.region_mut(), &transform, request.antialias)?;

    debug!(
        "Rendered {}x{} at ({}, {}) of {}x{} (page {}x{})",
        mapping.out_width,
        mapping.out_height,
        mapping.x,
        mapping.y,
        mapping.full_width,
        mapping.full_height,
        page_size.width,
        page_size.height
    );

    Ok(RasterResult {
        x: mapping.x,
        y: mapping.y,
        width: mapping.out_width,
        height: mapping.out_height,
        full_width: mapping.full_width,
        full_height: mapping.full_height,
        page_size,
        buffer,
    })
}

/// Converts premultiplied RGBA to straight alpha in place.
pub fn unpremultiply(pixels: &mut [u8]) {
    pixels
        .par_chunks_exact_mut(BYTES_PER_PIXEL)
        .for_each(|px| {
            let alpha = u16::from(px[3]);
            if alpha == 0 || alpha == 255 {
                return;
            }
            for channel in &mut px[..3] {
                let straight = (u16::from(*channel) * 255 + alpha / 2) / alpha;
                *channel = straight.min(255) as u8;
            }
        });
}
