//! Device image representation.
//!
//! Host pixels are packed RGB8. The device has no three-channel 8-bit
//! texture format, so images live on the GPU as `Rgba8Unorm` with an
//! opaque alpha that is added on upload and stripped on readback.

use std::sync::PoisonError;
use std::time::Duration;

use crate::environment::Environment;
use crate::{XformError, XformResult};

/// Bytes per host pixel. The only accepted host layout is RGB8.
pub const BYTES_PER_PIXEL: u32 = 3;

/// Texel format of every device image.
pub(crate) const DEVICE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const DEVICE_BYTES_PER_PIXEL: u32 = 4;

// =============================================================================
// HostImage
// =============================================================================

/// Borrowed view of a host pixel buffer.
///
/// This is what a decoder hands to [`Environment::create_source_image`] and
/// what [`DestinationImage::surface`] hands to an encoder.
#[derive(Debug, Clone, Copy)]
pub struct HostImage<'a> {
    /// Pixel bytes, row-major.
    pub pixels: &'a [u8],
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: u32,
    /// Bytes per pixel of `pixels`.
    pub bytes_per_pixel: u32,
}

impl<'a> HostImage<'a> {
    /// Tightly packed RGB8 buffer.
    pub fn rgb(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            row_stride: width * BYTES_PER_PIXEL,
            bytes_per_pixel: BYTES_PER_PIXEL,
        }
    }

    /// Check format, dimensions and buffer length.
    pub fn validate(&self) -> XformResult<()> {
        if self.bytes_per_pixel != BYTES_PER_PIXEL {
            return Err(XformError::UnsupportedFormat {
                bytes_per_pixel: self.bytes_per_pixel,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(XformError::InvalidDimensions(self.width, self.height));
        }

        let row_bytes = self.width as usize * BYTES_PER_PIXEL as usize;
        let stride = self.row_stride as usize;
        if stride < row_bytes {
            return Err(XformError::BufferSizeMismatch {
                expected: row_bytes,
                actual: stride,
            });
        }

        let expected = stride * (self.height as usize - 1) + row_bytes;
        if self.pixels.len() < expected {
            return Err(XformError::BufferSizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Active pixel bytes of row `y`, padding excluded.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.row_stride as usize;
        let len = self.width as usize * self.bytes_per_pixel as usize;
        &self.pixels[start..start + len]
    }

    /// Pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let row = self.row(y);
        let i = x as usize * BYTES_PER_PIXEL as usize;
        [row[i], row[i + 1], row[i + 2]]
    }
}

/// Expand validated RGB8 rows into tightly packed RGBA8 with opaque alpha.
pub(crate) fn expand_rgba(host: &HostImage<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(host.width as usize * host.height as usize * 4);
    for y in 0..host.height {
        for rgb in host.row(y).chunks_exact(3) {
            out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
    out
}

/// Strip row padding and alpha from a readback buffer.
pub(crate) fn pack_rgb(padded: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        let start = y * padded_row as usize;
        let row = &padded[start..start + width as usize * 4];
        for rgba in row.chunks_exact(4) {
            out.extend_from_slice(&rgba[..3]);
        }
    }
    out
}

/// Row pitch of a texture-to-buffer copy, aligned for wgpu.
pub(crate) fn padded_row_bytes(width: u32) -> u32 {
    (width * DEVICE_BYTES_PER_PIXEL).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Rows of `width` pixels a readback buffer of `max_buffer_size` bytes holds.
pub(crate) fn readback_rows(width: u32, max_buffer_size: u64) -> u32 {
    let rows = max_buffer_size / u64::from(padded_row_bytes(width));
    u32::try_from(rows).unwrap_or(u32::MAX)
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

// =============================================================================
// SourceImage
// =============================================================================

/// Read-only image on the device, initialised from host pixels.
pub struct SourceImage {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl SourceImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.texture.format())
            .finish()
    }
}

// =============================================================================
// DestinationImage
// =============================================================================

/// Write-only image on the device plus the host buffer it is read back into.
///
/// The host buffer is filled exactly once, by the readback that follows
/// the single dispatch targeting this image. Surfaces built from it borrow
/// it and cannot outlive the image.
pub struct DestinationImage {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    width: u32,
    height: u32,
    pixels: Option<Vec<u8>>,
    kernel_time: Option<Duration>,
}

impl DestinationImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the readback has happened.
    pub fn is_read_back(&self) -> bool {
        self.pixels.is_some()
    }

    /// Packed RGB8 pixels, once read back.
    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    /// Take ownership of the read-back pixels.
    pub fn into_pixels(self) -> Option<Vec<u8>> {
        self.pixels
    }

    /// GPU time spent in the kernel, when the environment profiles.
    pub fn kernel_time(&self) -> Option<Duration> {
        self.kernel_time
    }

    /// Host surface over the read-back pixels, tied to this image's lifetime.
    pub fn surface(&self) -> Option<HostImage<'_>> {
        self.pixels()
            .map(|pixels| HostImage::rgb(pixels, self.width, self.height))
    }

    pub(crate) fn complete(&mut self, pixels: Vec<u8>, kernel_time: Option<Duration>) -> &[u8] {
        self.kernel_time = kernel_time;
        self.pixels.insert(pixels).as_slice()
    }
}

impl std::fmt::Debug for DestinationImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("read_back", &self.is_read_back())
            .field("kernel_time", &self.kernel_time)
            .finish()
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Environment {
    /// Upload a host RGB8 buffer into a new read-only device image.
    ///
    /// The pixels are copied during the call; `host` may be reused as soon
    /// as this returns.
    pub fn create_source_image(&self, host: &HostImage<'_>) -> XformResult<SourceImage> {
        host.validate()?;
        self.check_size(host.width, host.height)?;

        let size = extent(host.width, host.height);
        let rgba = expand_rgba(host);

        let _guard = self.invocation.lock().unwrap_or_else(PoisonError::into_inner);
        self.push_scopes();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("xform_source_image"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEVICE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            texture.as_image_copy(),
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(host.width * DEVICE_BYTES_PER_PIXEL),
                rows_per_image: Some(host.height),
            },
            size,
        );
        self.pop_scopes(XformError::ImageCreation)?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::trace!(width = host.width, height = host.height, "source image uploaded");

        Ok(SourceImage {
            texture,
            view,
            width: host.width,
            height: host.height,
        })
    }

    /// Allocate an uninitialised write-only device image.
    ///
    /// Besides the texture limit, the image must fit the buffer it is read
    /// back through.
    pub fn create_destination_image(
        &self,
        width: u32,
        height: u32,
    ) -> XformResult<DestinationImage> {
        if width == 0 || height == 0 {
            return Err(XformError::InvalidDimensions(width, height));
        }
        self.check_size(width, height)?;
        let rows = readback_rows(width, self.limits.max_buffer_size);
        if height > rows {
            return Err(XformError::ImageTooLarge {
                width,
                height,
                limit: rows,
            });
        }

        let _guard = self.invocation.lock().unwrap_or_else(PoisonError::into_inner);
        self.push_scopes();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("xform_destination_image"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEVICE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        self.pop_scopes(XformError::ImageCreation)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(DestinationImage {
            texture,
            view,
            width,
            height,
            pixels: None,
            kernel_time: None,
        })
    }

    fn check_size(&self, width: u32, height: u32) -> XformResult<()> {
        let limit = self.limits.max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(XformError::ImageTooLarge { width, height, limit });
        }
        Ok(())
    }
}
