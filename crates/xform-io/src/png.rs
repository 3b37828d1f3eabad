//! PNG format support.
//!
//! Reading normalises every PNG to 8-bit RGB or RGBA: palettes and
//! low-bit grayscale are expanded, grayscale is widened to RGB and
//! 16-bit samples keep their high byte. Alpha is never dropped silently;
//! call [`DecodedImage::into_rgb`] to discard it explicitly.
//!
//! Writing takes any 3 or 4 bytes-per-pixel [`HostImage`], honouring its
//! row stride, with a zlib-style compression level from 0 to 9.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tracing::debug;
use xform_compute::HostImage;

use crate::{IoError, IoResult};

/// Highest accepted compression level.
pub const MAX_COMPRESSION: u8 = 9;

/// Decoded 8-bit image, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// 3 (RGB) or 4 (RGBA).
    pub bytes_per_pixel: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn has_alpha(&self) -> bool {
        self.bytes_per_pixel == 4
    }

    /// Drop the alpha channel, if any.
    pub fn into_rgb(self) -> Self {
        if !self.has_alpha() {
            return self;
        }
        let pixels = self
            .pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Self {
            bytes_per_pixel: 3,
            pixels,
            ..self
        }
    }

    /// Borrow as a host surface, layout unchanged.
    pub fn as_host(&self) -> HostImage<'_> {
        HostImage {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
            row_stride: self.width * self.bytes_per_pixel,
            bytes_per_pixel: self.bytes_per_pixel,
        }
    }
}

/// Reads a PNG file from the given path.
pub fn read<P: AsRef<Path>>(path: P) -> IoResult<DecodedImage> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder
        .read_info()
        .map_err(|e: png::DecodingError| IoError::DecodeError(e.to_string()))?;

    let buf_size = reader
        .output_buffer_size()
        .ok_or_else(|| IoError::DecodeError("cannot determine output buffer size".into()))?;
    let mut buf = vec![0u8; buf_size];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e: png::DecodingError| IoError::DecodeError(e.to_string()))?;
    let data = &buf[..info.buffer_size()];

    let (bytes_per_pixel, pixels) = match (info.color_type, info.bit_depth) {
        (png::ColorType::Rgb, png::BitDepth::Eight) => (3, data.to_vec()),
        (png::ColorType::Rgba, png::BitDepth::Eight) => (4, data.to_vec()),
        (png::ColorType::Rgb, png::BitDepth::Sixteen) => (3, high_bytes(data)),
        (png::ColorType::Rgba, png::BitDepth::Sixteen) => (4, high_bytes(data)),
        (png::ColorType::Grayscale, png::BitDepth::Eight) => {
            (3, data.iter().flat_map(|&g| [g, g, g]).collect())
        }
        (png::ColorType::Grayscale, png::BitDepth::Sixteen) => {
            (3, high_bytes(data).into_iter().flat_map(|g| [g, g, g]).collect())
        }
        (png::ColorType::GrayscaleAlpha, png::BitDepth::Eight) => (
            4,
            data.chunks_exact(2)
                .flat_map(|ga| [ga[0], ga[0], ga[0], ga[1]])
                .collect(),
        ),
        (png::ColorType::GrayscaleAlpha, png::BitDepth::Sixteen) => (
            4,
            high_bytes(data)
                .chunks_exact(2)
                .flat_map(|ga| [ga[0], ga[0], ga[0], ga[1]])
                .collect(),
        ),
        (color_type, bit_depth) => {
            return Err(IoError::UnsupportedLayout(format!("{color_type:?} {bit_depth:?}")));
        }
    };

    debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        bytes_per_pixel,
        "png decoded"
    );

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        bytes_per_pixel,
        pixels,
    })
}

/// Writes a host surface as an 8-bit PNG.
///
/// `compression` runs from 0 (store) to [`MAX_COMPRESSION`] (smallest).
pub fn write<P: AsRef<Path>>(path: P, surface: &HostImage<'_>, compression: u8) -> IoResult<()> {
    let path = path.as_ref();
    let level = compression_for(compression)?;
    let color_type = match surface.bytes_per_pixel {
        3 => png::ColorType::Rgb,
        4 => png::ColorType::Rgba,
        n => {
            return Err(IoError::UnsupportedLayout(format!("{n} bytes per pixel")));
        }
    };
    if surface.width == 0 || surface.height == 0 {
        return Err(IoError::EncodeError(format!(
            "empty surface {}x{}",
            surface.width, surface.height
        )));
    }

    let row_bytes = surface.width as usize * surface.bytes_per_pixel as usize;
    let stride = surface.row_stride as usize;
    let needed = stride * (surface.height as usize - 1) + row_bytes;
    if stride < row_bytes || surface.pixels.len() < needed {
        return Err(IoError::EncodeError(format!(
            "surface buffer too small: {} bytes for {}x{} with stride {}",
            surface.pixels.len(),
            surface.width,
            surface.height,
            stride
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * surface.height as usize);
    for y in 0..surface.height {
        packed.extend_from_slice(surface.row(y));
    }

    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, surface.width, surface.height);
    encoder.set_color(color_type);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(level);
    encoder.set_source_srgb(png::SrgbRenderingIntent::Perceptual);

    let mut png_writer = encoder
        .write_header()
        .map_err(|e| IoError::EncodeError(e.to_string()))?;
    png_writer
        .write_image_data(&packed)
        .map_err(|e| IoError::EncodeError(e.to_string()))?;
    png_writer
        .finish()
        .map_err(|e| IoError::EncodeError(e.to_string()))?;

    debug!(
        path = %path.display(),
        width = surface.width,
        height = surface.height,
        compression,
        "png encoded"
    );
    Ok(())
}

/// Map a 0-9 level onto the encoder presets.
fn compression_for(level: u8) -> IoResult<png::Compression> {
    Ok(match level {
        0 => png::Compression::NoCompression,
        1 => png::Compression::Fastest,
        2..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Balanced,
        7..=MAX_COMPRESSION => png::Compression::High,
        n => return Err(IoError::InvalidCompression(n)),
    })
}

/// Keep the most significant byte of big-endian 16-bit samples.
fn high_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.chunks_exact(2).map(|s| s[0]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, bpp: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * bpp) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128, 200][..bpp as usize]);
            }
        }
        data
    }

    #[test]
    fn test_roundtrip_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        let data = gradient(32, 16, 3);

        write(&path, &HostImage::rgb(&data, 32, 16), 6).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!((loaded.width, loaded.height, loaded.bytes_per_pixel), (32, 16, 3));
        assert_eq!(loaded.pixels, data);
        assert_eq!(loaded.as_host().pixel(3, 2), [24, 16, 128]);
    }

    #[test]
    fn test_rgba_kept_until_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgba.png");
        let data = gradient(8, 8, 4);
        let surface = HostImage {
            pixels: &data,
            width: 8,
            height: 8,
            row_stride: 32,
            bytes_per_pixel: 4,
        };

        write(&path, &surface, 1).unwrap();
        let loaded = read(&path).unwrap();
        assert!(loaded.has_alpha());
        assert!(loaded.as_host().validate().is_err());

        let rgb = loaded.into_rgb();
        assert_eq!(rgb.bytes_per_pixel, 3);
        assert_eq!(rgb.pixels, gradient(8, 8, 3));
        assert!(rgb.as_host().validate().is_ok());
    }

    #[test]
    fn test_write_honours_stride() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.png");
        #[rustfmt::skip]
        let padded = [
            1, 2, 3, 4, 5, 6, 0, 0,
            7, 8, 9, 10, 11, 12,
        ];
        let surface = HostImage {
            pixels: &padded,
            width: 2,
            height: 2,
            row_stride: 8,
            bytes_per_pixel: 3,
        };

        write(&path, &surface, 9).unwrap();
        assert_eq!(read(&path).unwrap().pixels, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_compression_levels() {
        for level in 0..=MAX_COMPRESSION {
            assert!(compression_for(level).is_ok());
        }
        assert!(matches!(compression_for(10), Err(IoError::InvalidCompression(10))));
    }

    #[test]
    fn test_short_surface_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = [0u8; 5];
        let err = write(dir.path().join("short.png"), &HostImage::rgb(&data, 2, 1), 6).unwrap_err();
        assert!(matches!(err, IoError::EncodeError(_)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(read("/nonexistent/xform.png"), Err(IoError::Io(_))));
    }

    #[test]
    fn test_high_bytes() {
        assert_eq!(high_bytes(&[0xAB, 0xCD, 0x01, 0x02]), vec![0xAB, 0x01]);
    }
}
