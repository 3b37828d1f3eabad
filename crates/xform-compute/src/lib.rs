//! GPU-accelerated 2D image transforms.
//!
//! Compiles a fixed library of per-pixel compute kernels once, then
//! dispatches them against device-resident RGB8 images to scale, rotate,
//! flip and affine-warp them using wgpu.
//!
//! # Architecture
//!
//! ```text
//! Environment (adapter, device, queue, kernel registry)
//!     ├── SourceImage       (read-only texture, copied from host RGB)
//!     ├── DestinationImage  (write-only storage texture + host readback)
//!     ├── invoke()          (bind args -> dispatch -> blocking readback)
//!     └── scale / rotate / flip / affine
//! ```
//!
//! # Example
//!
//! ```ignore
//! use xform_compute::{Environment, HostImage};
//!
//! let env = Environment::new()?;
//! let src = env.create_source_image(&HostImage::rgb(&pixels, 640, 480))?;
//! let scaled = env.scale(&src, 2.0, 2.0)?;
//! let surface = scaled.surface().expect("read back");
//! ```

pub mod config;
pub mod dispatch;
pub mod environment;
pub mod image;
pub mod kernel;
pub mod ops;
mod profiling;
mod shaders;

pub use config::EnvironmentConfig;
pub use dispatch::DispatchGrid;
pub use environment::{AdapterSummary, Environment, adapters};
pub use image::{BYTES_PER_PIXEL, DestinationImage, HostImage, SourceImage};
pub use kernel::{ArgKind, KERNELS, KernelArg, KernelSignature};
pub use ops::{AffineTransform, Flipped};

use thiserror::Error;

/// Errors from environment construction, image creation and kernel invocation.
#[derive(Error, Debug)]
pub enum XformError {
    #[error("Device unsupported: {0}")]
    DeviceUnsupported(String),

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Kernel build failed ({}): {log}", .kernel.unwrap_or("program"))]
    BuildFailure {
        kernel: Option<&'static str>,
        log: String,
    },

    #[error("Unsupported host format: {bytes_per_pixel} bytes per pixel (expected 3, RGB8)")]
    UnsupportedFormat { bytes_per_pixel: u32 },

    #[error("Unknown kernel: {0}")]
    UnknownKernel(String),

    #[error("Argument {index} of {kernel} could not be bound: {reason}")]
    ArgumentBindingFailed {
        kernel: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Kernel dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Readback failed: {0}")]
    ReadbackFailed(String),

    #[error("Failed to create image: {0}")]
    ImageCreation(String),

    #[error("Device out of memory: {0}")]
    AllocationFailed(String),

    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),

    /// `limit` is the largest extent the device accepts along the
    /// offending axis: the texture dimension limit, or the row count the
    /// readback buffer can hold at this width.
    #[error("Image too large: {width}x{height} exceeds GPU limit {limit}")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Destination image was already read back")]
    DestinationAlreadyRead,
}

pub type XformResult<T> = Result<T, XformError>;
