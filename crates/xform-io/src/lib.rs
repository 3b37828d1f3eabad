//! Host-side image files for xform.
//!
//! Decodes PNG files into host buffers that
//! [`xform_compute::Environment::create_source_image`] accepts, and encodes
//! the surfaces of read-back destination images.
//!
//! ```rust,ignore
//! let decoded = xform_io::png::read("in.png")?.into_rgb();
//! let src = env.create_source_image(&decoded.as_host())?;
//! let out = env.rotate(&src, 0.5)?;
//! xform_io::png::write("out.png", &out.surface().unwrap(), 6)?;
//! ```

mod error;
pub mod png;

pub use error::{IoError, IoResult};
pub use self::png::DecodedImage;
