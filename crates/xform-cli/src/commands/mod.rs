//! CLI command implementations

pub mod affine;
pub mod devices;
pub mod flip;
pub mod rotate;
pub mod scale;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};
use xform_compute::{DestinationImage, Environment, EnvironmentConfig, HostImage, SourceImage};
use xform_io::DecodedImage;

use crate::OutputArgs;

/// Flags shared by every command.
pub struct GlobalOpts {
    pub adapter: Option<usize>,
    pub profiling: bool,
}

impl GlobalOpts {
    /// Environment variables first, then command-line overrides.
    pub fn config(&self) -> EnvironmentConfig {
        let mut config = EnvironmentConfig::from_env();
        if let Some(index) = self.adapter {
            config = config.with_adapter(index);
        }
        if !self.profiling {
            config = config.with_profiling(false);
        }
        config
    }

    pub fn environment(&self) -> Result<Environment> {
        let env = Environment::with_config(self.config())
            .context("Failed to create compute environment")?;
        info!("Device: {}", env.device_name());
        Ok(env)
    }
}

/// Load a PNG as packed RGB8.
pub fn load_image(path: &Path) -> Result<DecodedImage> {
    let image = xform_io::png::read(path)
        .with_context(|| format!("Failed to load: {}", path.display()))?;
    if image.has_alpha() {
        warn!("{}: alpha channel discarded", path.display());
    }
    Ok(image.into_rgb())
}

/// Load a PNG and upload it as a source image.
pub fn load_source(env: &Environment, path: &Path) -> Result<(DecodedImage, SourceImage)> {
    let image = load_image(path)?;
    info!("Loaded {} ({}x{})", path.display(), image.width, image.height);
    let src = env
        .create_source_image(&image.as_host())
        .with_context(|| format!("Failed to upload: {}", path.display()))?;
    Ok((image, src))
}

/// Save a host surface as PNG.
pub fn save_surface(out: &OutputArgs, surface: &HostImage<'_>) -> Result<()> {
    xform_io::png::write(&out.output, surface, out.compression)
        .with_context(|| format!("Failed to save: {}", out.output.display()))?;
    info!("Saved {} ({}x{})", out.output.display(), surface.width, surface.height);
    Ok(())
}

/// Save a transformed image, reporting kernel time when profiled.
pub fn save_result(out: &OutputArgs, image: &DestinationImage) -> Result<()> {
    if let Some(time) = image.kernel_time() {
        info!("Kernel time: {:.3} ms", time.as_secs_f64() * 1e3);
    }
    let surface = image.surface().context("Transform produced no pixels")?;
    save_surface(out, &surface)
}

/// Parse "a,b,..." into exactly `N` floats.
pub fn parse_floats<const N: usize>(s: &str, what: &str) -> Result<[f32; N]> {
    let values: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .with_context(|| format!("Invalid {what}: {s}"))?;
    values
        .try_into()
        .map_err(|v: Vec<f32>| {
            anyhow::anyhow!("Invalid {what}: expected {N} values, got {}", v.len())
        })
}

/// Parse "WxH".
pub fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid size {s}, expected WxH"))?;
    let w = w.trim().parse::<u32>().with_context(|| format!("Invalid width: {w}"))?;
    let h = h.trim().parse::<u32>().with_context(|| format!("Invalid height: {h}"))?;
    Ok((w, h))
}
