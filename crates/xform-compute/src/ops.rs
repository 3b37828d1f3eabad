//! GPU image transforms.
//!
//! Each operation derives its kernel parameters and destination size on
//! the host, then runs exactly one kernel through [`Environment::invoke`].
//! The returned [`DestinationImage`] already holds the read-back pixels.

use glam::{Mat2, Vec2};

use crate::environment::Environment;
use crate::image::{DestinationImage, SourceImage};
use crate::kernel::{self, KernelArg};
use crate::{XformError, XformResult};

// =============================================================================
// Parameter derivation
// =============================================================================

/// Destination size of a scale: `(round(w * fx), round(h * fy))`.
pub fn scaled_size(width: u32, height: u32, fx: f32, fy: f32) -> XformResult<(u32, u32)> {
    check_factor("fx", fx)?;
    check_factor("fy", fy)?;

    let round = |len: u32, f: f32| (len as f64 * f as f64).round();
    let (w, h) = (round(width, fx), round(height, fy));
    if w < 1.0 || h < 1.0 || w > u32::MAX as f64 || h > u32::MAX as f64 {
        return Err(XformError::InvalidDimensions(
            w.min(u32::MAX as f64) as u32,
            h.min(u32::MAX as f64) as u32,
        ));
    }
    Ok((w as u32, h as u32))
}

/// Kernel arguments of `image_recscale`: the reciprocal factors.
pub fn reciprocal_factors(fx: f32, fy: f32) -> XformResult<[KernelArg; 2]> {
    check_factor("fx", fx)?;
    check_factor("fy", fy)?;
    Ok([KernelArg::Float(1.0 / fx), KernelArg::Float(1.0 / fy)])
}

/// Kernel arguments of `image_rotate`: `(sin, cos)` of the angle in radians.
pub fn rotation_params(angle: f32) -> XformResult<[KernelArg; 2]> {
    if !angle.is_finite() {
        return Err(XformError::InvalidParameter(format!("angle must be finite, got {angle}")));
    }
    let (s, c) = angle.sin_cos();
    Ok([KernelArg::Float(s), KernelArg::Float(c)])
}

/// Kernel for a flip, `None` when nothing is flipped.
pub fn flip_kernel(horizontal: bool, vertical: bool) -> Option<&'static str> {
    match (horizontal, vertical) {
        (false, false) => None,
        (true, false) => Some(kernel::FLIP_H),
        (false, true) => Some(kernel::FLIP_V),
        (true, true) => Some(kernel::FLIP_HV),
    }
}

fn check_factor(name: &str, f: f32) -> XformResult<()> {
    if !f.is_finite() || f <= 0.0 {
        return Err(XformError::InvalidParameter(format!(
            "{name} must be finite and positive, got {f}"
        )));
    }
    Ok(())
}

// =============================================================================
// Affine
// =============================================================================

/// Inverse mapping from destination to source pixel coordinates.
///
/// A destination point `p` samples the source at
/// `q = matrix * (p - pivot_dst) + pivot_src`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub matrix: Mat2,
    pub pivot_src: Vec2,
    pub pivot_dst: Vec2,
    /// Destination size; the source size when `None`.
    pub output: Option<(u32, u32)>,
}

impl AffineTransform {
    /// Pure linear map about the origin.
    pub fn new(matrix: Mat2) -> Self {
        Self {
            matrix,
            pivot_src: Vec2::ZERO,
            pivot_dst: Vec2::ZERO,
            output: None,
        }
    }

    pub fn with_pivots(mut self, pivot_src: Vec2, pivot_dst: Vec2) -> Self {
        self.pivot_src = pivot_src;
        self.pivot_dst = pivot_dst;
        self
    }

    /// Map about the centre of a `width` x `height` image, for both sides.
    pub fn about_center(matrix: Mat2, width: u32, height: u32) -> Self {
        let center = Vec2::new(width as f32, height as f32) * 0.5;
        Self::new(matrix).with_pivots(center, center)
    }

    pub fn with_output(mut self, width: u32, height: u32) -> Self {
        self.output = Some((width, height));
        self
    }

    /// Whether the pivot-free kernel applies.
    pub fn is_linear(&self) -> bool {
        self.pivot_src == Vec2::ZERO && self.pivot_dst == Vec2::ZERO
    }

    /// Kernel name and packed arguments.
    ///
    /// The matrix goes in as its two rows.
    pub fn kernel_args(&self) -> XformResult<(&'static str, Vec<KernelArg>)> {
        let finite =
            self.matrix.is_finite() && self.pivot_src.is_finite() && self.pivot_dst.is_finite();
        if !finite {
            return Err(XformError::InvalidParameter(format!(
                "affine transform must be finite: {self:?}"
            )));
        }

        let mut args = vec![
            KernelArg::Float2(self.matrix.row(0).to_array()),
            KernelArg::Float2(self.matrix.row(1).to_array()),
        ];
        if self.is_linear() {
            return Ok((kernel::AFFINE, args));
        }
        args.push(KernelArg::Float2(self.pivot_src.to_array()));
        args.push(KernelArg::Float2(self.pivot_dst.to_array()));
        Ok((kernel::AFFINE2, args))
    }
}

/// Result of [`Environment::flip`].
#[derive(Debug)]
pub enum Flipped {
    /// Neither axis flipped; the source is the result and nothing ran.
    Unchanged,
    Image(DestinationImage),
}

impl Flipped {
    pub fn into_image(self) -> Option<DestinationImage> {
        match self {
            Self::Unchanged => None,
            Self::Image(img) => Some(img),
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

impl Environment {
    /// Bilinear resize by independent factors per axis.
    pub fn scale(&self, src: &SourceImage, fx: f32, fy: f32) -> XformResult<DestinationImage> {
        let (w, h) = scaled_size(src.width(), src.height(), fx, fy)?;
        let args = reciprocal_factors(fx, fy)?;
        self.run(kernel::RECSCALE, src, w, h, &args)
    }

    /// Rotate by `angle` radians about the image centre, keeping the canvas size.
    ///
    /// Positive angles turn the content clockwise on screen, since image
    /// y points down. Areas uncovered by the rotated source repeat its
    /// edge pixels.
    pub fn rotate(&self, src: &SourceImage, angle: f32) -> XformResult<DestinationImage> {
        let args = rotation_params(angle)?;
        self.run(kernel::ROTATE, src, src.width(), src.height(), &args)
    }

    /// Mirror horizontally, vertically or both.
    pub fn flip(
        &self,
        src: &SourceImage,
        horizontal: bool,
        vertical: bool,
    ) -> XformResult<Flipped> {
        let Some(name) = flip_kernel(horizontal, vertical) else {
            return Ok(Flipped::Unchanged);
        };
        self.run(name, src, src.width(), src.height(), &[])
            .map(Flipped::Image)
    }

    /// General affine warp, see [`AffineTransform`].
    pub fn affine(
        &self,
        src: &SourceImage,
        transform: &AffineTransform,
    ) -> XformResult<DestinationImage> {
        let (w, h) = transform.output.unwrap_or(src.dimensions());
        let (name, args) = transform.kernel_args()?;
        self.run(name, src, w, h, &args)
    }

    fn run(
        &self,
        kernel: &str,
        src: &SourceImage,
        width: u32,
        height: u32,
        args: &[KernelArg],
    ) -> XformResult<DestinationImage> {
        let mut dst = self.create_destination_image(width, height)?;
        self.invoke(kernel, src, &mut dst, args)?;
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn floats(args: &[KernelArg]) -> Vec<f32> {
        args.iter()
            .flat_map(|a| match *a {
                KernelArg::Float(v) => vec![v],
                KernelArg::Float2([x, y]) => vec![x, y],
            })
            .collect()
    }

    #[test]
    fn test_scaled_size_rounds() {
        assert_eq!(scaled_size(4, 4, 2.0, 2.0).unwrap(), (8, 8));
        assert_eq!(scaled_size(640, 480, 0.5, 0.25).unwrap(), (320, 120));
        assert_eq!(scaled_size(3, 5, 0.5, 0.5).unwrap(), (2, 3));
        assert_eq!(scaled_size(10, 10, 1.04, 0.96).unwrap(), (10, 10));
    }

    #[test]
    fn test_scaled_size_rejects_zero_result() {
        assert!(matches!(
            scaled_size(4, 4, 0.1, 1.0),
            Err(XformError::InvalidDimensions(0, 4))
        ));
    }

    #[test]
    fn test_bad_factors() {
        for f in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(scaled_size(4, 4, f, 1.0), Err(XformError::InvalidParameter(_))));
            assert!(matches!(reciprocal_factors(1.0, f), Err(XformError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_reciprocal_factors() {
        let args = reciprocal_factors(2.0, 0.5).unwrap();
        assert_eq!(floats(&args), vec![0.5, 2.0]);
    }

    #[test]
    fn test_rotation_params() {
        let args = floats(&rotation_params(0.0).unwrap());
        assert_eq!(args, vec![0.0, 1.0]);

        let args = floats(&rotation_params(FRAC_PI_2).unwrap());
        assert_relative_eq!(args[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(args[1], 0.0, epsilon = 1e-6);

        assert!(rotation_params(f32::NAN).is_err());
    }

    #[test]
    fn test_flip_kernel_cases() {
        assert_eq!(flip_kernel(false, false), None);
        assert_eq!(flip_kernel(true, false), Some("image_flip_h"));
        assert_eq!(flip_kernel(false, true), Some("image_flip_v"));
        assert_eq!(flip_kernel(true, true), Some("image_flip_hv"));
    }

    #[test]
    fn test_affine_selects_kernel_by_pivot() {
        let m = Mat2::from_cols_array(&[1.0, 2.0, 3.0, 4.0]);
        let (name, args) = AffineTransform::new(m).kernel_args().unwrap();
        assert_eq!(name, "image_affine");
        // columns (1,2) and (3,4) -> rows (1,3) and (2,4)
        assert_eq!(floats(&args), vec![1.0, 3.0, 2.0, 4.0]);

        let t = AffineTransform::new(m).with_pivots(Vec2::new(5.0, 6.0), Vec2::new(7.0, 8.0));
        let (name, args) = t.kernel_args().unwrap();
        assert_eq!(name, "image_affine2");
        assert_eq!(floats(&args), vec![1.0, 3.0, 2.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_affine_args_bind() {
        let t = AffineTransform::about_center(Mat2::from_angle(PI / 6.0), 64, 32);
        let (name, args) = t.kernel_args().unwrap();
        let sig = kernel::signature(name).unwrap();
        assert!(sig.bind(&args).is_ok());
        assert_eq!(t.pivot_src, Vec2::new(32.0, 16.0));
    }

    #[test]
    fn test_affine_rejects_nan() {
        let t = AffineTransform::new(Mat2::from_diagonal(Vec2::new(f32::NAN, 1.0)));
        assert!(matches!(t.kernel_args(), Err(XformError::InvalidParameter(_))));
    }

    #[test]
    fn test_affine_output_override() {
        let t = AffineTransform::new(Mat2::IDENTITY).with_output(10, 20);
        assert_eq!(t.output, Some((10, 20)));
        assert!(t.is_linear());
    }
}
