//! Affine command - 2x2 matrix warp with pivots

use anyhow::Result;
use glam::{Mat2, Vec2};
use tracing::info;
use xform_compute::AffineTransform;

use super::{GlobalOpts, load_source, parse_floats, parse_size, save_result};
use crate::AffineArgs;

pub fn run(args: AffineArgs, opts: &GlobalOpts) -> Result<()> {
    let env = opts.environment()?;
    let (image, src) = load_source(&env, &args.input)?;

    let transform = build_transform(&args, image.width, image.height)?;
    info!("Affine: {:?}", transform);
    let result = env.affine(&src, &transform)?;

    save_result(&args.out, &result)
}

fn build_transform(args: &AffineArgs, width: u32, height: u32) -> Result<AffineTransform> {
    let [a, b, c, d] = parse_floats::<4>(&args.matrix, "matrix")?;
    let matrix = Mat2::from_cols_array(&[a, c, b, d]);

    let mut transform = if args.center {
        AffineTransform::about_center(matrix, width, height)
    } else {
        let pivot = |s: &Option<String>, what| -> Result<Vec2> {
            match s {
                Some(s) => Ok(Vec2::from_array(parse_floats::<2>(s, what)?)),
                None => Ok(Vec2::ZERO),
            }
        };
        let pivot_src = pivot(&args.pivot_src, "source pivot")?;
        let pivot_dst = pivot(&args.pivot_dst, "destination pivot")?;
        AffineTransform::new(matrix).with_pivots(pivot_src, pivot_dst)
    };

    if let Some(size) = &args.size {
        let (w, h) = parse_size(size)?;
        transform = transform.with_output(w, h);
    }
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutputArgs;
    use std::path::PathBuf;

    fn args(matrix: &str) -> AffineArgs {
        AffineArgs {
            input: PathBuf::from("in.png"),
            out: OutputArgs {
                output: PathBuf::from("out.png"),
                compression: 6,
            },
            matrix: matrix.into(),
            pivot_src: None,
            pivot_dst: None,
            center: false,
            size: None,
        }
    }

    #[test]
    fn test_matrix_is_row_major() {
        let t = build_transform(&args("1,2,3,4"), 8, 8).unwrap();
        assert_eq!(t.matrix.row(0), Vec2::new(1.0, 2.0));
        assert_eq!(t.matrix.row(1), Vec2::new(3.0, 4.0));
        assert!(t.is_linear());
    }

    #[test]
    fn test_center_and_size() {
        let mut a = args("1,0,0,1");
        a.center = true;
        a.size = Some("20x10".into());
        let t = build_transform(&a, 8, 6).unwrap();
        assert_eq!(t.pivot_src, Vec2::new(4.0, 3.0));
        assert_eq!(t.output, Some((20, 10)));
    }

    #[test]
    fn test_explicit_pivots() {
        let mut a = args("1,0,0,1");
        a.pivot_dst = Some("2,-3".into());
        let t = build_transform(&a, 8, 8).unwrap();
        assert_eq!(t.pivot_src, Vec2::ZERO);
        assert_eq!(t.pivot_dst, Vec2::new(2.0, -3.0));
    }
}
