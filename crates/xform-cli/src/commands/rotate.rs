//! Rotate command - rotation about the image centre

use anyhow::Result;
use tracing::info;

use super::{GlobalOpts, load_source, save_result};
use crate::RotateArgs;

pub fn run(args: RotateArgs, opts: &GlobalOpts) -> Result<()> {
    let radians = if args.radians { args.angle } else { args.angle.to_radians() };
    let env = opts.environment()?;
    let (_, src) = load_source(&env, &args.input)?;

    info!("Rotation: {} rad", radians);
    let result = env.rotate(&src, radians)?;

    save_result(&args.out, &result)
}
