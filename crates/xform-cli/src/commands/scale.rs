//! Scale command - bilinear resize by factor

use anyhow::{Result, bail};
use tracing::info;

use super::{GlobalOpts, load_source, save_result};
use crate::ScaleArgs;

pub fn run(args: ScaleArgs, opts: &GlobalOpts) -> Result<()> {
    let (fx, fy) = factors(&args)?;
    let env = opts.environment()?;
    let (_, src) = load_source(&env, &args.input)?;

    info!("Scale: {} x {}", fx, fy);
    let result = env.scale(&src, fx, fy)?;
    info!("New size: {}x{}", result.width(), result.height());

    save_result(&args.out, &result)
}

/// `--factor` for both axes, otherwise `--fx`/`--fy` with 1.0 for a missing axis.
fn factors(args: &ScaleArgs) -> Result<(f32, f32)> {
    match (args.factor, args.fx, args.fy) {
        (Some(f), _, _) => Ok((f, f)),
        (None, None, None) => bail!("Specify --factor or --fx/--fy"),
        (None, fx, fy) => Ok((fx.unwrap_or(1.0), fy.unwrap_or(1.0))),
    }
}
