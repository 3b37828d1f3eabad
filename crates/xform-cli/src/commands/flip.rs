//! Flip command - horizontal / vertical mirror

use anyhow::Result;
use tracing::info;
use xform_compute::Flipped;

use super::{GlobalOpts, load_source, save_result, save_surface};
use crate::FlipArgs;

pub fn run(args: FlipArgs, opts: &GlobalOpts) -> Result<()> {
    let env = opts.environment()?;
    let (image, src) = load_source(&env, &args.input)?;

    match env.flip(&src, args.horizontal, args.vertical)? {
        Flipped::Image(result) => save_result(&args.out, &result),
        Flipped::Unchanged => {
            info!("No axis selected, writing input unchanged");
            save_surface(&args.out, &image.as_host())
        }
    }
}
