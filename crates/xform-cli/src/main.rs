//! xform - GPU image transforms from the command line

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "xform")]
#[command(author, version, about = "Scale, rotate, flip and warp PNG images on the GPU")]
#[command(long_about = "
Runs image transforms as wgpu compute kernels.

Examples:
  xform devices                              # List adapters
  xform scale in.png -o out.png -f 2         # Double both axes
  xform scale in.png -o out.png -x 0.5 -y 1  # Halve the width
  xform rotate in.png -o out.png -a 30       # Rotate 30 degrees about the centre
  xform flip in.png -o out.png --horizontal
  xform affine in.png -o out.png -m 1,0.3,0,1 --center
  xform --adapter 1 -vv scale in.png -o out.png -f 1.5

Environment:
  XFORM_ADAPTER    adapter index (default 0)
  XFORM_PROFILING  time kernels on the GPU (default 1)
  WGPU_BACKEND     comma-separated backend list, e.g. vulkan,metal
  RUST_LOG         log filter, overrides -v
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Adapter index, see `xform devices`
    #[arg(long, global = true)]
    adapter: Option<usize>,

    /// Disable GPU kernel timing
    #[arg(long, global = true)]
    no_profiling: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List compute adapters
    Devices,

    /// Resize by per-axis factors (bilinear)
    #[command(visible_alias = "s")]
    Scale(ScaleArgs),

    /// Rotate about the image centre, canvas size unchanged
    #[command(visible_alias = "r")]
    Rotate(RotateArgs),

    /// Mirror horizontally and/or vertically
    Flip(FlipArgs),

    /// Apply a 2x2 matrix with optional pivots
    Affine(AffineArgs),
}

#[derive(Args)]
struct OutputArgs {
    /// Output PNG
    #[arg(short, long)]
    output: PathBuf,

    /// PNG compression level, 0 (none) to 9 (best)
    #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(0..=9))]
    compression: u8,
}

#[derive(Args)]
struct ScaleArgs {
    /// Input PNG
    input: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    /// Uniform factor for both axes
    #[arg(short, long, conflicts_with_all = ["fx", "fy"])]
    factor: Option<f32>,

    /// Horizontal factor
    #[arg(short = 'x', long)]
    fx: Option<f32>,

    /// Vertical factor
    #[arg(short = 'y', long)]
    fy: Option<f32>,
}

#[derive(Args)]
struct RotateArgs {
    /// Input PNG
    input: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    /// Angle in degrees, positive turns clockwise on screen
    #[arg(short, long, allow_hyphen_values = true)]
    angle: f32,

    /// Interpret the angle as radians
    #[arg(long)]
    radians: bool,
}

#[derive(Args)]
struct FlipArgs {
    /// Input PNG
    input: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    /// Mirror left-right
    #[arg(long)]
    horizontal: bool,

    /// Mirror top-bottom
    #[arg(long)]
    vertical: bool,
}

#[derive(Args)]
struct AffineArgs {
    /// Input PNG
    input: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    /// Destination-to-source matrix, row-major: a,b,c,d
    #[arg(short, long, allow_hyphen_values = true)]
    matrix: String,

    /// Source pivot x,y
    #[arg(long, allow_hyphen_values = true, conflicts_with = "center")]
    pivot_src: Option<String>,

    /// Destination pivot x,y
    #[arg(long, allow_hyphen_values = true, conflicts_with = "center")]
    pivot_dst: Option<String>,

    /// Pivot about the image centre
    #[arg(long)]
    center: bool,

    /// Output size WxH (default: input size)
    #[arg(long)]
    size: Option<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let opts = commands::GlobalOpts {
        adapter: cli.adapter,
        profiling: !cli.no_profiling,
    };

    match cli.command {
        Commands::Devices => commands::devices::run(&opts),
        Commands::Scale(args) => commands::scale::run(args, &opts),
        Commands::Rotate(args) => commands::rotate::run(args, &opts),
        Commands::Flip(args) => commands::flip::run(args, &opts),
        Commands::Affine(args) => commands::affine::run(args, &opts),
    }
}
