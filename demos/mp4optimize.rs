/*!
 * Rewrites an MP4 file into fast-start order: `ftyp`, `moov`, padding, then a single `mdat`.
 */

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use mp4_rewrite::{Mp4File, OptimizeOptions, PaddingSize};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the input mp4
    input_mp4: PathBuf,

    /// Path to the output mp4 (must not exist); the input is replaced when omitted
    output_mp4: Option<PathBuf>,

    /// Bytes of padding after `moov`; sized automatically when omitted
    #[arg(short, long, conflicts_with = "no_padding")]
    padding: Option<u64>,

    /// Write no padding after `moov`
    #[arg(long)]
    no_padding: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let padding = match (args.no_padding, args.padding) {
        (true, _) => PaddingSize::Disabled,
        (false, Some(size)) => PaddingSize::Explicit(size),
        (false, None) => PaddingSize::Auto,
    };

    let mut file = Mp4File::open(&args.input_mp4)
        .with_context(|| format!("Failed to parse {}", args.input_mp4.display()))?;
    let report = file
        .optimize(
            args.output_mp4.as_deref(),
            OptimizeOptions::builder().padding(padding).build(),
        )
        .context("Failed to optimize")?;

    eprintln!(
        "Wrote {} ({} bytes): moov {} bytes, padding {} bytes, media data {} bytes at 0x{:x}",
        file.path().display(),
        report.total_size,
        report.moov_size,
        report.padding_size,
        report.media_data_size,
        report.media_data_offset,
    );

    Ok(())
}
