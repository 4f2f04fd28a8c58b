/*!
 * Edits the metadata of an MP4 file and saves it, either in place or to a new file.
 */

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use mp4_rewrite::{file::SaveOutcome, Mp4File};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the input mp4
    input_mp4: PathBuf,

    /// Path to the output mp4 (must not exist); the input is patched in place when omitted
    output_mp4: Option<PathBuf>,

    /// New iTunes title
    #[arg(short, long)]
    title: Option<String>,

    /// Rebrand an `isom`/512 header as `M4V `
    #[arg(long)]
    m4v: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut file = Mp4File::open(&args.input_mp4)
        .with_context(|| format!("Failed to parse {}", args.input_mp4.display()))?;

    if let Some(title) = args.title {
        file.set_title(title).context("Failed to set title")?;
    }
    if args.m4v && !file.rebrand_isom_as_m4v()? {
        eprintln!("ftyp is not an isom/512 header, leaving it as is");
    }

    match file
        .save(args.output_mp4.as_deref())
        .context("Failed to save")?
    {
        SaveOutcome::Written(size) => {
            eprintln!("Wrote {} ({size} bytes)", file.path().display())
        }
        SaveOutcome::InPlace(report) => eprintln!(
            "Patched {} ({}): moov {} bytes at 0x{:x}",
            file.path().display(),
            report.scenario,
            report.moov_size,
            report.moov_offset
        ),
    }

    Ok(())
}
