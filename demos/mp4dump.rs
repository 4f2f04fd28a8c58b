/*!
 * Prints the atom tree of an MP4 file, followed by a summary of its tracks.
 */

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use mp4_rewrite::{
    atom::{AtomData, AtomId, AtomTree},
    Mp4File,
};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the input mp4
    input_mp4: String,

    /// Only print the top level atoms
    #[arg(short, long)]
    shallow: bool,
}

/// Format file size in human-readable format
fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn get_atom_summary(data: &AtomData) -> String {
    match data {
        AtomData::Container | AtomData::Opaque => String::new(),
        data => {
            let summary = format!("{data:?}");
            match summary.char_indices().nth(60) {
                Some((end, _)) => format!("{}…", &summary[..end]),
                None => summary,
            }
        }
    }
}

fn print_atom(tree: &AtomTree, id: AtomId, depth: usize, shallow: bool) {
    let node = &tree[id];
    let atom_display = format!("{:indent$}{}", "", node.atom_type(), indent = depth * 2);
    let offset_display = format!(
        "0x{:08x}..=0x{:08x}",
        node.offset(),
        node.end().saturating_sub(1)
    );
    println!(
        "{:<24} │ {:<23} │ {:<10} │ {:<14} │ {}",
        atom_display,
        offset_display,
        format_size(node.size()),
        node.kind().name(),
        get_atom_summary(node.data())
    );
    if shallow {
        return;
    }
    for child in tree.children(id) {
        print_atom(tree, *child, depth + 1, shallow);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let file = Mp4File::open(&args.input_mp4)
        .with_context(|| format!("Failed to parse {}", args.input_mp4))?;
    let tree = file.tree();

    println!(
        "{:<24} │ {:<23} │ {:<10} │ {:<14} │ Summary",
        "Atom Type", "Offset Range", "Size", "Kind"
    );
    for id in tree.roots() {
        print_atom(tree, *id, 0, args.shallow);
    }

    println!();
    for track in file.tracks() {
        println!(
            "track {}: {} {:?} language={} chunks={}{}",
            track
                .track_id
                .map_or_else(|| "?".to_string(), |id| id.to_string()),
            track
                .handler_type
                .map_or("unknown", |handler_type| handler_type.as_str()),
            track.duration.unwrap_or_default(),
            track
                .language
                .map_or_else(|| "?".to_string(), |language| language.to_string()),
            track.chunk_count,
            if track.large_offsets { " (co64)" } else { "" },
        );
    }
    if let Some(title) = file.title() {
        println!("title: {title}");
    }

    Ok(())
}
