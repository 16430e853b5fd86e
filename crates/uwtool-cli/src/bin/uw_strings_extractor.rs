//! Extract a STRINGS archive to editable text plus a metadata sidecar
//! (Huffman tree and block directory) for re-packing.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use uwdev::strings::meta::PakMetadata;
use uwdev::strings::{read_pak, text};

#[derive(Parser)]
#[command(name = "uw-strings-extractor", about = "Decode a STRINGS archive to text")]
struct Args {
    /// The archive to extract (e.g. STRINGS.PAK).
    input: PathBuf,
    /// Output text file.
    #[arg(short, long, default_value = "uw-strings.txt")]
    output: PathBuf,
    /// Output metadata file.
    #[arg(short, long, default_value = "uw-strings-metadata.json")]
    metadata: PathBuf,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let data = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let pak = read_pak(&data)?;

    std::fs::write(&args.output, text::format(&pak.strings))
        .with_context(|| format!("writing {}", args.output.display()))?;

    let metadata = PakMetadata::new(&pak.tree, pak.block_infos);
    std::fs::write(&args.metadata, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing {}", args.metadata.display()))?;

    println!(
        "Extracted {} blocks ({} huffman nodes) to {}",
        pak.strings.block_count(),
        metadata.huffman_nodes.len(),
        args.output.display()
    );
    Ok(())
}
