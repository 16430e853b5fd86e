//! Re-pack extracted strings text into a STRINGS archive, reusing the
//! original Huffman tree from the metadata sidecar.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use uwdev::strings::meta::PakMetadata;
use uwdev::strings::{pak_to_bytes, read_pak, text};

#[derive(Parser)]
#[command(name = "uw-strings-packer", about = "Encode strings text into an archive")]
struct Args {
    /// Extracted strings text.
    #[arg(short = 't', long, default_value = "uw-strings.txt")]
    text: PathBuf,
    /// Metadata produced by the extractor.
    #[arg(short, long, default_value = "uw-strings-metadata.json")]
    metadata: PathBuf,
    /// Output archive.
    #[arg(short, long, default_value = "strings.pak")]
    output: PathBuf,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let metadata: PakMetadata = serde_json::from_str(
        &std::fs::read_to_string(&args.metadata)
            .with_context(|| format!("reading {}", args.metadata.display()))?,
    )?;
    let tree = metadata.tree()?;

    let strings = text::parse(
        &std::fs::read_to_string(&args.text)
            .with_context(|| format!("reading {}", args.text.display()))?,
    )?;

    let bytes = pak_to_bytes(&tree, &strings)?;

    // The layout is only correct if it decodes back to the same data.
    let verification = read_pak(&bytes).context("verifying the packed archive")?;
    anyhow::ensure!(
        verification.strings == strings,
        "packed archive does not decode back to its input"
    );

    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "Packed {} blocks into {} ({} bytes)",
        strings.block_count(),
        args.output.display(),
        bytes.len()
    );
    Ok(())
}
