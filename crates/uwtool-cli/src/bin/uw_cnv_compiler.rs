//! Compile slot assembly back to a conversation blob, optionally
//! installing it into a `CNV.ARK` archive in place.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use uwdev::conv::compile::parse_slot_asm;
use uwdev::conv::ConvArchive;

#[derive(Parser)]
#[command(name = "uw-cnv-compiler", about = "Compile conversation assembly")]
struct Args {
    /// Slot assembly (from uw-cnv-extractor or uwscript-compiler).
    asm_file: PathBuf,
    /// Output binary (default: input with .bin extension).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Install the compiled slot into this archive (previous file is
    /// kept as .bak).
    #[arg(short = 'u', long = "update")]
    update: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let source = std::fs::read_to_string(&args.asm_file)
        .with_context(|| format!("reading {}", args.asm_file.display()))?;
    let slot_asm = parse_slot_asm(&source)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.asm_file.with_extension("bin"));
    let bytes = slot_asm.conversation.to_bytes();
    std::fs::write(&output, &bytes)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Compiled {} code words ({} bytes) to {}",
        slot_asm.conversation.code.len(),
        bytes.len(),
        output.display()
    );

    if let Some(archive_path) = &args.update {
        let slot = slot_asm
            .slot
            .ok_or_else(|| anyhow::anyhow!("the assembly names no slot (missing '; Slot:')"))?;
        let mut archive = ConvArchive::load_file(archive_path)
            .with_context(|| format!("reading {}", archive_path.display()))?;
        archive.update_slot(slot, &slot_asm.conversation)?;
        archive.save_to(archive_path)?;
        println!(
            "Installed slot {slot:04X} into {} (backup kept as .bak)",
            archive_path.display()
        );
    }
    Ok(())
}
