//! Extract every conversation slot from a `CNV.ARK` archive: a binary
//! blob, a metadata report, and reassemblable assembly text per slot.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use itertools::Itertools as _;
use uwdev::conv::disasm::disassemble_slot;
use uwdev::conv::{Conversation, ConvArchive, ImportType};

#[derive(Parser)]
#[command(name = "uw-cnv-extractor", about = "Extract conversations from CNV.ARK")]
struct Args {
    /// The conversation archive.
    input: PathBuf,
    /// Output directory.
    #[arg(short, long, default_value = "conversations")]
    output_dir: PathBuf,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn metadata_report(slot: u16, conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Conversation Slot: {slot:04X}");
    let _ = writeln!(out, "String Block: {}", conversation.string_block);
    let _ = writeln!(out, "Memory Slots: {}", conversation.memory_slots);

    let _ = writeln!(out, "\nImported Functions/Variables:");
    for (index, import) in conversation.imports.iter().enumerate() {
        match import.import_type {
            ImportType::Function => {
                let _ = writeln!(
                    out,
                    "  [{index}] {} - Function, ID: {}, Returns: {}",
                    import.name,
                    import.id_or_addr,
                    import.return_type.name()
                );
            }
            ImportType::Variable => {
                let _ = writeln!(
                    out,
                    "  [{index}] {} - Variable, Addr: 0x{:04X}",
                    import.name, import.id_or_addr
                );
            }
        }
    }

    let _ = writeln!(out, "\nCode Section: {} words", conversation.code.len());
    let _ = writeln!(out, "\nCode Hexdump:");
    for (row_index, row) in conversation.code.chunks(8).enumerate() {
        let words = row.iter().map(|word| format!("{word:04X}")).join(" ");
        let _ = writeln!(out, "{:04X}: {words}", row_index * 8);
    }
    out
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let archive = ConvArchive::load_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if archive.was_compressed() {
        println!("Archive is compressed (UW2 format); decompressed for extraction");
    }
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let mut extracted = 0usize;
    for slot in 0..archive.num_slots()? {
        let Some(conversation) = archive.slot(slot)? else {
            log::debug!("slot {slot:04X} is empty");
            continue;
        };

        let base = args.output_dir.join(format!("conversation_{slot:04X}"));
        std::fs::write(base.with_extension("bin"), conversation.to_bytes())?;
        std::fs::write(
            base.with_extension("txt"),
            metadata_report(slot, &conversation),
        )?;
        std::fs::write(
            base.with_extension("asm"),
            disassemble_slot(slot, &conversation)?,
        )?;
        extracted += 1;
    }

    println!(
        "Extracted {extracted} conversations to {}",
        args.output_dir.display()
    );
    Ok(())
}
