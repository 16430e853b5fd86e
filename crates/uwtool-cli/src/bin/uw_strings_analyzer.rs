//! Inspect a STRINGS archive: header layout, Huffman tree shape, block
//! directory, sample decodes, and an integrity check. Prints a console
//! report and writes a diagnostic JSON.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use itertools::Itertools as _;
use uwdev::strings::read_pak;

#[derive(Parser)]
#[command(name = "uw-strings-analyzer", about = "Analyze a STRINGS archive")]
struct Args {
    /// The archive to analyze.
    input: PathBuf,
    /// Dump a byte range: OFFSET LENGTH.
    #[arg(long, num_args = 2, value_names = ["OFF", "LEN"])]
    hexdump: Option<Vec<usize>>,
    /// Diagnostic JSON output.
    #[arg(short, long, default_value = "strings-analysis.json")]
    output: PathBuf,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let data = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    println!("=== STRINGS archive analysis: {} ===", args.input.display());
    println!("File size: {} bytes", data.len());

    let pak = read_pak(&data)?;

    let nodes = pak.tree.nodes();
    let codes = pak.tree.code_map();
    let leaf_count = nodes.iter().filter(|node| node.is_leaf()).count();
    let (min_code, max_code) = codes
        .values()
        .map(Vec::len)
        .minmax()
        .into_option()
        .unwrap_or((0, 0));
    println!("\nHuffman tree: {} nodes, {leaf_count} leaves", nodes.len());
    println!("Code lengths: {min_code}..{max_code} bits");

    println!("\nBlocks: {}", pak.block_infos.len());
    for info in &pak.block_infos {
        let count = pak
            .strings
            .block(info.block_id)
            .map_or(0, <[String]>::len);
        println!(
            "  block {:04x} at {:#08x}: {count} strings",
            info.block_id, info.offset
        );
    }

    println!("\nSample strings:");
    for (block_id, strings) in pak.strings.blocks().take(5) {
        if let Some(first) = strings.iter().find(|s| !s.is_empty()) {
            let preview: String = first.chars().take(60).collect();
            println!("  {block_id:04x}: {preview:?}");
        }
    }

    // Integrity: directory offsets must ascend and stay inside the file.
    let offsets_ascend = pak
        .block_infos
        .iter()
        .tuple_windows()
        .all(|(a, b)| a.offset < b.offset);
    let offsets_in_file = pak
        .block_infos
        .iter()
        .all(|info| (info.offset as usize) < data.len());
    println!(
        "\nIntegrity: offsets {}, {}",
        if offsets_ascend { "ascending" } else { "OUT OF ORDER" },
        if offsets_in_file {
            "all inside the file"
        } else {
            "SOME OUTSIDE THE FILE"
        }
    );

    if let Some(range) = &args.hexdump {
        let start = range[0].min(data.len());
        let end = start.saturating_add(range[1]).min(data.len());
        println!("\nHexdump at {start:#x}:");
        for (row_index, row) in data[start..end].chunks(16).enumerate() {
            let hex = row.iter().map(|b| format!("{b:02X}")).join(" ");
            let ascii: String = row
                .iter()
                .map(|&b| {
                    if (0x20..0x7F).contains(&b) {
                        char::from(b)
                    } else {
                        '.'
                    }
                })
                .collect();
            println!("{:08X}: {hex:<47} |{ascii}|", start + row_index * 16);
        }
    }

    let report = serde_json::json!({
        "file": args.input.display().to_string(),
        "file_size": data.len(),
        "node_count": nodes.len(),
        "leaf_count": leaf_count,
        "code_length_min": min_code,
        "code_length_max": max_code,
        "block_count": pak.block_infos.len(),
        "blocks": pak.block_infos.iter().map(|info| {
            serde_json::json!({
                "block_id": info.block_id,
                "offset": info.offset,
                "string_count": pak.strings.block(info.block_id).map_or(0, <[String]>::len),
            })
        }).collect::<Vec<_>>(),
        "offsets_ascending": offsets_ascend,
        "offsets_in_file": offsets_in_file,
    });
    std::fs::write(&args.output, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("\nReport written to {}", args.output.display());
    Ok(())
}
