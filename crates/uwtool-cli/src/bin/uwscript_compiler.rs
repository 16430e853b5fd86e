//! Compile UWScript source to conversation assembly and a companion
//! strings file.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

#[derive(Parser)]
#[command(name = "uwscript-compiler", about = "Compile UWScript to UW assembly")]
struct Args {
    /// Input UWScript file.
    input: PathBuf,
    /// Output assembly file (stdout when omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output strings file (default: <input>_strings.txt).
    #[arg(short, long)]
    strings: Option<PathBuf>,
    /// String block id for the emitted literals.
    #[arg(short, long, default_value_t = 1)]
    block: u16,
    /// Report output locations.
    #[arg(short, long)]
    verbose: bool,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let compiled = uwdev::uwscript::compile(&source, args.block)?;

    for warning in &compiled.warnings {
        log::warn!("{warning}");
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, &compiled.assembly)
                .with_context(|| format!("writing {}", path.display()))?;
            if args.verbose {
                eprintln!("Assembly written to {}", path.display());
            }
        }
        None => print!("{}", compiled.assembly),
    }

    let strings_path = args.strings.clone().unwrap_or_else(|| {
        let mut stem = args.input.file_stem().unwrap_or_default().to_owned();
        stem.push("_strings.txt");
        args.input.with_file_name(stem)
    });
    std::fs::write(&strings_path, &compiled.strings_text)
        .with_context(|| format!("writing {}", strings_path.display()))?;
    if args.verbose {
        eprintln!("Strings written to {}", strings_path.display());
    }
    Ok(())
}
