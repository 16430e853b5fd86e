//! Run a conversation program interactively on the standard imports:
//! NPC lines go to stdout, menus and asks prompt on stdin.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use uwdev::conv::compile::parse_slot_asm;
use uwdev::strings::text as strings_text;
use uwdev::vm::imports::PendingInput;
use uwdev::vm::{StandardImports, Vm, VmState};

#[derive(Parser)]
#[command(name = "uw-runner", about = "Run a compiled conversation")]
struct Args {
    /// Assembly to run (uwscript-compiler or uw-cnv-extractor output).
    program: PathBuf,
    /// Strings file for SAY output and substitutions.
    #[arg(long)]
    strings: Option<PathBuf>,
    /// Overall instruction budget.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u32,
    /// Enable debug logging (VM trace).
    #[arg(long)]
    debug: bool,
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn drain_transcript(vm: &mut Vm) {
    for line in vm.take_transcript() {
        println!("NPC: \"{line}\"");
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    uwtool_cli::init_logging(args.debug);

    let source = std::fs::read_to_string(&args.program)
        .with_context(|| format!("reading {}", args.program.display()))?;
    let slot_asm = parse_slot_asm(&source)?;

    let mut vm = Vm::for_game();
    vm.set_string_block(slot_asm.conversation.string_block);
    if let Some(path) = &args.strings {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        vm.set_strings(strings_text::parse(&text)?);
    }
    vm.load_code(slot_asm.conversation.code);

    let mut imports = StandardImports::new();
    let mut steps_left = args.max_steps;
    loop {
        while vm.state() == VmState::Running {
            if steps_left == 0 {
                anyhow::bail!("step budget of {} exhausted", args.max_steps);
            }
            vm.step(&mut imports)?;
            steps_left -= 1;
        }
        drain_transcript(&mut vm);

        match vm.state() {
            VmState::Finished => {
                println!("\nConversation finished");
                return Ok(());
            }
            VmState::Running => unreachable!("the inner loop runs to a stop state"),
            VmState::WaitingResponse => match imports.take_pending_input() {
                Some(PendingInput::Menu { options }) => {
                    println!("\nChoose an option:");
                    for option in &options {
                        println!("{}. {}", option.number, option.text);
                    }
                    let reply = loop {
                        let line = read_line("> ")?;
                        match line.parse::<u16>() {
                            Ok(number)
                                if options.iter().any(|o| o.number == number) =>
                            {
                                break number;
                            }
                            _ => println!("Enter one of the listed numbers."),
                        }
                    };
                    vm.resume(reply);
                }
                Some(PendingInput::Ask) | None => {
                    let text = read_line("\nEnter text:\n> ")?;
                    // Store the reply as a fresh string in the current
                    // block so the conversation can refer back to it.
                    let block = vm.string_block();
                    let index = vm
                        .strings()
                        .block(block)
                        .map_or(0, <[String]>::len) as u16;
                    vm.strings_mut().set(block, index, text);
                    vm.resume(index);
                }
            },
        }
    }
}
