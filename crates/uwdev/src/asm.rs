//! Text assembler and disassembler for the conversation VM.
//!
//! The assembler is a two-pass processor: pass one records `name:`
//! label definitions at their word offsets, pass two encodes the
//! instructions. Branch operands (`BEQ`/`BNE`/`BRA`) written as labels
//! resolve to `target - (current + 2)`, signed; `JMP`/`CALL` labels
//! resolve to the absolute word offset. The disassembler inverts this,
//! synthesizing a label at every jump, branch, and call target.

pub mod opcode;

use std::collections::BTreeMap;
use std::fmt::Write as _;

pub use opcode::{Opcode, OperandKind};

#[derive(Debug, thiserror::Error)]
pub enum AsmError {
    #[error("line {line}: unknown opcode '{mnemonic}'")]
    UnknownOpcode { line: usize, mnemonic: String },
    #[error("line {line}: '{mnemonic}' does not take an operand")]
    UnexpectedOperand { line: usize, mnemonic: String },
    #[error("line {line}: '{mnemonic}' requires an operand")]
    MissingOperand { line: usize, mnemonic: String },
    #[error("line {line}: unknown label or malformed operand '{operand}'")]
    BadOperand { line: usize, operand: String },
    #[error("code ends in the middle of an instruction at word {offset}")]
    TruncatedCode { offset: usize },
    #[error("word {offset} holds {word:#06x}, which is not an opcode")]
    BadOpcodeWord { offset: usize, word: u16 },
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub code: Vec<u16>,
    pub labels: BTreeMap<String, u16>,
}

/// Strip an inline `;` comment and surrounding whitespace.
fn significant(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with(';') {
        return "";
    }
    match line.find(';') {
        Some(at) => line[..at].trim(),
        None => line,
    }
}

fn is_label_def(line: &str) -> Option<&str> {
    line.split_once(':').map(|(name, _)| name.trim())
}

fn parse_number(text: &str) -> Option<i32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i32::from_str_radix(hex, 16).ok();
    }
    text.parse::<i32>().ok()
}

pub fn assemble(source: &str) -> Result<Assembly, AsmError> {
    // Pass 1: label word offsets.
    let mut labels = BTreeMap::new();
    let mut position: u16 = 0;
    for raw in source.lines() {
        let line = significant(raw);
        if line.is_empty() {
            continue;
        }
        if let Some(name) = is_label_def(line) {
            labels.insert(name.to_string(), position);
            continue;
        }
        position += if line.contains(' ') { 2 } else { 1 };
    }

    // Pass 2: encode.
    let mut code = Vec::with_capacity(usize::from(position));
    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = significant(raw);
        if line.is_empty() || is_label_def(line).is_some() {
            continue;
        }

        let (mnemonic, operand_text) = match line.split_once(' ') {
            Some((mnemonic, rest)) => (mnemonic.trim(), Some(rest.trim())),
            None => (line, None),
        };
        let opcode =
            Opcode::from_mnemonic(&mnemonic.to_ascii_uppercase()).ok_or_else(|| {
                AsmError::UnknownOpcode {
                    line: line_no,
                    mnemonic: mnemonic.to_string(),
                }
            })?;

        match (opcode.has_operand(), operand_text) {
            (false, None) => code.push(u16::from(opcode)),
            (false, Some(_)) => {
                return Err(AsmError::UnexpectedOperand {
                    line: line_no,
                    mnemonic: mnemonic.to_string(),
                });
            }
            (true, None) => {
                return Err(AsmError::MissingOperand {
                    line: line_no,
                    mnemonic: mnemonic.to_string(),
                });
            }
            (true, Some(operand)) => {
                let current = code.len() as u16;
                let value = resolve_operand(opcode, operand, current, &labels).ok_or_else(
                    || AsmError::BadOperand {
                        line: line_no,
                        operand: operand.to_string(),
                    },
                )?;
                code.push(u16::from(opcode));
                code.push(value);
            }
        }
    }

    Ok(Assembly { code, labels })
}

fn resolve_operand(
    opcode: Opcode,
    operand: &str,
    current: u16,
    labels: &BTreeMap<String, u16>,
) -> Option<u16> {
    if let Some(&target) = labels.get(operand) {
        return Some(match opcode.operand_kind() {
            OperandKind::Relative => target.wrapping_sub(current.wrapping_add(2)),
            _ => target,
        });
    }
    parse_number(operand).map(|value| value as u16)
}

/// Render code back to assembly text. Immediate operands print as
/// decimal (`PUSHI_EFF` signed, so negative frame offsets survive a
/// round trip); branch and jump targets print as synthesized labels.
pub fn disassemble(code: &[u16]) -> Result<String, AsmError> {
    // Pass 1: collect branch/jump/call targets in scan order.
    let mut targets: BTreeMap<u16, String> = BTreeMap::new();
    let mut counter = 0usize;
    let mut position = 0usize;
    while position < code.len() {
        let opcode = Opcode::try_from(code[position]).map_err(|_| AsmError::BadOpcodeWord {
            offset: position,
            word: code[position],
        })?;
        if opcode.has_operand() {
            if position + 1 >= code.len() {
                return Err(AsmError::TruncatedCode { offset: position });
            }
            let operand = code[position + 1];
            let target = match opcode.operand_kind() {
                OperandKind::Absolute => Some(operand),
                OperandKind::Relative => {
                    Some((position as u16).wrapping_add(2).wrapping_add(operand))
                }
                _ => None,
            };
            if let Some(target) = target {
                targets.entry(target).or_insert_with(|| {
                    let name = format!("label_{counter}");
                    counter += 1;
                    name
                });
            }
        }
        position += usize::from(opcode.width());
    }

    // Pass 2: emit.
    let mut out = String::new();
    let mut position = 0usize;
    while position < code.len() {
        if let Some(name) = targets.get(&(position as u16)) {
            let _ = writeln!(out, "{name}:");
        }
        let opcode = Opcode::try_from(code[position]).expect("validated in pass 1");
        match opcode.operand_kind() {
            OperandKind::None => {
                let _ = writeln!(out, "{}", opcode.mnemonic());
            }
            OperandKind::Immediate => {
                let operand = code[position + 1];
                if opcode == Opcode::PushIEff {
                    let _ = writeln!(out, "{} {}", opcode.mnemonic(), operand as i16);
                } else {
                    let _ = writeln!(out, "{} {}", opcode.mnemonic(), operand);
                }
            }
            OperandKind::Absolute => {
                let target = code[position + 1];
                let _ = writeln!(out, "{} {}", opcode.mnemonic(), targets[&target]);
            }
            OperandKind::Relative => {
                let operand = code[position + 1];
                let target = (position as u16).wrapping_add(2).wrapping_add(operand);
                let _ = writeln!(out, "{} {}", opcode.mnemonic(), targets[&target]);
            }
        }
        position += usize::from(opcode.width());
    }
    // A branch can legitimately target the first word past the end.
    if let Some(name) = targets.get(&(code.len() as u16)) {
        let _ = writeln!(out, "{name}:");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_loop_with_labels() {
        let source = "\
; count down from 3
START
PUSHI 3
loop:
PUSHI 1
OPSUB
SWAP ; keep the counter on top after the next dup trick
BNE loop
EXIT_OP
";
        let assembly = assemble(source).unwrap();
        assert_eq!(assembly.labels["loop"], 3);
        // BNE at word 7, operand resolves to 3 - (7 + 2) = -6.
        assert_eq!(assembly.code[7], u16::from(Opcode::Bne));
        assert_eq!(assembly.code[8] as i16, -6);
    }

    #[test]
    fn jmp_and_call_use_absolute_offsets() {
        let source = "\
JMP main
helper:
RET
main:
CALL helper
EXIT_OP
";
        let assembly = assemble(source).unwrap();
        assert_eq!(assembly.labels["helper"], 2);
        assert_eq!(assembly.labels["main"], 3);
        assert_eq!(&assembly.code[..2], &[u16::from(Opcode::Jmp), 3]);
        assert_eq!(&assembly.code[3..5], &[u16::from(Opcode::Call), 2]);
    }

    #[test]
    fn forward_branch_resolves_positive() {
        let source = "\
PUSHI 0
BEQ end
NOP
end:
EXIT_OP
";
        let assembly = assemble(source).unwrap();
        // BEQ at word 2, target 5: offset 5 - 4 = 1.
        assert_eq!(assembly.code[3], 1);
        assert_eq!(assembly.labels["end"], 5);
    }

    #[test]
    fn hex_decimal_and_negative_operands() {
        let assembly = assemble("PUSHI 0x10\nPUSHI_EFF -2\nCALLI 0\n").unwrap();
        assert_eq!(assembly.code[1], 0x10);
        assert_eq!(assembly.code[3] as i16, -2);
        assert_eq!(assembly.code[5], 0);
    }

    #[test]
    fn unknown_mnemonic_and_label_are_errors() {
        assert!(matches!(
            assemble("FROB 1\n"),
            Err(AsmError::UnknownOpcode { line: 1, .. })
        ));
        assert!(matches!(
            assemble("JMP nowhere\n"),
            Err(AsmError::BadOperand { line: 1, .. })
        ));
        assert!(matches!(
            assemble("PUSHI\n"),
            Err(AsmError::MissingOperand { line: 1, .. })
        ));
        assert!(matches!(
            assemble("RET 3\n"),
            Err(AsmError::UnexpectedOperand { line: 1, .. })
        ));
    }

    #[test]
    fn disassembly_reassembles_to_identical_code() {
        let source = "\
START
PUSHI 0
BEQ skip
PUSHI_EFF -3
FETCHM
SAY_OP
skip:
CALL fn
EXIT_OP
fn:
PUSHI 0
SAVE_REG
RET
";
        let assembly = assemble(source).unwrap();
        let text = disassemble(&assembly.code).unwrap();
        let again = assemble(&text).unwrap();
        assert_eq!(again.code, assembly.code);
    }

    #[test]
    fn branch_to_end_of_code_survives() {
        let source = "PUSHI 1\nBNE end\nNOP\nend:\n";
        let assembly = assemble(source).unwrap();
        let text = disassemble(&assembly.code).unwrap();
        assert!(text.trim_end().ends_with(':'));
        assert_eq!(assemble(&text).unwrap().code, assembly.code);
    }

    #[test]
    fn truncated_operand_is_an_error() {
        let err = disassemble(&[u16::from(Opcode::PushI)]).unwrap_err();
        assert!(matches!(err, AsmError::TruncatedCode { offset: 0 }));
    }

    #[test]
    fn every_resolved_branch_lands_on_its_label() {
        let source = "\
top:
PUSHI 1
BNE top
PUSHI 0
BEQ done
BRA top
done:
EXIT_OP
";
        let assembly = assemble(source).unwrap();
        let code = &assembly.code;
        let mut position = 0usize;
        while position < code.len() {
            let opcode = Opcode::try_from(code[position]).unwrap();
            if opcode.operand_kind() == OperandKind::Relative {
                let resolved =
                    (position as u16).wrapping_add(2).wrapping_add(code[position + 1]);
                assert!(assembly.labels.values().any(|&l| l == resolved));
            }
            position += usize::from(opcode.width());
        }
    }
}
