//! Parse slot assembly text (as produced by `conv::disasm` or the
//! UWScript compiler) back into a `Conversation`.

use crate::asm::{self, AsmError};
use crate::conv::archive::Conversation;
use crate::conv::header::{ImportRecord, ImportType, ReturnType};

#[derive(Debug, thiserror::Error)]
pub enum SlotAsmError {
    #[error(transparent)]
    Asm(#[from] AsmError),
    #[error("line {line}: malformed import comment: {text}")]
    BadImportLine { line: usize, text: String },
    #[error("line {line}: malformed metadata comment: {text}")]
    BadMetadata { line: usize, text: String },
}

#[derive(Debug)]
pub struct SlotAsm {
    /// Slot index from the `; Slot:` comment, when present.
    pub slot: Option<u16>,
    pub conversation: Conversation,
}

/// Default private-memory reservation when the source names none: the
/// conversation slots plus one per import, as the original compiler
/// sized them.
fn default_memory_slots(import_count: usize) -> u16 {
    32 + import_count as u16
}

pub fn parse_slot_asm(source: &str) -> Result<SlotAsm, SlotAsmError> {
    let mut slot = None;
    let mut string_block: Option<u16> = None;
    let mut memory_slots: Option<u16> = None;
    let mut imports = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if !line.starts_with(';') {
            continue;
        }
        let comment = line.trim_start_matches(';').trim();

        if let Some(value) = comment.strip_prefix("Slot:") {
            let value = value.trim().trim_start_matches("0x");
            slot = Some(u16::from_str_radix(value, 16).map_err(|_| {
                SlotAsmError::BadMetadata {
                    line: line_no,
                    text: line.to_string(),
                }
            })?);
        } else if let Some(value) = comment.strip_prefix("String Block:") {
            string_block =
                Some(value.trim().parse().map_err(|_| SlotAsmError::BadMetadata {
                    line: line_no,
                    text: line.to_string(),
                })?);
        } else if let Some(value) = comment.strip_prefix("Memory Slots:") {
            memory_slots =
                Some(value.trim().parse().map_err(|_| SlotAsmError::BadMetadata {
                    line: line_no,
                    text: line.to_string(),
                })?);
        } else if comment.starts_with("Import ") {
            imports.push(parse_import(comment).ok_or_else(|| {
                SlotAsmError::BadImportLine {
                    line: line_no,
                    text: line.to_string(),
                }
            })?);
        }
    }

    let assembly = asm::assemble(source)?;
    let memory_slots = memory_slots.unwrap_or_else(|| default_memory_slots(imports.len()));
    Ok(SlotAsm {
        slot,
        conversation: Conversation {
            string_block: string_block.unwrap_or(1),
            memory_slots,
            imports,
            code: assembly.code,
        },
    })
}

/// `Import 0: Function babl_menu, ID: 0, Returns: int`
/// `Import 1: Variable play_hunger, Addr: 0x0000`
fn parse_import(comment: &str) -> Option<ImportRecord> {
    let (_, rest) = comment.split_once(':')?;
    let rest = rest.trim();

    if let Some(rest) = rest.strip_prefix("Function ") {
        let (name, rest) = rest.split_once(',')?;
        let rest = rest.trim();
        let rest = rest.strip_prefix("ID:")?.trim();
        let (id, rest) = rest.split_once(',')?;
        let id = id.trim().parse().ok()?;
        let returns = rest.trim().strip_prefix("Returns:")?.trim();
        Some(ImportRecord {
            name: name.trim().to_string(),
            id_or_addr: id,
            import_type: ImportType::Function,
            return_type: ReturnType::from_name(returns)?,
        })
    } else if let Some(rest) = rest.strip_prefix("Variable ") {
        let (name, rest) = rest.split_once(',')?;
        let rest = rest.trim().strip_prefix("Addr:")?.trim();
        let addr = rest.strip_prefix("0x").unwrap_or(rest);
        Some(ImportRecord {
            name: name.trim().to_string(),
            id_or_addr: u16::from_str_radix(addr, 16).ok()?,
            import_type: ImportType::Variable,
            return_type: ReturnType::Int,
        })
    } else {
        None
    }
}
