//! Render a conversation slot as assembly text with a metadata header
//! that `conv::compile` can read back.

use std::fmt::Write as _;

use crate::asm::{self, AsmError};
use crate::conv::archive::Conversation;
use crate::conv::header::ImportType;

pub fn disassemble_slot(
    slot: u16,
    conversation: &Conversation,
) -> Result<String, AsmError> {
    let mut out = String::new();
    let _ = writeln!(out, "; Decompiled conversation script");
    let _ = writeln!(out, "; Slot: {slot:04X}");
    let _ = writeln!(out, "; String Block: {}", conversation.string_block);
    let _ = writeln!(out, "; Memory Slots: {}", conversation.memory_slots);
    out.push('\n');

    let _ = writeln!(out, "; Imported Functions/Variables:");
    for (index, import) in conversation.imports.iter().enumerate() {
        match import.import_type {
            ImportType::Function => {
                let _ = writeln!(
                    out,
                    "; Import {index}: Function {}, ID: {}, Returns: {}",
                    import.name,
                    import.id_or_addr,
                    import.return_type.name()
                );
            }
            ImportType::Variable => {
                let _ = writeln!(
                    out,
                    "; Import {index}: Variable {}, Addr: 0x{:04X}",
                    import.name, import.id_or_addr
                );
            }
        }
    }
    out.push('\n');

    out.push_str(&asm::disassemble(&conversation.code)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::header::{ImportRecord, ReturnType};

    #[test]
    fn header_comments_cover_the_metadata() {
        let conversation = Conversation {
            string_block: 3585,
            memory_slots: 34,
            imports: vec![
                ImportRecord {
                    name: "babl_menu".to_string(),
                    id_or_addr: 0,
                    import_type: ImportType::Function,
                    return_type: ReturnType::Int,
                },
                ImportRecord {
                    name: "play_hunger".to_string(),
                    id_or_addr: 0,
                    import_type: ImportType::Variable,
                    return_type: ReturnType::Int,
                },
            ],
            code: vec![0x22, 0x26], // START, EXIT_OP
        };
        let text = disassemble_slot(0x0E01, &conversation).unwrap();
        assert!(text.contains("; Slot: 0E01"));
        assert!(text.contains("; String Block: 3585"));
        assert!(text.contains("; Memory Slots: 34"));
        assert!(text.contains("; Import 0: Function babl_menu, ID: 0, Returns: int"));
        assert!(text.contains("; Import 1: Variable play_hunger, Addr: 0x0000"));
        assert!(text.contains("START\nEXIT_OP\n"));
    }
}
