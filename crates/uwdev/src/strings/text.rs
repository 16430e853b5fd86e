//! The extraction text form:
//!
//! ```text
//! STRINGS.PAK: N string blocks.
//!
//! block: 0001; 3 strings.
//! 0: Hail, traveller!
//! 1:
//! 2: What brings thee here?\n
//! ```
//!
//! Block ids are four-digit hex; embedded newlines are escaped as
//! `\n`. The parser is tolerant: entries may appear out of order and
//! gaps are padded with empty strings.

use std::fmt::Write as _;

use crate::strings::store::GameStrings;

#[derive(Debug, thiserror::Error)]
pub enum TextFormError {
    #[error("line {line}: bad block header: {text}")]
    BadBlockHeader { line: usize, text: String },
    #[error("line {line}: string entry before any block header")]
    EntryOutsideBlock { line: usize },
}

#[must_use]
pub fn format(strings: &GameStrings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "STRINGS.PAK: {} string blocks.", strings.block_count());
    out.push('\n');
    for (block_id, block) in strings.blocks() {
        let _ = writeln!(out, "block: {block_id:04x}; {} strings.", block.len());
        for (index, text) in block.iter().enumerate() {
            let _ = writeln!(out, "{index}: {}", text.replace('\n', "\\n"));
        }
        out.push('\n');
    }
    out
}

pub fn parse(input: &str) -> Result<GameStrings, TextFormError> {
    let mut strings = GameStrings::new();
    let mut current_block: Option<u16> = None;

    for (number, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("STRINGS.PAK:") {
            continue;
        }

        if let Some(rest) = line.strip_prefix("block:") {
            let id_text = rest.split(';').next().unwrap_or("").trim();
            let block_id = u16::from_str_radix(id_text, 16).map_err(|_| {
                TextFormError::BadBlockHeader {
                    line: number + 1,
                    text: line.to_string(),
                }
            })?;
            strings.insert_block(block_id, Vec::new());
            current_block = Some(block_id);
            continue;
        }

        if let Some((index_text, text)) = line.split_once(':') {
            let Ok(index) = index_text.trim().parse::<u16>() else {
                continue; // not a string entry line
            };
            let block =
                current_block.ok_or(TextFormError::EntryOutsideBlock { line: number + 1 })?;
            strings.set(block, index, text.trim().replace("\\n", "\n"));
        }
    }
    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_is_identity() {
        let mut strings = GameStrings::new();
        strings.insert_block(
            1,
            vec![
                "Hail!".to_string(),
                String::new(),
                "Two\nlines".to_string(),
            ],
        );
        strings.insert_block(0x0f0c, vec!["Gronk.".to_string()]);

        let text = format(&strings);
        assert!(text.starts_with("STRINGS.PAK: 2 string blocks.\n"));
        assert!(text.contains("block: 0001; 3 strings."));
        assert!(text.contains("2: Two\\nlines"));
        assert_eq!(parse(&text).unwrap(), strings);
    }

    #[test]
    fn parse_pads_gaps_and_reorders() {
        let input = "block: 0002; 3 strings.\n2: last\n0: first\n";
        let strings = parse(input).unwrap();
        assert_eq!(strings.get(2, 0), Some("first"));
        assert_eq!(strings.get(2, 1), Some(""));
        assert_eq!(strings.get(2, 2), Some("last"));
    }

    #[test]
    fn bad_block_header_is_an_error() {
        assert!(matches!(
            parse("block: zzzz; 1 strings.\n"),
            Err(TextFormError::BadBlockHeader { line: 1, .. })
        ));
    }

    #[test]
    fn entry_before_block_is_an_error() {
        assert!(matches!(
            parse("0: orphan\n"),
            Err(TextFormError::EntryOutsideBlock { line: 1 })
        ));
    }
}
