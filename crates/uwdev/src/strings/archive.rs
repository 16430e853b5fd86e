//! Binary layout of the STRINGS archive.
//!
//! ```text
//! u16 node_count
//! node_count x { u8 symbol, u8 parent, u8 left, u8 right }
//! u16 block_count
//! block_count x { u16 block_id, u32 block_offset }   absolute, ascending
//!
//! per block, at its offset:
//!   u16 string_count
//!   string_count x u16 string_offset    relative to the string data
//!   concatenated bitstreams, each string '|'-terminated
//! ```
//!
//! Re-encoded archives decode back to the same logical data; the byte
//! layout is not required to match the original packer.

use std::io;

use bitter::BigEndianReader;
use serde::{Deserialize, Serialize};
use uw_utils::reader::ByteReader;
use uw_utils::writer::DataWriter;

use crate::codec::CodecError;
use crate::strings::huffman::{self, HuffNode, HuffmanTree};
use crate::strings::store::GameStrings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_id: u16,
    pub offset: u32,
}

#[derive(Debug)]
pub struct StringsPak {
    pub tree: HuffmanTree,
    pub block_infos: Vec<BlockInfo>,
    pub strings: GameStrings,
}

pub fn read_pak(data: &[u8]) -> Result<StringsPak, CodecError> {
    let mut reader = ByteReader::new(data);

    let node_count = reader.read_u16_le()?;
    let mut nodes = Vec::with_capacity(usize::from(node_count));
    for _ in 0..node_count {
        nodes.push(HuffNode {
            symbol: reader.read_u8()?,
            parent: reader.read_u8()?,
            left: reader.read_u8()?,
            right: reader.read_u8()?,
        });
    }
    let tree = HuffmanTree::new(nodes)?;

    let block_count = reader.read_u16_le()?;
    let mut block_infos = Vec::with_capacity(usize::from(block_count));
    for _ in 0..block_count {
        block_infos.push(BlockInfo {
            block_id: reader.read_u16_le()?,
            offset: reader.read_u32_le()?,
        });
    }

    let mut strings = GameStrings::new();
    for info in &block_infos {
        let offset = info.offset as usize;
        if offset >= data.len() {
            return Err(CodecError::BadOffset {
                offset: u64::from(info.offset),
                size: data.len() as u64,
            });
        }
        reader.seek_to(offset)?;
        let string_count = reader.read_u16_le()?;
        let mut string_offsets = Vec::with_capacity(usize::from(string_count));
        for _ in 0..string_count {
            string_offsets.push(reader.read_u16_le()?);
        }

        // String data begins right after the count and offset table.
        let data_start = offset + (usize::from(string_count) + 1) * 2;
        let mut block_strings = Vec::with_capacity(usize::from(string_count));
        for &string_offset in &string_offsets {
            let start = data_start + usize::from(string_offset);
            if start > data.len() {
                return Err(CodecError::BadOffset {
                    offset: start as u64,
                    size: data.len() as u64,
                });
            }
            let mut bits = BigEndianReader::new(&data[start..]);
            block_strings.push(tree.decode_string(&mut bits)?);
        }
        strings.insert_block(info.block_id, block_strings);
    }

    Ok(StringsPak {
        tree,
        block_infos,
        strings,
    })
}

/// Write the archive: header, directory with placeholder offsets, then
/// each block's count/offset-table/bitstreams, patching the tables as
/// the real offsets become known. Blocks are written in ascending id
/// order.
pub fn write_pak<W: io::Write + io::Seek>(
    writer: &mut DataWriter<W>,
    tree: &HuffmanTree,
    strings: &GameStrings,
) -> Result<(), CodecError> {
    let nodes = tree.nodes();
    writer.write_u16_le(nodes.len() as u16)?;
    for node in nodes {
        writer.write_u8(node.symbol)?;
        writer.write_u8(node.parent)?;
        writer.write_u8(node.left)?;
        writer.write_u8(node.right)?;
    }

    writer.write_u16_le(strings.block_count() as u16)?;
    let directory_pos = writer.position()?;
    for (block_id, _) in strings.blocks() {
        writer.write_u16_le(block_id)?;
        writer.write_u32_le(0)?;
    }

    let codes = tree.code_map();
    let mut directory_entry = directory_pos;
    for (_, block) in strings.blocks() {
        let block_offset = writer.position()?;
        writer.patch_u32_at(directory_entry + 2, block_offset as u32)?;
        directory_entry += 6;

        writer.write_u16_le(block.len() as u16)?;
        let table_pos = writer.position()?;
        for _ in block {
            writer.write_u16_le(0)?;
        }

        let data_start = writer.position()?;
        for (index, text) in block.iter().enumerate() {
            let relative = writer.position()? - data_start;
            let relative = u16::try_from(relative).map_err(|_| CodecError::BadOffset {
                offset: relative,
                size: u64::from(u16::MAX),
            })?;
            writer.patch_u16_at(table_pos + index as u64 * 2, relative)?;
            writer.write_bytes(&huffman::encode_string(&codes, text)?)?;
        }
    }
    Ok(())
}

/// Serialize a whole archive to bytes.
pub fn pak_to_bytes(tree: &HuffmanTree, strings: &GameStrings) -> Result<Vec<u8>, CodecError> {
    let mut writer = DataWriter::new(std::io::Cursor::new(Vec::new()));
    write_pak(&mut writer, tree, strings)?;
    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::huffman::NO_CHILD;
    use std::io::Cursor;

    fn ascii_tree() -> HuffmanTree {
        // A balanced tree over the printable range plus '|' and '\n',
        // built as a simple left-spine so every symbol gets a code.
        let mut nodes: Vec<HuffNode> = Vec::new();
        let symbols: Vec<u8> = (b' '..=b'~').chain([b'\n']).collect();
        for &symbol in &symbols {
            nodes.push(HuffNode {
                symbol,
                parent: 0,
                left: NO_CHILD,
                right: NO_CHILD,
            });
        }
        // Chain: each branch pairs the accumulated subtree with the next leaf.
        let mut previous = 0u8;
        for leaf in 1..symbols.len() {
            nodes.push(HuffNode {
                symbol: 0,
                parent: 0,
                left: previous,
                right: leaf as u8,
            });
            previous = (nodes.len() - 1) as u8;
        }
        HuffmanTree::new(nodes).unwrap()
    }

    fn sample_strings() -> GameStrings {
        let mut strings = GameStrings::new();
        strings.insert_block(
            1,
            vec![
                "Hail, traveller!".to_string(),
                String::new(),
                "What brings thee here?".to_string(),
            ],
        );
        strings.insert_block(0x0f0c, vec!["Gronk.".to_string()]);
        strings
    }

    #[test]
    fn pak_round_trips_logically() {
        let tree = ascii_tree();
        let strings = sample_strings();

        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        write_pak(&mut writer, &tree, &strings).unwrap();
        let bytes = writer.into_inner().into_inner();

        let pak = read_pak(&bytes).unwrap();
        assert_eq!(pak.strings, strings);
        assert_eq!(pak.tree.nodes(), tree.nodes());

        // Re-pack the extraction and extract again: still equal.
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        write_pak(&mut writer, &pak.tree, &pak.strings).unwrap();
        let bytes_again = writer.into_inner().into_inner();
        assert_eq!(read_pak(&bytes_again).unwrap().strings, strings);
    }

    #[test]
    fn directory_is_ascending_with_valid_offsets() {
        let tree = ascii_tree();
        let strings = sample_strings();
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        write_pak(&mut writer, &tree, &strings).unwrap();
        let bytes = writer.into_inner().into_inner();

        let pak = read_pak(&bytes).unwrap();
        assert_eq!(pak.block_infos.len(), 2);
        assert_eq!(pak.block_infos[0].block_id, 1);
        assert_eq!(pak.block_infos[1].block_id, 0x0f0c);
        assert!(pak.block_infos[0].offset < pak.block_infos[1].offset);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let tree = ascii_tree();
        let strings = sample_strings();
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        write_pak(&mut writer, &tree, &strings).unwrap();
        let bytes = writer.into_inner().into_inner();

        let err = read_pak(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated | CodecError::BadOffset { .. }
        ));
    }
}
