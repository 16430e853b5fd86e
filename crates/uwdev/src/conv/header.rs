//! Per-slot conversation header and import records.

use std::io;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use uw_utils::reader::ByteReader;
use uw_utils::writer::DataWriter;

use crate::codec::CodecError;

pub const HEADER_MARKER: u16 = 0x0828;

/// The 8-word header in front of every conversation slot. Three of the
/// words are always zero in game data and are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationHeader {
    /// Code section length in words.
    pub code_size: u16,
    /// Game strings block holding this conversation's text.
    pub string_block: u16,
    /// Private memory cells the conversation persists.
    pub memory_slots: u16,
    pub import_count: u16,
}

impl ConversationHeader {
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let marker = reader.read_u16_le()?;
        if marker != HEADER_MARKER {
            return Err(CodecError::BadHeaderMarker { found: marker });
        }
        let _zero = reader.read_u16_le()?;
        let code_size = reader.read_u16_le()?;
        let _zero = reader.read_u16_le()?;
        let _zero = reader.read_u16_le()?;
        let string_block = reader.read_u16_le()?;
        let memory_slots = reader.read_u16_le()?;
        let import_count = reader.read_u16_le()?;
        Ok(Self {
            code_size,
            string_block,
            memory_slots,
            import_count,
        })
    }

    pub fn write<W: io::Write + io::Seek>(
        &self,
        writer: &mut DataWriter<W>,
    ) -> io::Result<()> {
        writer.write_u16_le(HEADER_MARKER)?;
        writer.write_u16_le(0)?;
        writer.write_u16_le(self.code_size)?;
        writer.write_u16_le(0)?;
        writer.write_u16_le(0)?;
        writer.write_u16_le(self.string_block)?;
        writer.write_u16_le(self.memory_slots)?;
        writer.write_u16_le(self.import_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ImportType {
    Variable = 0x010F,
    Function = 0x0111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum ReturnType {
    Void = 0x0000,
    Int = 0x0129,
    String = 0x012B,
}

impl ReturnType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ReturnType::Void => "void",
            ReturnType::Int => "int",
            ReturnType::String => "string",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "void" => Some(ReturnType::Void),
            "int" => Some(ReturnType::Int),
            "string" => Some(ReturnType::String),
            _ => None,
        }
    }
}

/// One imported function or variable named by a conversation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub name: String,
    /// Function id for functions, memory address for variables.
    pub id_or_addr: u16,
    pub import_type: ImportType,
    pub return_type: ReturnType,
}

impl ImportRecord {
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let name_length = reader.read_u16_le()?;
        let name_bytes = reader.read_bytes(usize::from(name_length))?;
        let name = name_bytes.iter().map(|&b| char::from(b)).collect();
        let id_or_addr = reader.read_u16_le()?;
        let _filler = reader.read_u16_le()?; // always 1 in game data
        let type_word = reader.read_u16_le()?;
        let import_type = ImportType::try_from(type_word).map_err(|_| {
            CodecError::BadImportField {
                field: "type",
                value: type_word,
            }
        })?;
        let return_word = reader.read_u16_le()?;
        let return_type = ReturnType::try_from(return_word).map_err(|_| {
            CodecError::BadImportField {
                field: "return type",
                value: return_word,
            }
        })?;
        Ok(Self {
            name,
            id_or_addr,
            import_type,
            return_type,
        })
    }

    pub fn write<W: io::Write + io::Seek>(
        &self,
        writer: &mut DataWriter<W>,
    ) -> io::Result<()> {
        writer.write_u16_le(self.name.len() as u16)?;
        writer.write_bytes(self.name.as_bytes())?;
        writer.write_u16_le(self.id_or_addr)?;
        writer.write_u16_le(1)?;
        writer.write_u16_le(self.import_type.into())?;
        writer.write_u16_le(self.return_type.into())
    }
}
