//! Slot directory and archive-level operations.

use std::io::Cursor;
use std::path::Path;

use uw_utils::reader::ByteReader;
use uw_utils::writer::DataWriter;

use crate::codec::CodecError;
use crate::conv::ark;
use crate::conv::header::{ConversationHeader, ImportRecord};

/// One conversation slot's payload: header scalars, import table, code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub string_block: u16,
    pub memory_slots: u16,
    pub imports: Vec<ImportRecord>,
    pub code: Vec<u16>,
}

impl Conversation {
    fn header(&self) -> ConversationHeader {
        ConversationHeader {
            code_size: self.code.len() as u16,
            string_block: self.string_block,
            memory_slots: self.memory_slots,
            import_count: self.imports.len() as u16,
        }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let header = ConversationHeader::read(reader)?;
        let mut imports = Vec::with_capacity(usize::from(header.import_count));
        for _ in 0..header.import_count {
            imports.push(ImportRecord::read(reader)?);
        }
        let mut code = Vec::with_capacity(usize::from(header.code_size));
        for _ in 0..header.code_size {
            code.push(reader.read_u16_le()?);
        }
        Ok(Self {
            string_block: header.string_block,
            memory_slots: header.memory_slots,
            imports,
            code,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        self.header()
            .write(&mut writer)
            .expect("in-memory write cannot fail");
        for import in &self.imports {
            import
                .write(&mut writer)
                .expect("in-memory write cannot fail");
        }
        for &word in &self.code {
            writer
                .write_u16_le(word)
                .expect("in-memory write cannot fail");
        }
        writer.into_inner().into_inner()
    }
}

/// A loaded `CNV.ARK`: the decompressed image plus whether the source
/// was compressed (updates re-compress on save in that case).
#[derive(Debug, Clone)]
pub struct ConvArchive {
    image: Vec<u8>,
    was_compressed: bool,
}

impl ConvArchive {
    /// An empty archive with `num_slots` empty slots.
    #[must_use]
    pub fn empty(num_slots: u16) -> Self {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        writer
            .write_u16_le(num_slots)
            .expect("in-memory write cannot fail");
        for _ in 0..num_slots {
            writer
                .write_u32_le(0)
                .expect("in-memory write cannot fail");
        }
        Self {
            image: writer.into_inner().into_inner(),
            was_compressed: false,
        }
    }

    pub fn load(bytes: &[u8]) -> Result<Self, CodecError> {
        let was_compressed = ark::is_compressed(bytes);
        let image = if was_compressed {
            ark::decompress(bytes)?
        } else {
            bytes.to_vec()
        };
        // Validate the directory up front.
        let archive = Self {
            image,
            was_compressed,
        };
        let count = archive.num_slots()?;
        for slot in 0..count {
            archive.slot_offset(slot)?;
        }
        Ok(archive)
    }

    pub fn load_file(path: &Path) -> Result<Self, CodecError> {
        Self::load(&std::fs::read(path)?)
    }

    #[must_use]
    pub fn was_compressed(&self) -> bool {
        self.was_compressed
    }

    /// The decompressed archive image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn num_slots(&self) -> Result<u16, CodecError> {
        let mut reader = ByteReader::new(&self.image);
        Ok(reader.read_u16_le()?)
    }

    /// Absolute offset of a slot's data; `None` for an empty slot.
    pub fn slot_offset(&self, slot: u16) -> Result<Option<u32>, CodecError> {
        let count = self.num_slots()?;
        if slot >= count {
            return Err(CodecError::NoSuchSlot { slot, count });
        }
        let mut reader = ByteReader::new(&self.image);
        reader.seek_to(2 + usize::from(slot) * 4)?;
        let offset = reader.read_u32_le()?;
        if offset == 0 {
            return Ok(None);
        }
        if offset as usize >= self.image.len() {
            return Err(CodecError::BadOffset {
                offset: u64::from(offset),
                size: self.image.len() as u64,
            });
        }
        Ok(Some(offset))
    }

    pub fn slot(&self, slot: u16) -> Result<Option<Conversation>, CodecError> {
        let Some(offset) = self.slot_offset(slot)? else {
            return Ok(None);
        };
        let mut reader = ByteReader::new(&self.image);
        reader.seek_to(offset as usize)?;
        Ok(Some(Conversation::read(&mut reader)?))
    }

    /// Install a rebuilt conversation into `slot`: the blob is appended
    /// to the end of the image and the directory entry repointed, so
    /// every other slot's bytes are untouched.
    pub fn update_slot(
        &mut self,
        slot: u16,
        conversation: &Conversation,
    ) -> Result<(), CodecError> {
        let count = self.num_slots()?;
        if slot >= count {
            return Err(CodecError::NoSuchSlot { slot, count });
        }
        let new_offset = self.image.len() as u32;
        self.image.extend_from_slice(&conversation.to_bytes());
        let entry = 2 + usize::from(slot) * 4;
        self.image[entry..entry + 4].copy_from_slice(&new_offset.to_le_bytes());
        Ok(())
    }

    /// Serialize, re-compressing when the source archive was compressed.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.was_compressed {
            ark::compress(&self.image)
        } else {
            self.image.clone()
        }
    }

    /// Replace `path`, renaming any existing file to `<path>.bak` first
    /// and persisting via a temp file in the same directory.
    pub fn save_to(&self, path: &Path) -> Result<(), CodecError> {
        if path.exists() {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bak");
            let backup = Path::new(&backup);
            if backup.exists() {
                std::fs::remove_file(backup)?;
            }
            std::fs::rename(path, backup)?;
        }
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        std::io::Write::write_all(&mut temp, &self.to_bytes())?;
        temp.persist(path).map_err(|error| error.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::header::{ImportType, ReturnType};

    fn sample_conversation(tag: u16) -> Conversation {
        Conversation {
            string_block: 0x0E00 + tag,
            memory_slots: 34,
            imports: vec![ImportRecord {
                name: "babl_menu".to_string(),
                id_or_addr: 0,
                import_type: ImportType::Function,
                return_type: ReturnType::Int,
            }],
            code: vec![0x0022, 0x0016, tag, 0x0026], // START, PUSHI tag, EXIT_OP
        }
    }

    fn archive_with_slots(slots: &[Option<Conversation>]) -> ConvArchive {
        let mut archive = ConvArchive::empty(slots.len() as u16);
        for (index, conversation) in slots.iter().enumerate() {
            if let Some(conversation) = conversation {
                archive.update_slot(index as u16, conversation).unwrap();
            }
        }
        archive
    }

    #[test]
    fn slots_round_trip() {
        let a = sample_conversation(1);
        let c = sample_conversation(3);
        let archive = archive_with_slots(&[Some(a.clone()), None, Some(c.clone())]);

        assert_eq!(archive.num_slots().unwrap(), 3);
        assert_eq!(archive.slot(0).unwrap(), Some(a));
        assert_eq!(archive.slot(1).unwrap(), None);
        assert_eq!(archive.slot(2).unwrap(), Some(c));
    }

    #[test]
    fn update_leaves_other_slots_bit_identical() {
        let a = sample_conversation(1);
        let b = sample_conversation(2);
        let c = sample_conversation(3);
        let mut archive =
            archive_with_slots(&[Some(a.clone()), Some(b), Some(c.clone())]);

        let offset_a = archive.slot_offset(0).unwrap().unwrap() as usize;
        let bytes_a_before =
            archive.image()[offset_a..offset_a + a.to_bytes().len()].to_vec();

        let replacement = sample_conversation(0xBB);
        archive.update_slot(1, &replacement).unwrap();

        assert_eq!(archive.slot(0).unwrap(), Some(a.clone()));
        assert_eq!(archive.slot(1).unwrap(), Some(replacement));
        assert_eq!(archive.slot(2).unwrap(), Some(c));

        let offset_a_after = archive.slot_offset(0).unwrap().unwrap() as usize;
        assert_eq!(offset_a, offset_a_after);
        assert_eq!(
            &archive.image()[offset_a..offset_a + bytes_a_before.len()],
            bytes_a_before.as_slice()
        );
    }

    #[test]
    fn compressed_archives_reload() {
        let archive = archive_with_slots(&[Some(sample_conversation(1))]);
        // Force the compressed representation and pad the image with
        // many short runs so the stream is dense in run tokens and the
        // detection heuristic sees it as compressed.
        let mut padded = archive.image().to_vec();
        for value in 0..200u8 {
            padded.extend([value; 5]);
        }
        let compressed = ark::compress(&padded);
        assert!(ark::is_compressed(&compressed));

        let reloaded = ConvArchive::load(&compressed).unwrap();
        assert!(reloaded.was_compressed());
        assert_eq!(reloaded.image(), padded.as_slice());
        assert_eq!(
            reloaded.slot(0).unwrap(),
            Some(sample_conversation(1))
        );
        // Saving re-compresses: decode back to the same image.
        let saved = reloaded.to_bytes();
        assert_eq!(ark::decompress(&saved).unwrap(), padded);
    }

    #[test]
    fn out_of_range_slot_is_an_error() {
        let archive = ConvArchive::empty(2);
        assert!(matches!(
            archive.slot(5),
            Err(CodecError::NoSuchSlot { slot: 5, count: 2 })
        ));
    }

    #[test]
    fn save_to_creates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnv.ark");

        let first = archive_with_slots(&[Some(sample_conversation(1))]);
        first.save_to(&path).unwrap();
        let second = archive_with_slots(&[Some(sample_conversation(2))]);
        second.save_to(&path).unwrap();

        let backup = dir.path().join("cnv.ark.bak");
        assert!(backup.exists());
        assert_eq!(std::fs::read(&path).unwrap(), second.to_bytes());
        assert_eq!(std::fs::read(&backup).unwrap(), first.to_bytes());
    }
}
