//! Positioned little-endian reader over an in-memory buffer.

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of data at offset {offset} (wanted {wanted} more bytes)")]
    UnexpectedEof { offset: usize, wanted: usize },
    #[error("seek target {target} is past the end of the buffer ({size} bytes)")]
    SeekPastEnd { target: usize, size: usize },
}

pub type Result<T> = std::result::Result<T, ReadError>;

pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(ReadError::SeekPastEnd {
                target: offset,
                size: self.data.len(),
            });
        }
        self.position = offset;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ReadError::UnexpectedEof {
                offset: self.position,
                wanted: len - self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mixed_widths() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn eof_reports_offset() {
        let mut reader = ByteReader::new(&[0xAA]);
        reader.read_u8().unwrap();
        let err = reader.read_u16_le().unwrap_err();
        assert!(matches!(
            err,
            ReadError::UnexpectedEof {
                offset: 1,
                wanted: 2
            }
        ));
    }

    #[test]
    fn seek_past_end_rejected() {
        let mut reader = ByteReader::new(&[0, 1, 2]);
        assert!(reader.seek_to(3).is_ok());
        assert!(reader.seek_to(4).is_err());
    }
}
