//! Little-endian writer with support for the reserve-then-patch layout
//! passes used by the archive formats.

use std::io;

pub struct DataWriter<W> {
    inner: W,
}

impl<W: io::Write + io::Seek> DataWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(io::SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn seek_to_end(&mut self) -> io::Result<u64> {
        self.inner.seek(io::SeekFrom::End(0))
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.inner.write_all(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> io::Result<()> {
        self.inner.write_all(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// Overwrite a previously written u16 without disturbing the cursor.
    pub fn patch_u16_at(&mut self, pos: u64, value: u16) -> io::Result<()> {
        let saved = self.inner.stream_position()?;
        self.inner.seek(io::SeekFrom::Start(pos))?;
        self.inner.write_all(&value.to_le_bytes())?;
        self.inner.seek(io::SeekFrom::Start(saved))?;
        Ok(())
    }

    /// Overwrite a previously written u32 without disturbing the cursor.
    pub fn patch_u32_at(&mut self, pos: u64, value: u32) -> io::Result<()> {
        let saved = self.inner.stream_position()?;
        self.inner.seek(io::SeekFrom::Start(pos))?;
        self.inner.write_all(&value.to_le_bytes())?;
        self.inner.seek(io::SeekFrom::Start(saved))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn patching_preserves_cursor() {
        let mut writer = DataWriter::new(Cursor::new(Vec::new()));
        writer.write_u16_le(0).unwrap();
        writer.write_u32_le(0xDEAD_BEEF).unwrap();
        writer.patch_u16_at(0, 0x0102).unwrap();
        writer.write_u8(0xFF).unwrap();
        let data = writer.into_inner().into_inner();
        assert_eq!(data, vec![0x02, 0x01, 0xEF, 0xBE, 0xAD, 0xDE, 0xFF]);
    }
}
