//! Memory-then-disk byte buffer.
//!
//! [`SpooledBody`] starts as an in-memory cursor and moves its contents to an
//! anonymous temporary file once it grows past a threshold. Request bodies and
//! multipart file parts are both buffered through it, so small payloads never
//! touch the filesystem while large ones never sit fully in memory.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use tracing::debug;

/// In-memory ceiling for buffered bodies (100 KiB).
pub const MEMFILE_MAX: usize = 102_400;

#[derive(Debug)]
enum Storage {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

/// A readable, writable, seekable buffer that spills to a temp file.
#[derive(Debug)]
pub struct SpooledBody {
    storage: Storage,
    threshold: usize,
    len: u64,
}

impl Default for SpooledBody {
    fn default() -> Self {
        Self::new(MEMFILE_MAX)
    }
}

impl SpooledBody {
    /// Create an empty buffer that spills once it holds more than `threshold` bytes.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            storage: Storage::Memory(Cursor::new(Vec::new())),
            threshold,
            len: 0,
        }
    }

    /// Wrap bytes already in memory, positioned at the start.
    ///
    /// The threshold is set to `usize::MAX`; the contents never spill.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self {
            storage: Storage::Memory(Cursor::new(bytes)),
            threshold: usize::MAX,
            len,
        }
    }

    /// Returns true once the contents live in a temporary file.
    #[must_use]
    pub fn is_spooled(&self) -> bool {
        matches!(self.storage, Storage::File(_))
    }

    /// Total number of bytes written.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the entire contents without moving the cursor.
    pub fn contents(&mut self) -> io::Result<Vec<u8>> {
        match &mut self.storage {
            Storage::Memory(cursor) => Ok(cursor.get_ref().clone()),
            Storage::File(file) => {
                let position = file.stream_position()?;
                file.seek(SeekFrom::Start(0))?;
                let mut out = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
                let result = file.read_to_end(&mut out);
                file.seek(SeekFrom::Start(position))?;
                result.map(|_| out)
            }
        }
    }

    fn spill(&mut self) -> io::Result<()> {
        let Storage::Memory(cursor) = &self.storage else {
            return Ok(());
        };
        let position = cursor.position();
        let mut file = tempfile::tempfile()?;
        file.write_all(cursor.get_ref())?;
        file.seek(SeekFrom::Start(position))?;
        debug!(bytes = self.len, threshold = self.threshold, "spooled buffer to temporary file");
        self.storage = Storage::File(file);
        Ok(())
    }
}

impl Write for SpooledBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match &mut self.storage {
            Storage::Memory(cursor) => cursor.write(buf)?,
            Storage::File(file) => file.write(buf)?,
        };
        let position = self.stream_position()?;
        self.len = self.len.max(position);
        if self.len > self.threshold as u64 {
            self.spill()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.storage {
            Storage::Memory(_) => Ok(()),
            Storage::File(file) => file.flush(),
        }
    }
}

impl Read for SpooledBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.read(buf),
            Storage::File(file) => file.read(buf),
        }
    }
}

impl Seek for SpooledBody {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.seek(pos),
            Storage::File(file) => file.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_writes_stay_in_memory() {
        let mut body = SpooledBody::new(16);
        body.write_all(b"hello").unwrap();
        assert!(!body.is_spooled());
        assert_eq!(body.len(), 5);
        assert_eq!(body.contents().unwrap(), b"hello");
    }

    #[test]
    fn exactly_threshold_stays_in_memory() {
        let mut body = SpooledBody::new(4);
        body.write_all(b"abcd").unwrap();
        assert!(!body.is_spooled());
    }

    #[test]
    fn crossing_threshold_spills_and_keeps_position() {
        let mut body = SpooledBody::new(4);
        body.write_all(b"abc").unwrap();
        body.write_all(b"def").unwrap();
        assert!(body.is_spooled());
        assert_eq!(body.len(), 6);
        assert_eq!(body.stream_position().unwrap(), 6);

        body.write_all(b"gh").unwrap();
        body.rewind().unwrap();
        let mut out = String::new();
        body.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcdefgh");
    }

    #[test]
    fn contents_does_not_move_cursor() {
        let mut body = SpooledBody::new(2);
        body.write_all(b"spilled").unwrap();
        body.seek(SeekFrom::Start(3)).unwrap();

        assert_eq!(body.contents().unwrap(), b"spilled");
        assert_eq!(body.stream_position().unwrap(), 3);
    }

    #[test]
    fn from_bytes_reads_from_start() {
        let mut body = SpooledBody::from_bytes(b"payload".to_vec());
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(body.len(), 7);
        assert!(!body.is_spooled());
    }
}
