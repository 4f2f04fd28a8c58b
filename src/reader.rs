use std::io::{self, Read, Seek, SeekFrom};

use crate::parser::{ParseError, ParseErrorKind};

/// A readable, seekable byte source: a file or an in-memory buffer
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek> ByteSource for T {}

/// Tracks the absolute read position and length of a [`ByteSource`]
#[derive(Debug)]
pub struct Mp4Reader<R> {
    reader: R,
    pub(crate) current_offset: u64,
    len: u64,
}

impl<R: ByteSource> Mp4Reader<R> {
    pub fn new(mut reader: R) -> Result<Self, ParseError> {
        let len = reader
            .seek(SeekFrom::End(0))
            .map_err(|err| io_error(err, None))?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| io_error(err, None))?;
        Ok(Self {
            reader,
            current_offset: 0,
            len,
        })
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Total length of the source
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_eof(&self) -> bool {
        self.current_offset >= self.len
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ParseError> {
        let location = Some((self.current_offset, buf.len() as u64));
        self.reader.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                ParseError {
                    kind: ParseErrorKind::Eof,
                    location,
                    source: Some(Box::new(err)),
                }
            } else {
                io_error(err, location)
            }
        })?;
        self.current_offset += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn read_data(&mut self, size: u64) -> Result<Vec<u8>, ParseError> {
        if self.current_offset.saturating_add(size) > self.len {
            return Err(ParseError::new(
                ParseErrorKind::Eof,
                Some((self.current_offset, size)),
            ));
        }
        let mut data = vec![0u8; size as usize];
        self.read_exact(&mut data)?;
        Ok(data)
    }

    pub(crate) fn seek(&mut self, offset: u64) -> Result<(), ParseError> {
        if offset == self.current_offset {
            return Ok(());
        }
        self.current_offset = self
            .reader
            .seek(SeekFrom::Start(offset))
            .map_err(|err| io_error(err, Some((offset, 0))))?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes at `offset`, for streamed range copies
    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if offset != self.current_offset {
            self.current_offset = self.reader.seek(SeekFrom::Start(offset))?;
        }
        self.reader.read_exact(buf)?;
        self.current_offset += buf.len() as u64;
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn io_error(err: io::Error, location: Option<(u64, u64)>) -> ParseError {
    ParseError {
        kind: ParseErrorKind::Io,
        location,
        source: Some(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_tracks_offset() {
        let mut reader = Mp4Reader::new(Cursor::new(vec![1u8, 2, 3, 4, 5])).unwrap();
        assert_eq!(reader.len(), 5);
        assert_eq!(reader.read_data(2).unwrap(), vec![1, 2]);
        assert_eq!(reader.current_offset(), 2);
        reader.seek(4).unwrap();
        assert_eq!(reader.read_data(1).unwrap(), vec![5]);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = Mp4Reader::new(Cursor::new(vec![0u8; 4])).unwrap();
        let err = reader.read_data(8).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Eof);
        assert_eq!(err.location(), Some((0, 8)));
    }
}
