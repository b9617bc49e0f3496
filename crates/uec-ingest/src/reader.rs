//! Line reader over plain or gzip-compressed log files
//!
//! Lines are yielded as raw bytes so that invalid UTF-8 is a per-line
//! rejection rather than an error for the whole file. Decompression errors
//! surface as `io::Error` from the iterator and abort the file.

use crate::error::{IngestError, Result};
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

const GZIP_SUFFIX: &str = ".gz";

pub fn is_compressed(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(GZIP_SUFFIX))
}

/// One non-blank line, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number in the decompressed stream
    pub number: u64,
    pub bytes: Vec<u8>,
}

pub struct LogFileReader {
    inner: Box<dyn BufRead + Send>,
    line_number: u64,
}

impl LogFileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
        let buffered = BufReader::new(file);

        let inner: Box<dyn BufRead + Send> = if is_compressed(path) {
            debug!(path = %path.display(), "Opening gzip log file");
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };

        Ok(Self::from_reader(inner))
    }

    pub fn from_reader(inner: Box<dyn BufRead + Send>) -> Self {
        Self {
            inner,
            line_number: 0,
        }
    }
}

impl Iterator for LogFileReader {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut bytes = Vec::new();
            match self.inner.read_until(b'\n', &mut bytes) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_number += 1;

            while matches!(bytes.last(), Some(b'\n' | b'\r')) {
                bytes.pop();
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Some(Ok(RawLine {
                number: self.line_number,
                bytes,
            }));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn lines(reader: LogFileReader) -> Vec<(u64, Vec<u8>)> {
        reader
            .map(|l| l.unwrap())
            .map(|l| (l.number, l.bytes))
            .collect()
    }

    #[test]
    fn test_plain_file_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events-20230101-000000.log");
        std::fs::write(&path, "{\"a\":1}\r\n\n{\"b\":2}").unwrap();

        let read = lines(LogFileReader::open(&path).unwrap());
        assert_eq!(
            read,
            vec![(1, b"{\"a\":1}".to_vec()), (3, b"{\"b\":2}".to_vec())]
        );
    }

    #[test]
    fn test_gzip_file_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events-20230101-000000.log.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"one\ntwo\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert!(is_compressed(&path));
        let read = lines(LogFileReader::open(&path).unwrap());
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].1, b"two".to_vec());
    }

    #[test]
    fn test_invalid_utf8_is_passed_through() {
        let reader = LogFileReader::from_reader(Box::new(io::Cursor::new(b"\xff\xfe\n".to_vec())));
        assert_eq!(lines(reader), vec![(1, vec![0xff, 0xfe])]);
    }

    #[test]
    fn test_corrupt_gzip_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken-20230101-000000.log.gz");
        std::fs::write(&path, b"this is not gzip data at all").unwrap();

        let mut reader = LogFileReader::open(&path).unwrap();
        assert!(reader.any(|l| l.is_err()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LogFileReader::open(Path::new("/nonexistent/uec/file.log")).err().unwrap();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
