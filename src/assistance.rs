use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use flate2::read::GzDecoder;
use log::{debug, warn};
use thiserror::Error;

use crate::ubx::{AssistanceRecord, DecodeError, Decoded, Decoder, Message};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open \"{path}\": {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid assistance data: {0}")]
    Decoding(#[from] DecodeError),
}

/// Sequential, read-only store of [AssistanceRecord]s
pub trait AssistanceSource {
    /// Next [AssistanceRecord], None once exhausted.
    fn next_record(&mut self) -> Result<Option<AssistanceRecord>, SourceError>;
}

impl AssistanceSource for std::vec::IntoIter<AssistanceRecord> {
    fn next_record(&mut self) -> Result<Option<AssistanceRecord>, SourceError> {
        Ok(self.next())
    }
}

/// Plain or gzip compressed file handle
pub enum FileHandle {
    Plain(BufReader<File>),
    Gzip(GzDecoder<BufReader<File>>),
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
        }
    }
}

impl FileHandle {
    /// Opens a file, gzip decompression applies to names terminated by `.gz`
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let fd = File::open(path).map_err(|source| SourceError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let reader = BufReader::new(fd);

        if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
            Ok(Self::Gzip(GzDecoder::new(reader)))
        } else {
            Ok(Self::Plain(reader))
        }
    }
}

/// AssistNow Offline file: a sequence of UBX-MGA-ANO frames
pub struct AnoFile<R: Read> {
    decoder: Decoder<R>,
    skipped: usize,
}

impl AnoFile<FileHandle> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        debug!("opening assistance file \"{}\"", path.display());
        Ok(Self::from_reader(FileHandle::open(path)?))
    }
}

impl<R: Read> AnoFile<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            skipped: 0,
            decoder: Decoder::new(reader),
        }
    }

    /// Number of frames that were not MGA-ANO records
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: Read> AssistanceSource for AnoFile<R> {
    fn next_record(&mut self) -> Result<Option<AssistanceRecord>, SourceError> {
        loop {
            match self.decoder.decode_next()? {
                Decoded::Message(Message::AssistanceRecord(record)) => return Ok(Some(record)),
                Decoded::Message(msg) => {
                    let (class, id) = msg.class_id();
                    warn!(
                        "assistance file: skipping non MGA-ANO frame (class=0x{:02x}, id=0x{:02x})",
                        class, id
                    );
                    self.skipped += 1;
                },
                Decoded::Idle => {},
                Decoded::EndOfStream => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ubx::{PositionFix, frame};
    use flate2::{Compression, write::GzEncoder};
    use std::{
        io::{Cursor, Write},
        path::PathBuf,
    };

    fn ano_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(
            Message::AssistanceRecord(AssistanceRecord::new(0, 1, 23, 5, 1))
                .encode()
                .unwrap(),
        );
        bytes.extend(Message::PositionFix(PositionFix::default()).encode().unwrap());
        bytes.extend(
            Message::AssistanceRecord(AssistanceRecord::new(6, 2, 23, 5, 2))
                .encode()
                .unwrap(),
        );
        bytes
    }

    fn drain<R: Read>(file: &mut AnoFile<R>) -> Vec<AssistanceRecord> {
        let mut records = Vec::new();
        while let Some(record) = file.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn non_ano_frames_are_skipped() {
        let mut file = AnoFile::from_reader(Cursor::new(ano_bytes()));
        let records = drain(&mut file);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sv_id, 1);
        assert_eq!(records[1].gnss_id, 6);
        assert_eq!(file.skipped(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let mut bytes = frame(0x13, 0x20, &[0; 76]);
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);

        let mut file = AnoFile::from_reader(Cursor::new(bytes));
        assert!(matches!(
            file.next_record(),
            Err(SourceError::Decoding(DecodeError::Checksum))
        ));
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("anoloader-{}-{}", std::process::id(), name))
    }

    #[test]
    fn plain_and_gzip_files() {
        let plain = temp_path("mgaoffline.ubx");
        std::fs::write(&plain, ano_bytes()).unwrap();

        let gzip = temp_path("mgaoffline.ubx.gz");
        let mut encoder = GzEncoder::new(File::create(&gzip).unwrap(), Compression::new(5));
        encoder.write_all(&ano_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [&plain, &gzip] {
            let mut file = AnoFile::open(path).unwrap();
            assert_eq!(drain(&mut file).len(), 2);
        }

        let _ = std::fs::remove_file(plain);
        let _ = std::fs::remove_file(gzip);
    }

    #[test]
    fn missing_file() {
        let path = temp_path("does-not-exist.ubx");
        assert!(matches!(
            AnoFile::open(&path),
            Err(SourceError::Open { .. })
        ));
    }
}
