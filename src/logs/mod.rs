//! # Channel Log Module
//!
//! Binary per-channel log files and the multi-destination sink feeding
//! them.
//!
//! This module handles:
//! - Creating one timestamped session directory per configured log root
//! - Duplicating every log stream into all roots at once
//! - The `[timestamp][payload]` record format shared by all channels

pub mod record;

pub use record::{RecordReader, RecordWriter};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::error::Result;

/// Duplicates every write to a set of underlying streams
pub struct MultiWriter {
    streams: Vec<Box<dyn Write + Send>>,
}

impl MultiWriter {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
        }
    }

    pub fn add(&mut self, stream: Box<dyn Write + Send>) {
        self.streams.push(stream);
    }
}

impl Default for MultiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for stream in &mut self.streams {
            stream.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for stream in &mut self.streams {
            stream.flush()?;
        }
        Ok(())
    }
}

/// Multi-destination log sink
///
/// Each session gets a fresh `yyyyMMddHHmmss` subdirectory under every
/// configured root; `create` opens the same file name in all of them.
pub struct LogSink {
    directories: Vec<PathBuf>,
}

impl LogSink {
    /// Create the session directories under every root
    ///
    /// # Errors
    ///
    /// Returns error if any directory cannot be created.
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Result<Self> {
        let session = Local::now().format("%Y%m%d%H%M%S").to_string();

        let mut directories = Vec::new();
        for root in roots {
            let dir = root.into().join(&session);
            fs::create_dir_all(&dir)?;
            info!("Logging to {}", dir.display());
            directories.push(dir);
        }
        Ok(Self { directories })
    }

    /// Open `filename` in every session directory as one combined stream
    pub fn create(&self, filename: &str) -> Result<MultiWriter> {
        let mut writer = MultiWriter::new();
        for dir in &self.directories {
            let file = File::create(dir.join(filename))?;
            writer.add(Box::new(BufWriter::new(file)));
        }
        Ok(writer)
    }

    /// Open a timestamped record writer for one channel
    pub fn create_record_log(&self, filename: &str) -> Result<RecordWriter<MultiWriter>> {
        Ok(RecordWriter::new(self.create(filename)?))
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_multi_writer_duplicates_bytes() {
        let mut writer = MultiWriter::new();
        let a: Vec<u8> = Vec::new();
        let b: Vec<u8> = Vec::new();
        // Box the vectors behind cursors we can inspect via shared state
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let first = SharedBuf(Arc::new(Mutex::new(a)));
        let second = SharedBuf(Arc::new(Mutex::new(b)));
        writer.add(Box::new(first.clone()));
        writer.add(Box::new(second.clone()));

        writer.write_all(&[1, 2, 3]).unwrap();
        writer.flush().unwrap();

        assert_eq!(*first.0.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(*second.0.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_sink_duplicates_into_every_root() {
        let root_a = tempfile::tempdir().unwrap();
        let root_b = tempfile::tempdir().unwrap();

        let sink = LogSink::new([root_a.path().to_path_buf(), root_b.path().to_path_buf()])
            .unwrap();
        assert_eq!(sink.directories().len(), 2);

        let mut stream = sink.create("status.log").unwrap();
        stream.write_all(b"hello").unwrap();
        stream.flush().unwrap();

        for dir in sink.directories() {
            let mut contents = String::new();
            File::open(dir.join("status.log"))
                .unwrap()
                .read_to_string(&mut contents)
                .unwrap();
            assert_eq!(contents, "hello");
        }
    }

    #[test]
    fn test_record_log_round_trip_through_sink() {
        let root = tempfile::tempdir().unwrap();
        let sink = LogSink::new([root.path().to_path_buf()]).unwrap();

        let mut log = sink.create_record_log("A0.log").unwrap();
        log.write_record_with(|buf| record::encode_analog_sample(buf, 512.0))
            .unwrap();
        log.flush().unwrap();

        let path = sink.directories()[0].join("A0.log");
        let file = File::open(path).unwrap();
        let mut reader = RecordReader::new(file);
        let (_, payload) = reader
            .read_record(record::ANALOG_PAYLOAD_LEN)
            .unwrap()
            .unwrap();
        assert_eq!(f32::from_be_bytes(payload.try_into().unwrap()), 512.0);
    }
}
