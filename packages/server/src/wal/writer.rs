//! Framed append-only log writer.
//!
//! One record per line, in the text format of
//! [`LogRecord::encode`](creek_core::LogRecord::encode). `append`
//! buffers; `flush` pushes the buffered prefix to the OS and syncs it
//! to storage. Under Strong write consistency the partition flushes
//! after every append; under Eventual a 5-second ticker flushes.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use creek_core::LogRecord;

/// Append-only writer for one partition's commit log.
///
/// The partition lock already serializes appends, so the internal
/// mutex is redundant on the write path; it exists so the flush ticker
/// can run without taking the partition lock.
pub struct LogWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl LogWriter {
    /// Opens (creating if absent) the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Buffers one framed record.
    ///
    /// Returns only after the record is buffered for write. An error is
    /// fatal for the caller's operation: the write must not be
    /// acknowledged, applied, or replicated.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the write fails.
    pub fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(record.encode().as_bytes())?;
        file.write_all(b"\n")
    }

    /// Flushes buffered records and syncs them to storage.
    ///
    /// After a successful return the written prefix is durable.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the flush or sync fails.
    pub fn flush(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_data()
    }

    /// Path of the log file, as used by recovery.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use creek_core::Op;

    use super::*;

    fn record(version: u64, op: Op, args: &[&str]) -> LogRecord {
        LogRecord::new(
            1_000_000_000,
            version,
            op,
            args.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    #[test]
    fn appends_one_framed_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.log");
        let writer = LogWriter::open(&path).unwrap();

        writer.append(&record(1, Op::Set, &["a", "b", "-1"])).unwrap();
        writer.append(&record(2, Op::Delete, &["a"])).unwrap();
        writer.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "1000000000 1 SET a b -1\n1000000000 2 DELETE a\n"
        );
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.log");

        {
            let writer = LogWriter::open(&path).unwrap();
            writer.append(&record(1, Op::Set, &["a", "b", "-1"])).unwrap();
            writer.flush().unwrap();
        }
        {
            let writer = LogWriter::open(&path).unwrap();
            writer.append(&record(2, Op::Set, &["c", "d", "-1"])).unwrap();
            writer.flush().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with("2 SET c d -1\n"));
    }

    #[test]
    fn appended_lines_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.log");
        let writer = LogWriter::open(&path).unwrap();

        let original = record(7, Op::Expire, &["k", "60"]);
        writer.append(&original).unwrap();
        writer.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed = LogRecord::parse(contents.trim_end()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn path_accessor_reports_log_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit.log");
        let writer = LogWriter::open(&path).unwrap();
        assert_eq!(writer.path(), path.as_path());
    }
}
