// src/session/csv_log.rs

use chrono::{DateTime, NaiveDateTime};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "datetime,elapsed_seconds,co2_ppm";
pub const EMERGENCY_MARKER: &str = "# EMERGENCY_SHUTDOWN - Power Failure Detected";

const DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";
// Far more than one row; only the end of a file is read when looking for the last record.
const TAIL_BYTES: u64 = 4096;

/// One line of a session file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvRecord {
    /// Unix seconds, rendered as `YYYYMMDDHHMMSS` UTC.
    pub timestamp: i64,
    pub elapsed_seconds: u64,
    pub co2_ppm: u16,
}

impl CsvRecord {
    pub fn to_line(&self) -> String {
        let datetime = DateTime::from_timestamp(self.timestamp, 0).unwrap_or(DateTime::UNIX_EPOCH);
        format!(
            "{},{},{}\n",
            datetime.format(DATETIME_FORMAT),
            self.elapsed_seconds,
            self.co2_ppm
        )
    }

    /// Parses one data row, without its line terminator. The header, marker
    /// lines and anything malformed give `None`.
    pub fn parse_line(line: &str) -> Option<CsvRecord> {
        let mut fields = line.trim_end_matches('\r').split(',');
        let datetime = NaiveDateTime::parse_from_str(fields.next()?, DATETIME_FORMAT).ok()?;
        let elapsed_seconds = fields.next()?.parse().ok()?;
        let co2_ppm = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(CsvRecord { timestamp: datetime.and_utc().timestamp(), elapsed_seconds, co2_ppm })
    }
}

/// Last complete data row of a session file, if it has one.
///
/// A trailing line without its newline is a write cut short by power loss and
/// is ignored.
pub fn last_record<P: AsRef<Path>>(path: P) -> io::Result<Option<CsvRecord>> {
    let mut file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    let tail = String::from_utf8_lossy(&tail);

    let complete = match tail.rfind('\n') {
        Some(end) => &tail[..end],
        None => return Ok(None),
    };
    let mut lines: Vec<&str> = complete.split('\n').collect();
    if start > 0 && !lines.is_empty() {
        // The first line may start mid-row.
        lines.remove(0);
    }
    Ok(lines.into_iter().rev().find_map(CsvRecord::parse_line))
}

/// An append-only CSV session file.
///
/// Every append is flushed to stable storage before it returns.
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    file: File,
}

impl CsvLog {
    /// Opens `path` for appending, creating it (and its directory) if needed.
    /// The header is written only when the file is empty.
    pub fn open<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
            file.sync_data()?;
            debug!("Created session file {:?}", path);
        } else {
            debug!("Appending to existing session file {:?}", path);
        }
        Ok(CsvLog { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &CsvRecord) -> io::Result<()> {
        self.file.write_all(record.to_line().as_bytes())?;
        self.file.sync_data()
    }

    /// Appends a `#` comment line such as [`EMERGENCY_MARKER`].
    pub fn append_marker(&mut self, marker: &str) -> io::Result<()> {
        writeln!(self.file, "{}", marker)?;
        self.file.sync_data()
    }

    /// Flushes and closes the file.
    pub fn close(self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_line() {
        let record = CsvRecord { timestamp: 1_735_689_605, elapsed_seconds: 5, co2_ppm: 612 };
        assert_eq!(record.to_line(), "20250101000005,5,612\n");
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/a.csv");

        let mut log = CsvLog::open(&path).unwrap();
        log.append(&CsvRecord { timestamp: 1_735_689_600, elapsed_seconds: 0, co2_ppm: 400 }).unwrap();
        log.close().unwrap();

        let mut log = CsvLog::open(&path).unwrap();
        log.append(&CsvRecord { timestamp: 1_735_689_605, elapsed_seconds: 5, co2_ppm: 401 }).unwrap();
        log.append_marker(EMERGENCY_MARKER).unwrap();
        log.close().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "datetime,elapsed_seconds,co2_ppm\n\
             20250101000000,0,400\n\
             20250101000005,5,401\n\
             # EMERGENCY_SHUTDOWN - Power Failure Detected\n"
        );
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            CsvRecord::parse_line("20250101000005,5,612"),
            Some(CsvRecord { timestamp: 1_735_689_605, elapsed_seconds: 5, co2_ppm: 612 })
        );
        assert_eq!(CsvRecord::parse_line(CSV_HEADER), None);
        assert_eq!(CsvRecord::parse_line(EMERGENCY_MARKER), None);
        assert_eq!(CsvRecord::parse_line("20250101000005,5"), None);
        assert_eq!(CsvRecord::parse_line("20250101000005,5,612,9"), None);
    }

    #[test]
    fn test_last_record_skips_marker_and_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.csv");
        fs::write(
            &path,
            "datetime,elapsed_seconds,co2_ppm\n\
             20250101000000,0,400\n\
             20250101000005,5,401\n\
             # EMERGENCY_SHUTDOWN - Power Failure Detected\n\
             2025010100001",
        )
        .unwrap();
        assert_eq!(
            last_record(&path).unwrap(),
            Some(CsvRecord { timestamp: 1_735_689_605, elapsed_seconds: 5, co2_ppm: 401 })
        );
    }

    #[test]
    fn test_last_record_of_long_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let mut log = CsvLog::open(&path).unwrap();
        for i in 0..2000u64 {
            log.append(&CsvRecord { timestamp: 1_735_689_600 + i as i64, elapsed_seconds: i, co2_ppm: 400 }).unwrap();
        }
        log.close().unwrap();
        assert_eq!(last_record(&path).unwrap().map(|r| r.elapsed_seconds), Some(1999));

        let empty = dir.path().join("e.csv");
        CsvLog::open(&empty).unwrap().close().unwrap();
        assert_eq!(last_record(&empty).unwrap(), None);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.csv");
        fs::write(&path, "").unwrap();
        CsvLog::open(&path).unwrap().close().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "datetime,elapsed_seconds,co2_ppm\n");
    }
}
