// src/session/files.rs

//! Inspection of the session files in a log directory.

use super::csv_log::CsvRecord;
use super::filename::continuation_index;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A CSV data file found in the log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub name: String,
    pub path: PathBuf,
    /// Number of data rows. Header and marker lines are not counted.
    pub records: u64,
}

/// Every `.csv` file in `log_dir`, sorted by name, with its row count.
///
/// Hidden files (the state record among them) are skipped. Because session
/// names start with their start time, name order is also start order.
pub fn list_data_files<P: AsRef<Path>>(log_dir: P) -> io::Result<Vec<DataFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') || !name.ends_with(".csv") || !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let records = count_records(&path)?;
        files.push(DataFile { name, path, records });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// The files of one session, base file first, then continuations in order.
/// Continuations that were never created are simply absent.
pub fn session_files<P: AsRef<Path>>(log_dir: P, base: &str) -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<(u16, PathBuf)> = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let index = match entry.file_name().to_str() {
            Some(name) => continuation_index(base, name),
            None => None,
        };
        if let Some(index) = index {
            found.push((index, entry.path()));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn count_records(path: &Path) -> io::Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = 0;
    for line in reader.lines() {
        if CsvRecord::parse_line(&line?).is_some() {
            records += 1;
        }
    }
    Ok(records)
}
