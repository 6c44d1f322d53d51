// src/session/filename.rs

use chrono::DateTime;

/// Suffix of every base session file name.
pub const SESSION_SUFFIX: &str = "_session.csv";

/// Base file name for a session started at `start_time` (Unix seconds, UTC):
/// `YYYYMMDD_HHMMSS_session.csv`.
pub fn session_filename(start_time: i64) -> String {
    let start = DateTime::from_timestamp(start_time, 0).unwrap_or(DateTime::UNIX_EPOCH);
    format!("{}{}", start.format("%Y%m%d_%H%M%S"), SESSION_SUFFIX)
}

/// File name of continuation `n` of a session whose first file is `base`.
///
/// `n == 0` is the base file itself. Otherwise a three-digit counter goes in
/// front of a `.csv` extension, or at the end when there is none:
/// `a.csv` → `a_001.csv`, `a` → `a_001`.
pub fn continuation_filename(base: &str, n: u16) -> String {
    if n == 0 {
        return base.to_string();
    }
    match base.strip_suffix(".csv") {
        Some(stem) => format!("{}_{:03}.csv", stem, n),
        None => format!("{}_{:03}", base, n),
    }
}

/// Inverse of [`continuation_filename`]: which continuation of `base` the
/// file `name` is, if any.
pub fn continuation_index(base: &str, name: &str) -> Option<u16> {
    if name == base {
        return Some(0);
    }
    let (stem, ext) = match base.strip_suffix(".csv") {
        Some(stem) => (stem, ".csv"),
        None => (base, ""),
    };
    let digits = name.strip_prefix(stem)?.strip_prefix('_')?.strip_suffix(ext)?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u16 = digits.parse().ok()?;
    // Rejects spellings such as `_0001` that the forward mapping never produces.
    (n > 0 && continuation_filename(base, n) == name).then_some(n)
}
