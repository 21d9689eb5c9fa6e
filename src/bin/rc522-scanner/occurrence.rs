//! Append-only log of every card read

use chrono::{DateTime, Utc};
use rc522_scanner::Uid;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

const HEADER: &str = "Date,Time,Tag";

/// CSV file with one `date,time,tag` row per successful read
pub struct OccurrenceLog {
    file: File,
}

impl OccurrenceLog {
    /// Open `path` for appending, writing the header if the file is new
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", HEADER)?;
        }
        Ok(Self { file })
    }

    pub fn record(&mut self, uid: &Uid) -> io::Result<()> {
        let row = format_row(Utc::now(), uid);
        writeln!(self.file, "{}", row)?;
        self.file.flush()
    }
}

fn format_row(at: DateTime<Utc>, uid: &Uid) -> String {
    format!(
        "{},{},{}",
        at.format("%Y-%m-%d"),
        at.format("%H:%M:%S"),
        uid.to_tag_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_row() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let uid = Uid::from_response(&[170, 187, 204, 221, 170 ^ 187 ^ 204 ^ 221]).unwrap();
        assert_eq!(format_row(at, &uid), "2024-03-09,07:05:01,170-187-204-221-0");
    }
}
