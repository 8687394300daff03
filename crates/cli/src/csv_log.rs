//! Per-day CSV log of generated images

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

/// One generated image. Field order is the column order.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRow {
    pub filename: String,
    pub template: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub width: u32,
    pub height: u32,
    pub image_size_bytes: usize,
    /// Seconds, two decimals
    pub generation_time_seconds: String,
    pub timestamp: String,
}

pub struct GenerationLog {
    path: PathBuf,
}

impl GenerationLog {
    /// `generation_log_<day>.csv` inside `dir`
    pub fn for_day(dir: &Path, day: &str) -> Self {
        Self {
            path: dir.join(format!("generation_log_{day}.csv")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `row`, writing the header first when the file is new.
    pub fn append(&self, row: &GenerationRow) -> Result<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(filename: &str, prompt: &str) -> GenerationRow {
        GenerationRow {
            filename: filename.into(),
            template: "abstract_art".into(),
            positive_prompt: prompt.into(),
            negative_prompt: "blurry, low quality".into(),
            seed: 42,
            steps: 30,
            cfg: 5.45,
            width: 1024,
            height: 768,
            image_size_bytes: 123_456,
            generation_time_seconds: "12.34".into(),
            timestamp: "2025-01-27 10:00:00".into(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = GenerationLog::for_day(dir.path(), "20250127");
        assert!(log.path().ends_with("generation_log_20250127.csv"));

        log.append(&row("a_0001.png", "red fox, snow")).unwrap();
        log.append(&row("a_0002.png", "teal heron")).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("filename,template,positive_prompt,negative_prompt,seed"));
        assert!(lines[0].ends_with("generation_time_seconds,timestamp"));
        assert!(lines[1].contains("\"red fox, snow\""));
        assert!(lines[2].starts_with("a_0002.png,abstract_art,teal heron"));
    }

    #[test]
    fn test_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = GenerationLog::for_day(dir.path(), "20250128");
        log.append(&row("b_0001.png", "lighthouse, \"quoted\" fog")).unwrap();

        let mut reader = csv::Reader::from_path(log.path()).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][2], "lighthouse, \"quoted\" fog");
        assert_eq!(&records[0][4], "42");
        assert_eq!(&records[0][10], "12.34");
    }
}
