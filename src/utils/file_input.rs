//! File input utilities for reading task payloads
//!
//! Payload files are plain text with one payload per line. Blank lines and
//! `#` comments are skipped; duplicates can optionally be dropped.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// File input handler for payload list files
pub struct FileInputHandler {
    max_payloads: usize,
    deduplicate: bool,
}

/// File input statistics
#[derive(Debug, Clone)]
pub struct FileInputStats {
    pub total_lines: usize,
    pub valid_payloads: usize,
    pub skipped_lines: usize,
    pub duplicates_removed: usize,
}

impl Default for FileInputHandler {
    fn default() -> Self {
        Self {
            max_payloads: 100_000,
            deduplicate: false,
        }
    }
}

impl FileInputHandler {
    /// Create a new file input handler
    pub fn new(max_payloads: usize, deduplicate: bool) -> Self {
        Self {
            max_payloads,
            deduplicate,
        }
    }

    /// Read payloads from a plain text file, one per line
    pub fn read_payloads_from_file<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Vec<String>, FileInputStats)> {
        let file = File::open(&file_path)
            .with_context(|| format!("Failed to open file: {:?}", file_path.as_ref()))?;

        let reader = BufReader::new(file);
        let mut payloads = Vec::new();
        let mut seen = HashSet::new();
        let mut stats = FileInputStats {
            total_lines: 0,
            valid_payloads: 0,
            skipped_lines: 0,
            duplicates_removed: 0,
        };

        for line in reader.lines() {
            stats.total_lines += 1;

            if payloads.len() >= self.max_payloads {
                log::warn!(
                    "Payload limit of {} reached, ignoring the rest of the file",
                    self.max_payloads
                );
                break;
            }

            let line = line.context("Failed to read line")?;
            let payload = line.trim();

            // Skip empty lines and comments
            if payload.is_empty() || payload.starts_with('#') {
                stats.skipped_lines += 1;
                continue;
            }

            if self.deduplicate {
                if seen.contains(payload) {
                    stats.duplicates_removed += 1;
                    continue;
                }
                seen.insert(payload.to_string());
            }

            payloads.push(payload.to_string());
            stats.valid_payloads += 1;
        }

        Ok((payloads, stats))
    }
}

/// Convenience function: read payloads with default settings
pub fn payloads_from_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<String>> {
    let handler = FileInputHandler::default();
    let (payloads, stats) = handler.read_payloads_from_file(file_path)?;

    log::info!(
        "Loaded {} payloads ({} lines read, {} skipped)",
        stats.valid_payloads,
        stats.total_lines,
        stats.skipped_lines
    );

    Ok(payloads)
}
