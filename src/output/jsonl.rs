//! Append-only JSON lines record store
//!
//! One [`DetailRecord`] per line. Every append writes one complete line and
//! syncs it before returning. Opening an existing store rebuilds the id index
//! and repairs a torn trailing line left by a crash mid-append.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{ExportRow, OutputError, OutputResult, RecordSink};
use crate::{DetailRecord, MatchId};

/// JSON lines sink keyed by match id
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    ids: HashSet<MatchId>,
    len_bytes: u64,
}

impl JsonlSink {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    /// I/O failures, or a corrupt line anywhere but at the end of the file.
    pub fn open<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| OutputError::IoError(format!("Failed to open {}: {e}", path.display())))?;

        let (ids, valid_len, torn) = scan(&path, &file)?;
        let mut sink = Self {
            path,
            file,
            ids,
            len_bytes: valid_len,
        };

        match torn {
            Some(TornTail::Unterminated) => {
                sink.write_bytes(b"\n")?;
                sink.sync()?;
                debug!(path = %sink.path.display(), "Terminated final record line");
            }
            Some(TornTail::Garbage { bytes }) => {
                sink.truncate_to(valid_len)?;
                warn!(
                    path = %sink.path.display(),
                    discarded_bytes = bytes,
                    "Discarded torn trailing line from interrupted append"
                );
            }
            None => {}
        }

        info!(
            path = %sink.path.display(),
            records = sink.ids.len(),
            "Record store opened"
        );
        Ok(sink)
    }

    /// Store path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> OutputResult<()> {
        match self.file.write_all(bytes) {
            Ok(()) => {
                self.len_bytes += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Never leave a partial line for the next append to extend
                let _ = self.file.set_len(self.len_bytes);
                Err(OutputError::IoError(format!(
                    "Failed to append to {}: {e}",
                    self.path.display()
                )))
            }
        }
    }

    fn sync(&mut self) -> OutputResult<()> {
        self.file
            .sync_data()
            .map_err(|e| OutputError::IoError(format!("Failed to sync {}: {e}", self.path.display())))
    }

    fn truncate_to(&mut self, len: u64) -> OutputResult<()> {
        self.file
            .set_len(len)
            .map_err(|e| OutputError::IoError(format!("Failed to truncate: {e}")))?;
        self.len_bytes = len;
        self.sync()
    }
}

enum TornTail {
    /// A complete record missing only its newline
    Unterminated,
    /// An undecodable fragment
    Garbage { bytes: u64 },
}

fn scan(path: &Path, file: &File) -> OutputResult<(HashSet<MatchId>, u64, Option<TornTail>)> {
    let mut reader = BufReader::new(file);
    let mut ids = HashSet::new();
    let mut offset = 0u64;
    let mut line_no = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| OutputError::IoError(format!("Failed to read {}: {e}", path.display())))?;
        if read == 0 {
            return Ok((ids, offset, None));
        }
        line_no += 1;
        let terminated = buf.last() == Some(&b'\n');
        let content = if terminated { &buf[..buf.len() - 1] } else { &buf[..] };

        if content.iter().all(u8::is_ascii_whitespace) {
            offset += read as u64;
            continue;
        }

        match serde_json::from_slice::<DetailRecord>(content) {
            Ok(record) => {
                ids.insert(record.id);
                if !terminated {
                    return Ok((ids, offset + read as u64, Some(TornTail::Unterminated)));
                }
                offset += read as u64;
            }
            Err(_) if !terminated => {
                return Ok((ids, offset, Some(TornTail::Garbage { bytes: read as u64 })));
            }
            Err(e) => {
                return Err(OutputError::Corrupt {
                    path: path.display().to_string(),
                    line: line_no,
                    reason: e.to_string(),
                });
            }
        }
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &DetailRecord) -> OutputResult<bool> {
        if self.ids.contains(&record.id) {
            debug!(id = %record.id, "Record already stored, skipping append");
            return Ok(false);
        }

        let mut line = serde_json::to_vec(record)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        self.write_bytes(&line)?;
        self.sync()?;
        self.ids.insert(record.id.clone());
        Ok(true)
    }

    fn contains(&self, id: &MatchId) -> bool {
        self.ids.contains(id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn export_snapshot(&self) -> OutputResult<Vec<ExportRow>> {
        let file = File::open(&self.path)
            .map_err(|e| OutputError::IoError(format!("Failed to open {}: {e}", self.path.display())))?;
        let mut rows = Vec::with_capacity(self.ids.len());
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| OutputError::IoError(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DetailRecord =
                serde_json::from_str(&line).map_err(|e| OutputError::Corrupt {
                    path: self.path.display().to_string(),
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            rows.push(ExportRow::from(&record));
        }
        Ok(rows)
    }
}
