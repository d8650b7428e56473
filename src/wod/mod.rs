//! # WOD Store Module
//!
//! Append-only Whole Orbit Data log with size-bounded rollover.
//!
//! This module handles:
//! - Appending fixed-size records to the working WOD file
//! - Completing the file into the queue directory once it exceeds the size
//!   budget (a single `rename`, so the queue never shows a partial file)
//! - Reading WOD files back into records
//!
//! ## File Lifecycle
//!
//! ```text
//! EMPTY ──append──▶ APPENDING ──append──▶ APPENDING (over budget)
//!   ▲                                          │
//!   └──────────── roll_if_oversized ───────────┘
//! ```
//!
//! The store reports outcomes only. Counting failures and deciding when to
//! give up belongs to the scheduler.

pub mod file;
pub mod reader;

pub use file::{FsOpener, WodFile, WodFileOpener};
pub use reader::WodReader;

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::WodConfig;
use crate::error::Result;

/// Bytes per kilobyte for the size budget
pub const BYTES_PER_KB: f64 = 1024.0;

/// Result of a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Bytes the single write accepted
    pub bytes_written: usize,

    /// Size of the working file after the write
    pub file_size: u64,
}

impl AppendOutcome {
    /// Whether the whole record made it into the file
    pub fn is_complete(&self, expected: usize) -> bool {
        self.bytes_written == expected
    }
}

/// Working WOD file plus its rollover policy
pub struct WodStore {
    path: PathBuf,
    completed_dir: PathBuf,
    max_file_size_kb: f64,
    opener: Box<dyn WodFileOpener>,
    file: Option<Box<dyn WodFile>>,
    size: u64,
}

impl std::fmt::Debug for WodStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WodStore")
            .field("path", &self.path)
            .field("completed_dir", &self.completed_dir)
            .field("max_file_size_kb", &self.max_file_size_kb)
            .field("open", &self.file.is_some())
            .field("size", &self.size)
            .finish()
    }
}

impl WodStore {
    /// Create a store; nothing is opened until the first append
    ///
    /// # Arguments
    ///
    /// * `path` - Working file path
    /// * `completed_dir` - Destination for completed files, on the same filesystem
    /// * `max_file_size_kb` - Roll once the file grows beyond this many KB
    pub fn new(
        path: impl Into<PathBuf>,
        completed_dir: impl Into<PathBuf>,
        max_file_size_kb: f64,
    ) -> Self {
        Self {
            path: path.into(),
            completed_dir: completed_dir.into(),
            max_file_size_kb,
            opener: Box::new(FsOpener),
            file: None,
            size: 0,
        }
    }

    /// Open the working file through `opener` instead of the filesystem
    pub fn with_opener(mut self, opener: impl WodFileOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self.file = None;
        self
    }

    /// Create a store from the `[wod]` configuration section
    pub fn from_config(config: &WodConfig) -> Self {
        Self::new(config.wod_path(), config.completed_path(), config.max_file_size_kb)
    }

    /// Working file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory completed files are moved into
    pub fn completed_dir(&self) -> &Path {
        &self.completed_dir
    }

    /// Size of the working file as last seen by this store
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append one record with a single write
    ///
    /// # Returns
    ///
    /// * `Result<AppendOutcome>` - Bytes written and the new file size. A
    ///   short write is returned as `Ok` with `bytes_written` below the
    ///   record length; the caller decides what that costs.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, written or synced.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pacsat_telem::wod::WodStore;
    ///
    /// let mut store = WodStore::new("/tmp/wod", "/tmp/queue", 10.0);
    /// let outcome = store.append(&[0u8; 40])?;
    /// assert!(outcome.is_complete(40));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn append(&mut self, bytes: &[u8]) -> Result<AppendOutcome> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = self.opener.open_append(&self.path)?;
                self.size = file.size()?;
                debug!("Opened WOD file {} ({} bytes)", self.path.display(), self.size);
                file
            }
        };

        let bytes_written = file.append(bytes)?;
        self.size += bytes_written as u64;

        // A short write leaves the handle dropped so the next append reopens
        if bytes_written == bytes.len() {
            file.sync()?;
            self.file = Some(file);
        }

        Ok(AppendOutcome {
            bytes_written,
            file_size: self.size,
        })
    }

    /// Complete the working file if it has grown beyond the size budget
    ///
    /// # Returns
    ///
    /// * `Result<Option<PathBuf>>` - Where the file went, or `None` if it was
    ///   missing or still within budget
    ///
    /// # Errors
    ///
    /// Returns error if the queue directory cannot be created or the rename fails
    pub fn roll_if_oversized(&mut self) -> Result<Option<PathBuf>> {
        self.roll_if_oversized_at(Utc::now())
    }

    /// Same as [`WodStore::roll_if_oversized`], naming the file after `now`
    pub fn roll_if_oversized_at(&mut self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !self.exceeds_budget(size) {
            return Ok(None);
        }

        self.file = None;
        fs::create_dir_all(&self.completed_dir)?;

        let destination = self.completed_name(now);
        fs::rename(&self.path, &destination)?;
        self.size = 0;

        info!(
            "Rolled WOD file {} ({:.1} KB) to {}",
            self.path.display(),
            size as f64 / BYTES_PER_KB,
            destination.display()
        );

        Ok(Some(destination))
    }

    fn exceeds_budget(&self, size: u64) -> bool {
        size as f64 > self.max_file_size_kb * BYTES_PER_KB
    }

    /// Pick a name in the queue directory that no completed file uses yet
    fn completed_name(&self, now: DateTime<Utc>) -> PathBuf {
        let stem = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wod".to_string());
        let base = format!("{}_{}", stem, now.format("%Y%m%d_%H%M%S"));

        let mut candidate = self.completed_dir.join(&base);
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self.completed_dir.join(format!("{}_{}", base, suffix));
            suffix += 1;
        }
        candidate
    }
}
