//! Open WOD file handle, behind a trait so partial writes can be exercised

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// An open working file in append mode
pub trait WodFile: Send {
    /// Issue a single write; may accept fewer bytes than offered
    fn append(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Push written data to the storage device
    fn sync(&mut self) -> io::Result<()>;

    /// Current length of the file
    fn size(&self) -> io::Result<u64>;
}

/// Opens (creating if needed) the working file for appending
pub trait WodFileOpener: Send {
    fn open_append(&mut self, path: &Path) -> io::Result<Box<dyn WodFile>>;
}

impl WodFile for File {
    fn append(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.write(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// Opens real files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOpener;

impl WodFileOpener for FsOpener {
    fn open_append(&mut self, path: &Path) -> io::Result<Box<dyn WodFile>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }
}
