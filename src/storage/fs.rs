// WearLog — Flash File Access
//
// `FlashFs` is the storage engine's view of the NOR chip: a flat directory of
// fixed-size files that are created once and written once.  `DirFs` backs it
// with `std::fs`; on the device that is the VFS mount of the external chip.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

pub trait FlashFs {
    /// Every file currently in the device directory.
    fn list(&mut self) -> io::Result<Vec<FileInfo>>;

    fn exists(&mut self, name: &str) -> io::Result<bool>;

    /// Allocate a new zero-filled file of exactly `size` bytes.  Fails if the
    /// name is already taken.
    fn create(&mut self, name: &str, size: usize) -> io::Result<()>;

    /// Write `data` from the start of an existing file.  `NotFound` means the
    /// file could not be opened.
    fn write(&mut self, name: &str, data: &[u8]) -> io::Result<()>;

    /// `false` while the chip is busy with a program/erase cycle.
    fn is_ready(&mut self) -> io::Result<bool>;

    /// One-line device summary for diagnostics.
    fn status(&mut self) -> String;
}

// ---------------------------------------------------------------------------
// std::fs backed implementation
// ---------------------------------------------------------------------------
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a mounted directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl FlashFs for DirFs {
    fn list(&mut self) -> io::Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            files.push(FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn exists(&mut self, name: &str) -> io::Result<bool> {
        match fs::metadata(self.path(name)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create(&mut self, name: &str, size: usize) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))?;
        file.set_len(size as u64)?;
        file.sync_all()
    }

    fn write(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(self.path(name))?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn is_ready(&mut self) -> io::Result<bool> {
        // The VFS driver completes program/erase cycles before returning.
        Ok(true)
    }

    fn status(&mut self) -> String {
        match self.list() {
            Ok(files) => {
                let used: u64 = files.iter().map(|f| f.size).sum();
                format!(
                    "{}: {} files, {} bytes allocated",
                    self.root.display(),
                    files.len(),
                    used
                )
            }
            Err(e) => format!("{}: unreadable ({})", self.root.display(), e),
        }
    }
}
