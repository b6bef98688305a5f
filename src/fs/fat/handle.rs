use super::dir::DirEntry;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const MAX_OPEN_FILES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    #[inline]
    pub fn can_read(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    #[inline]
    pub fn can_write(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

impl FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "-r" => Ok(OpenMode::Read),
            "-w" => Ok(OpenMode::Write),
            "-rw" | "-wr" => Ok(OpenMode::ReadWrite),
            _ => Err(format!("unknown mode {:?}, expected -r, -w, -rw or -wr", s)),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::ReadWrite => "rw",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl FromStr for Whence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "set" => Ok(Whence::Start),
            "cur" => Ok(Whence::Current),
            "end" => Ok(Whence::End),
            _ => Err(format!("unknown whence {:?}, expected set, cur or end", s)),
        }
    }
}

/// One open file. Carries a *copy* of the directory entry plus the byte
/// offset of the slot it was read from; size or cluster changes are
/// written back through that offset explicitly, the table never aliases
/// the directory store.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub(crate) entry: DirEntry,
    pub(crate) slot_offset: u64,
    pub(crate) mode: OpenMode,
    pub(crate) cursor: u32,
}

impl OpenFile {
    pub(crate) fn new(entry: DirEntry, slot_offset: u64, mode: OpenMode) -> Self {
        Self {
            entry,
            slot_offset,
            mode,
            cursor: 0,
        }
    }

    pub fn name(&self) -> String {
        self.entry.display_name()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn size(&self) -> u32 {
        self.entry.size
    }
}

/// Fixed-capacity registry of open handles, keyed by the 11-byte short
/// name of the entry.
pub struct OpenFileTable {
    files: Vec<OpenFile>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    fn position(&self, name: &[u8; 11]) -> Option<usize> {
        self.files.iter().position(|f| f.entry.matches(name))
    }

    pub fn is_open(&self, name: &[u8; 11]) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &[u8; 11]) -> Option<&OpenFile> {
        self.position(name).map(|i| &self.files[i])
    }

    pub fn get_mut(&mut self, name: &[u8; 11]) -> Option<&mut OpenFile> {
        self.position(name).map(move |i| &mut self.files[i])
    }

    pub fn insert(&mut self, file: OpenFile) -> Result<()> {
        if self.is_open(&file.entry.name) {
            return Err(Error::AlreadyOpen);
        }
        if self.files.len() >= MAX_OPEN_FILES {
            return Err(Error::TooManyOpenFiles);
        }
        self.files.push(file);
        Ok(())
    }

    /// Removal order among remaining handles does not matter.
    pub fn remove(&mut self, name: &[u8; 11]) -> Result<OpenFile> {
        match self.position(name) {
            Some(i) => Ok(self.files.swap_remove(i)),
            None => Err(Error::NotOpen),
        }
    }

    pub fn as_slice(&self) -> &[OpenFile] {
        &self.files
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
