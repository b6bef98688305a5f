use std::{io, result};

use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("cannot mount volume: {0}")]
    Mount(String),
    #[error("invalid BPB")]
    InvalidBpb,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("file is already open")]
    AlreadyOpen,
    #[error("file is not open")]
    NotOpen,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("file is open")]
    FileBusy,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("offset out of bounds")]
    OutOfBounds,
    #[error("no free clusters left on volume")]
    NoSpace,
    #[error("file is not open for reading")]
    NotOpenForReading,
    #[error("file is not open for writing")]
    NotOpenForWriting,
    #[error("buffer allocation failed")]
    AllocationFailure,
}
