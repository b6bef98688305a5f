pub mod ram;
pub mod raw;

use std::io;

pub use ram::RamDisk;
pub use raw::RawDisk;

pub trait Info {
    fn disk_size(&self) -> u64;
    fn block_size(&self) -> u32;
}

pub trait Disk: io::Read + io::Seek + io::Write + Info {}
