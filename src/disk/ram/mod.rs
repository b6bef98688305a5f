use crate::disk::{Disk, Info};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

pub struct RamDisk {
    buffer: Cursor<Vec<u8>>,
    sector_size: u32,
}

impl RamDisk {
    pub fn new_zeroed(sector_size: u32, num_sectors: u32) -> Self {
        let size_in_bytes = sector_size as usize * num_sectors as usize;
        let buffer = vec![0u8; size_in_bytes];

        Self {
            buffer: Cursor::new(buffer),
            sector_size,
        }
    }

    pub fn from_vec(vector: Vec<u8>, sector_size: u32) -> Self {
        assert_eq!(vector.len() % sector_size as usize, 0);

        Self {
            buffer: Cursor::new(vector),
            sector_size,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.get_ref()
    }
}

impl Read for RamDisk {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Seek for RamDisk {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Write for RamDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl Info for RamDisk {
    fn disk_size(&self) -> u64 {
        self.buffer.get_ref().len() as u64
    }
    fn block_size(&self) -> u32 {
        self.sector_size
    }
}

impl Disk for RamDisk {}
