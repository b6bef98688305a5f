use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read, Write};

/// FAT32 boot sector. Every field is kept so `encode` reproduces the
/// sector byte for byte.
pub struct BpbFat32 {
    pub jump: [u8; 3],
    pub oem_id: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub number_of_reserved_sectors: u16,
    pub number_of_fats: u8,
    pub number_of_directory_entries: u16,
    pub media_descriptor: u8,
    pub sectors_per_track: u16,
    pub number_of_heads: u16,
    pub number_of_hidden_sectors: u32,
    pub sectors_total_16: u16,
    pub sectors_total_32: u32,
    pub sectors_per_fat: u32,
    pub flags: u16,
    pub fat_version: u16,
    pub root_directory_cluster: u32,
    pub fsinfo_lba: u16,
    pub backup_bs_lba: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub winnt_flags: u8,
    pub signature: u8,
    pub serial: [u8; 4],
    pub label: [u8; 11],
    pub identifier: [u8; 8],
    pub boot_code: [u8; 420],
}

impl BpbFat32 {
    pub const SIZE: usize = 512;

    /// FAT32 puts the sector count in the 32-bit field, but some
    /// formatters still use the 16-bit one for small volumes.
    pub fn total_sectors(&self) -> u32 {
        if self.sectors_total_16 != 0 {
            self.sectors_total_16 as u32
        } else {
            self.sectors_total_32
        }
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        debug_assert_eq!(buffer.len(), Self::SIZE);

        let mut reader = Cursor::new(buffer);

        macro_rules! read {
            (array($size:expr)) => {{
                let mut a = [0u8; $size];
                reader.read_exact(&mut a)?;
                a
            }};
            (u8) => {
                reader.read_u8()?
            };
            (u16) => {
                reader.read_u16::<LittleEndian>()?
            };
            (u32) => {
                reader.read_u32::<LittleEndian>()?
            };
        }

        let jump = read!(array(3));
        let oem_id = read!(array(8));
        let bytes_per_sector = read!(u16);
        let sectors_per_cluster = read!(u8);
        let number_of_reserved_sectors = read!(u16);
        let number_of_fats = read!(u8);
        let number_of_directory_entries = read!(u16);
        let sectors_total_16 = read!(u16);
        let media_descriptor = read!(u8);
        let _fat_size_16 = read!(u16);
        let sectors_per_track = read!(u16);
        let number_of_heads = read!(u16);
        let number_of_hidden_sectors = read!(u32);
        let sectors_total_32 = read!(u32);
        let sectors_per_fat = read!(u32);
        let flags = read!(u16);
        let fat_version = read!(u16);
        let root_directory_cluster = read!(u32);
        let fsinfo_lba = read!(u16);
        let backup_bs_lba = read!(u16);
        let reserved = read!(array(12));
        let drive_number = read!(u8);
        let winnt_flags = read!(u8);
        let signature = read!(u8);
        let serial = read!(array(4));
        let label = read!(array(11));
        let identifier = read!(array(8));
        let boot_code = read!(array(420));
        let bs_signature = read!(u16);
        if bs_signature != 0xAA55 {
            return Err(Error::InvalidBpb);
        }

        debug_assert_eq!(reader.position(), Self::SIZE as u64);

        Ok(Self {
            jump,
            oem_id,
            bytes_per_sector,
            sectors_per_cluster,
            number_of_reserved_sectors,
            number_of_fats,
            number_of_directory_entries,
            media_descriptor,
            sectors_per_track,
            number_of_heads,
            number_of_hidden_sectors,
            sectors_total_16,
            sectors_total_32,
            sectors_per_fat,
            flags,
            fat_version,
            root_directory_cluster,
            fsinfo_lba,
            backup_bs_lba,
            reserved,
            drive_number,
            winnt_flags,
            signature,
            serial,
            label,
            identifier,
            boot_code,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), Self::SIZE);

        let mut cursor = Cursor::new(buf);

        macro_rules! write {
            ($data:expr, array) => {
                cursor.write_all($data)?
            };
            ($data:expr, u8) => {
                cursor.write_u8($data)?
            };
            ($data:expr, u16) => {
                cursor.write_u16::<LittleEndian>($data)?
            };
            ($data:expr, u32) => {
                cursor.write_u32::<LittleEndian>($data)?
            };
        }

        write!(&self.jump, array);
        write!(&self.oem_id, array);
        write!(self.bytes_per_sector, u16);
        write!(self.sectors_per_cluster, u8);
        write!(self.number_of_reserved_sectors, u16);
        write!(self.number_of_fats, u8);
        write!(self.number_of_directory_entries, u16);
        write!(self.sectors_total_16, u16);
        write!(self.media_descriptor, u8);
        write!(0u16, u16); // FAT size, 16-bit variant
        write!(self.sectors_per_track, u16);
        write!(self.number_of_heads, u16);
        write!(self.number_of_hidden_sectors, u32);
        write!(self.sectors_total_32, u32);
        write!(self.sectors_per_fat, u32);
        write!(self.flags, u16);
        write!(self.fat_version, u16);
        write!(self.root_directory_cluster, u32);
        write!(self.fsinfo_lba, u16);
        write!(self.backup_bs_lba, u16);
        write!(&self.reserved, array);
        write!(self.drive_number, u8);
        write!(self.winnt_flags, u8);
        write!(self.signature, u8);
        write!(&self.serial, array);
        write!(&self.label, array);
        write!(&self.identifier, array);
        write!(&self.boot_code, array);
        write!(0xAA55u16, u16);

        debug_assert_eq!(cursor.position(), Self::SIZE as u64);

        Ok(())
    }
}

impl fmt::Display for BpbFat32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Oem ID                      : {}
Bytes per sector            : {}
Sectors per cluster         : {}
Reserved sectors            : {}
Number of FATs              : {}
Number of directory entries : {}
Media descriptor            : 0x{:02X}
Sectors per track           : {}
Number of heads             : {}
Number of hidden sectors    : {}
Total sectors               : {}
Sectors per FAT             : {}
Root directory cluster      : {}
FSInfo sector               : {}
Backup boot sector          : {}
Drive number                : {}
Volume serial               : {:02X}{:02X}-{:02X}{:02X}
Label                       : {}
Filesystem type             : {}",
            String::from_utf8_lossy(&self.oem_id),
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.number_of_reserved_sectors,
            self.number_of_fats,
            self.number_of_directory_entries,
            self.media_descriptor,
            self.sectors_per_track,
            self.number_of_heads,
            self.number_of_hidden_sectors,
            self.total_sectors(),
            self.sectors_per_fat,
            self.root_directory_cluster,
            self.fsinfo_lba,
            self.backup_bs_lba,
            self.drive_number,
            self.serial[3],
            self.serial[2],
            self.serial[1],
            self.serial[0],
            String::from_utf8_lossy(&self.label),
            String::from_utf8_lossy(&self.identifier)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::BpbFat32;
    use crate::Error;

    fn sample() -> BpbFat32 {
        BpbFat32 {
            jump: [0xEB, 0x58, 0x90],
            oem_id: *b"mkfs.fat",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            number_of_reserved_sectors: 2,
            number_of_fats: 1,
            number_of_directory_entries: 0,
            media_descriptor: 0xF8,
            sectors_per_track: 32,
            number_of_heads: 8,
            number_of_hidden_sectors: 0,
            sectors_total_16: 0,
            sectors_total_32: 132,
            sectors_per_fat: 2,
            flags: 0,
            fat_version: 0,
            root_directory_cluster: 2,
            fsinfo_lba: 0,
            backup_bs_lba: 0,
            reserved: [0; 12],
            drive_number: 0x80,
            winnt_flags: 0,
            signature: 0x29,
            serial: [0x78, 0x56, 0x34, 0x12],
            label: *b"NO NAME    ",
            identifier: *b"FAT32   ",
            boot_code: [0; 420],
        }
    }

    #[test]
    fn test_roundtrip() {
        crate::tests_init();

        let mut buffer = [0u8; BpbFat32::SIZE];
        sample().encode(&mut buffer).unwrap();

        let decoded = BpbFat32::decode(&buffer).unwrap();
        assert_eq!(decoded.bytes_per_sector, 512);
        assert_eq!(decoded.sectors_per_cluster, 1);
        assert_eq!(decoded.number_of_reserved_sectors, 2);
        assert_eq!(decoded.number_of_fats, 1);
        assert_eq!(decoded.total_sectors(), 132);
        assert_eq!(decoded.sectors_per_fat, 2);
        assert_eq!(decoded.root_directory_cluster, 2);
        assert_eq!(&decoded.label, b"NO NAME    ");

        let mut reencoded = [0u8; BpbFat32::SIZE];
        decoded.encode(&mut reencoded).unwrap();
        assert_eq!(&reencoded[..], &buffer[..]);
    }

    #[test]
    fn test_fixed_offsets() {
        crate::tests_init();

        let mut buffer = [0u8; BpbFat32::SIZE];
        sample().encode(&mut buffer).unwrap();

        assert_eq!(u16::from_le_bytes([buffer[11], buffer[12]]), 512);
        assert_eq!(buffer[13], 1);
        assert_eq!(u16::from_le_bytes([buffer[14], buffer[15]]), 2);
        assert_eq!(buffer[16], 1);
        assert_eq!(
            u32::from_le_bytes([buffer[36], buffer[37], buffer[38], buffer[39]]),
            2
        );
        assert_eq!(
            u32::from_le_bytes([buffer[44], buffer[45], buffer[46], buffer[47]]),
            2
        );
    }

    #[test]
    fn test_roundtrip_with_16bit_sector_count() {
        crate::tests_init();

        let mut bpb = sample();
        bpb.sectors_total_16 = 132;
        bpb.sectors_total_32 = 0;

        let mut buffer = [0u8; BpbFat32::SIZE];
        bpb.encode(&mut buffer).unwrap();
        assert_eq!(u16::from_le_bytes([buffer[19], buffer[20]]), 132);

        let decoded = BpbFat32::decode(&buffer).unwrap();
        assert_eq!(decoded.sectors_total_16, 132);
        assert_eq!(decoded.sectors_total_32, 0);
        assert_eq!(decoded.total_sectors(), 132);

        let mut reencoded = [0u8; BpbFat32::SIZE];
        decoded.encode(&mut reencoded).unwrap();
        assert_eq!(&reencoded[..], &buffer[..]);
    }

    #[test]
    fn test_rejects_missing_signature() {
        crate::tests_init();

        let mut buffer = [0u8; BpbFat32::SIZE];
        sample().encode(&mut buffer).unwrap();
        buffer[510] = 0;
        buffer[511] = 0;

        assert!(matches!(BpbFat32::decode(&buffer), Err(Error::InvalidBpb)));
    }
}
