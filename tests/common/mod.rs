use fat32util::disk::RamDisk;
use fat32util::fs::fat::BpbFat32;

pub const SECTOR: u32 = 512;

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Builds a blank FAT32 image: boot sector, one FAT, a zeroed root
/// directory at cluster 2 and every other cluster free. Layout: 2
/// reserved sectors, `sectors_per_fat` FAT sectors, one sector per
/// cluster.
fn build(total_sectors: u32, sectors_per_fat: u32) -> RamDisk {
    let bpb = BpbFat32 {
        jump: [0xEB, 0x58, 0x90],
        oem_id: *b"mkfs.fat",
        bytes_per_sector: SECTOR as u16,
        sectors_per_cluster: 1,
        number_of_reserved_sectors: 2,
        number_of_fats: 1,
        number_of_directory_entries: 0,
        media_descriptor: 0xF8,
        sectors_per_track: 32,
        number_of_heads: 8,
        number_of_hidden_sectors: 0,
        sectors_total_16: 0,
        sectors_total_32: total_sectors,
        sectors_per_fat,
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
    };

    let mut image = vec![0u8; (total_sectors * SECTOR) as usize];
    bpb.encode(&mut image[..BpbFat32::SIZE]).unwrap();

    let fat = 2 * SECTOR as usize;
    put_u32(&mut image, fat, 0x0FFF_FFF8); // media entry
    put_u32(&mut image, fat + 4, 0x0FFF_FFFF);
    put_u32(&mut image, fat + 8, 0x0FFF_FFFF); // root directory chain

    RamDisk::from_vec(image, SECTOR)
}

/// 128 one-sector data clusters, root empty.
pub fn blank_volume() -> RamDisk {
    build(132, 2)
}

/// Root plus only two free clusters, for exhaustion tests.
pub fn tiny_volume() -> RamDisk {
    build(7, 2)
}
