use super::geometry::Geometry;
use super::table;
use crate::disk::Disk;
use crate::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

pub const ENTRY_SIZE: usize = 32;

/// First name byte of a deleted entry.
pub const DELETED: u8 = 0xE5;

bitflags! {
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// One 32-byte directory record. The timestamp bytes are carried verbatim
/// so `encode` writes back exactly what `decode` read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: Attributes,
    pub creation: [u8; 8],
    pub first_cluster_high: u16,
    pub write_time: [u8; 4],
    pub first_cluster_low: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn new(name: [u8; 11], attributes: Attributes) -> Self {
        Self {
            name,
            attributes,
            creation: [0; 8],
            first_cluster_high: 0,
            write_time: [0; 4],
            first_cluster_low: 0,
            size: 0,
        }
    }

    pub fn decode(buffer: &[u8]) -> Result<Self> {
        debug_assert_eq!(buffer.len(), ENTRY_SIZE);

        let mut reader = Cursor::new(buffer);

        let mut name = [0u8; 11];
        reader.read_exact(&mut name)?;
        let attributes = Attributes::from_bits_truncate(reader.read_u8()?);
        let mut creation = [0u8; 8];
        reader.read_exact(&mut creation)?;
        let first_cluster_high = reader.read_u16::<LittleEndian>()?;
        let mut write_time = [0u8; 4];
        reader.read_exact(&mut write_time)?;
        let first_cluster_low = reader.read_u16::<LittleEndian>()?;
        let size = reader.read_u32::<LittleEndian>()?;

        debug_assert_eq!(reader.position(), ENTRY_SIZE as u64);

        Ok(Self {
            name,
            attributes,
            creation,
            first_cluster_high,
            write_time,
            first_cluster_low,
            size,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), ENTRY_SIZE);

        let mut cursor = Cursor::new(buf);
        cursor.write_all(&self.name)?;
        cursor.write_u8(self.attributes.bits())?;
        cursor.write_all(&self.creation)?;
        cursor.write_u16::<LittleEndian>(self.first_cluster_high)?;
        cursor.write_all(&self.write_time)?;
        cursor.write_u16::<LittleEndian>(self.first_cluster_low)?;
        cursor.write_u32::<LittleEndian>(self.size)?;

        debug_assert_eq!(cursor.position(), ENTRY_SIZE as u64);

        Ok(())
    }

    /// All-zero first name byte ends the in-use portion of a directory.
    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    pub fn is_dot_entry(&self) -> bool {
        &self.name == b".          " || &self.name == b"..         "
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        (self.first_cluster_high as u32) << 16 | self.first_cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = (cluster >> 16) as u16;
        self.first_cluster_low = cluster as u16;
    }

    pub fn matches(&self, name: &[u8; 11]) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Human-readable form of the stored name: padding stripped, dot
    /// reinserted before a non-blank extension.
    pub fn display_name(&self) -> String {
        if self.is_dot_entry() {
            return String::from_utf8_lossy(&self.name)
                .trim_end()
                .to_string();
        }

        let base = String::from_utf8_lossy(&self.name[..8]);
        let base = base.trim_end();
        let ext = String::from_utf8_lossy(&self.name[8..]);
        let ext = ext.trim_end();

        if ext.is_empty() {
            base.to_string()
        } else {
            format!("{}.{}", base, ext)
        }
    }
}

/// Uppercases `name` into the fixed 11-byte 8.3 form, splitting on the
/// last dot. Overlong components are truncated, not rejected.
pub fn format_short_name(name: &str) -> [u8; 11] {
    let mut out = [b' '; 11];

    if name == "." || name == ".." {
        for (i, b) in name.bytes().enumerate() {
            out[i] = b;
        }
        return out;
    }

    let (base, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i + 1..]),
        _ => (name, ""),
    };
    for (i, b) in base.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }

    out
}

/// One loaded entry slot plus the absolute image offset it came from, so
/// a modified slot can be stored back to exactly the same bytes.
#[derive(Debug, Clone, Copy)]
pub struct DirSlot {
    pub offset: u64,
    pub entry: DirEntry,
}

/// Reads every slot of a directory by walking its full cluster chain. A
/// directory that has grown past one cluster is still read completely.
pub fn load_chain(
    device: &mut dyn Disk,
    geometry: &Geometry,
    dir_cluster: u32,
) -> Result<Vec<DirSlot>> {
    let clusters = table::collect_chain(device, geometry, dir_cluster)?;
    load_clusters(device, geometry, &clusters)
}

fn load_clusters(
    device: &mut dyn Disk,
    geometry: &Geometry,
    clusters: &[u32],
) -> Result<Vec<DirSlot>> {
    let cluster_size = geometry.cluster_size() as usize;
    let slots_per_cluster = cluster_size / ENTRY_SIZE;
    let mut slots = Vec::with_capacity(clusters.len() * slots_per_cluster);
    let mut buffer = vec![0u8; cluster_size];

    for &cluster in clusters {
        let base = geometry.cluster_to_offset(cluster);
        device.seek(SeekFrom::Start(base))?;
        device.read_exact(&mut buffer)?;

        for i in 0..slots_per_cluster {
            let raw = &buffer[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
            slots.push(DirSlot {
                offset: base + (i * ENTRY_SIZE) as u64,
                entry: DirEntry::decode(raw)?,
            });
        }
    }

    Ok(slots)
}

pub fn store_slot(device: &mut dyn Disk, slot: &DirSlot) -> Result<()> {
    let mut raw = [0u8; ENTRY_SIZE];
    slot.entry.encode(&mut raw)?;
    device.seek(SeekFrom::Start(slot.offset))?;
    device.write_all(&raw)?;
    Ok(())
}

/// In-use entries of a loaded directory: the scan stops at the first
/// terminator slot and skips deleted ones.
pub fn live_entries(slots: &[DirSlot]) -> impl Iterator<Item = &DirSlot> {
    slots
        .iter()
        .take_while(|s| !s.entry.is_terminator())
        .filter(|s| !s.entry.is_deleted())
}

pub fn find_entry<'a>(slots: &'a [DirSlot], name: &[u8; 11]) -> Option<&'a DirSlot> {
    live_entries(slots).find(|s| s.entry.matches(name))
}

/// Offset of the first reusable slot (terminator or deleted). When the
/// directory's chain has no spare slot it is grown by one zeroed cluster
/// and the new cluster's first slot is returned.
pub fn find_free_slot(
    device: &mut dyn Disk,
    geometry: &Geometry,
    dir_cluster: u32,
) -> Result<u64> {
    let clusters = table::collect_chain(device, geometry, dir_cluster)?;
    let slots = load_clusters(device, geometry, &clusters)?;

    for slot in &slots {
        if slot.entry.is_terminator() || slot.entry.is_deleted() {
            return Ok(slot.offset);
        }
    }

    let tail = clusters.last().copied().unwrap_or(dir_cluster);
    let fresh = table::find_free(device, geometry)?;
    table::write_entry(device, geometry, fresh, table::END_OF_CHAIN)?;
    table::write_entry(device, geometry, tail, fresh)?;
    zero_cluster(device, geometry, fresh)?;
    debug!("directory cluster {} grown with cluster {}", dir_cluster, fresh);

    Ok(geometry.cluster_to_offset(fresh))
}

pub fn zero_cluster(device: &mut dyn Disk, geometry: &Geometry, cluster: u32) -> Result<()> {
    let zeroes = vec![0u8; geometry.cluster_size() as usize];
    device.seek(SeekFrom::Start(geometry.cluster_to_offset(cluster)))?;
    device.write_all(&zeroes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        crate::tests_init();

        let mut entry = DirEntry::new(format_short_name("STARTUP.CFG"), Attributes::ARCHIVE);
        entry.set_first_cluster(0x0005_0002);
        entry.size = 1234;
        entry.creation = [1, 2, 3, 4, 5, 6, 7, 8];
        entry.write_time = [9, 10, 11, 12];

        let mut raw = [0u8; ENTRY_SIZE];
        entry.encode(&mut raw).unwrap();

        assert_eq!(&raw[..11], b"STARTUP CFG");
        assert_eq!(raw[11], 0x20);
        assert_eq!(u16::from_le_bytes([raw[20], raw[21]]), 0x0005);
        assert_eq!(u16::from_le_bytes([raw[26], raw[27]]), 0x0002);
        assert_eq!(u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]), 1234);

        let decoded = DirEntry::decode(&raw).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.first_cluster(), 0x0005_0002);
    }

    #[test]
    fn test_format_short_name() {
        crate::tests_init();

        assert_eq!(&format_short_name("readme.txt"), b"README  TXT");
        assert_eq!(&format_short_name("SUB"), b"SUB        ");
        assert_eq!(&format_short_name("a.b.c"), b"A.B     C  ");
        assert_eq!(&format_short_name("."), b".          ");
        assert_eq!(&format_short_name(".."), b"..         ");
        // overlong components truncate
        assert_eq!(&format_short_name("verylongname.text"), b"VERYLONGTEX");
    }

    #[test]
    fn test_matches_case_insensitive() {
        crate::tests_init();

        let entry = DirEntry::new(format_short_name("SUB"), Attributes::DIRECTORY);
        assert!(entry.matches(&format_short_name("sub")));
        assert!(entry.matches(&format_short_name("Sub")));
        assert!(!entry.matches(&format_short_name("sub2")));
    }

    #[test]
    fn test_display_name() {
        crate::tests_init();

        let file = DirEntry::new(format_short_name("readme.txt"), Attributes::ARCHIVE);
        assert_eq!(file.display_name(), "README.TXT");

        let dir = DirEntry::new(format_short_name("SUB"), Attributes::DIRECTORY);
        assert_eq!(dir.display_name(), "SUB");

        let dot = DirEntry::new(format_short_name(".."), Attributes::DIRECTORY);
        assert_eq!(dot.display_name(), "..");
    }

    #[test]
    fn test_scan_rules() {
        crate::tests_init();

        let live = DirEntry::new(format_short_name("A"), Attributes::ARCHIVE);
        let mut deleted = DirEntry::new(format_short_name("B"), Attributes::ARCHIVE);
        deleted.name[0] = DELETED;
        let terminator = DirEntry::new([0; 11], Attributes::empty());
        let after = DirEntry::new(format_short_name("C"), Attributes::ARCHIVE);

        let slots: Vec<DirSlot> = [live, deleted, terminator, after]
            .iter()
            .enumerate()
            .map(|(i, &entry)| DirSlot {
                offset: (i * ENTRY_SIZE) as u64,
                entry,
            })
            .collect();

        // deleted is skipped, terminator ends the scan before "C"
        let names: Vec<String> = live_entries(&slots)
            .map(|s| s.entry.display_name())
            .collect();
        assert_eq!(names, ["A"]);

        assert!(find_entry(&slots, &format_short_name("a")).is_some());
        assert!(find_entry(&slots, &format_short_name("B")).is_none());
        assert!(find_entry(&slots, &format_short_name("C")).is_none());
    }
}
