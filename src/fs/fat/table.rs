use super::geometry::Geometry;
use crate::disk::Disk;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Seek, SeekFrom};

pub const FREE: u32 = 0;
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

// Upper 4 bits of a FAT32 entry are reserved and must be ignored.
const ENTRY_MASK: u32 = 0x0FFF_FFFF;

#[inline]
pub fn is_end(entry: u32) -> bool {
    entry >= 0x0FFF_FFF8
}

pub fn read_entry(device: &mut dyn Disk, geometry: &Geometry, cluster: u32) -> Result<u32> {
    device.seek(SeekFrom::Start(geometry.fat_entry_offset(cluster)))?;
    Ok(device.read_u32::<LittleEndian>()? & ENTRY_MASK)
}

pub fn write_entry(
    device: &mut dyn Disk,
    geometry: &Geometry,
    cluster: u32,
    value: u32,
) -> Result<()> {
    device.seek(SeekFrom::Start(geometry.fat_entry_offset(cluster)))?;
    device.write_u32::<LittleEndian>(value)?;
    Ok(())
}

/// Lazy walk over a cluster chain. Yields the head first, then every
/// successor until a free or end-of-chain entry. A head below 2 yields
/// nothing.
pub struct ChainWalker<'d> {
    device: &'d mut dyn Disk,
    geometry: Geometry,
    next: Option<u32>,
}

impl Iterator for ChainWalker<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        match read_entry(self.device, &self.geometry, current) {
            Ok(entry) => {
                self.next = if entry >= 2 && !is_end(entry) {
                    Some(entry)
                } else {
                    None
                };
                Some(Ok(current))
            }
            Err(e) => {
                self.next = None;
                Some(Err(e))
            }
        }
    }
}

pub fn chain<'d>(device: &'d mut dyn Disk, geometry: &Geometry, head: u32) -> ChainWalker<'d> {
    ChainWalker {
        device,
        geometry: *geometry,
        next: if head >= 2 { Some(head) } else { None },
    }
}

pub fn collect_chain(device: &mut dyn Disk, geometry: &Geometry, head: u32) -> Result<Vec<u32>> {
    chain(device, geometry, head).collect()
}

/// First free entry at index 2 or above.
pub fn find_free(device: &mut dyn Disk, geometry: &Geometry) -> Result<u32> {
    for cluster in 2..geometry.cluster_limit() {
        if read_entry(device, geometry, cluster)? == FREE {
            return Ok(cluster);
        }
    }
    Err(Error::NoSpace)
}

/// Grows a chain by `additional` clusters, or starts a new one when `head`
/// is `None`. Returns the chain head.
///
/// Clusters are claimed and linked one at a time; if the volume runs out
/// partway the already-linked clusters stay allocated and the call fails
/// with `NoSpace`. Callers must not assume rollback.
pub fn extend(
    device: &mut dyn Disk,
    geometry: &Geometry,
    head: Option<u32>,
    additional: u32,
) -> Result<u32> {
    let mut head = head;
    let mut tail = match head {
        Some(h) => collect_chain(device, geometry, h)?.last().copied(),
        None => None,
    };

    for _ in 0..additional {
        let fresh = find_free(device, geometry)?;
        // Claim the fresh cluster before linking it so the next scan
        // cannot hand it out again.
        write_entry(device, geometry, fresh, END_OF_CHAIN)?;
        match tail {
            Some(t) => write_entry(device, geometry, t, fresh)?,
            None => head = Some(fresh),
        }
        tail = Some(fresh);
        trace!("allocated cluster {}", fresh);
    }

    head.ok_or(Error::NoSpace)
}

/// Frees every cluster of a chain. The chain is collected up front:
/// zeroing an entry destroys its successor pointer.
pub fn reclaim(device: &mut dyn Disk, geometry: &Geometry, head: u32) -> Result<()> {
    let clusters = collect_chain(device, geometry, head)?;
    for cluster in clusters {
        write_entry(device, geometry, cluster, FREE)?;
        trace!("freed cluster {}", cluster);
    }
    Ok(())
}
