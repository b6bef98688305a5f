use super::bpb::BpbFat32;
use crate::{Error, Result};
use std::cmp::min;

/// Sector/cluster arithmetic constants derived from the boot sector.
/// Built once at mount, never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    pub total_sectors: u32,
}

impl Geometry {
    pub fn from_bpb(bpb: &BpbFat32) -> Result<Self> {
        if bpb.bytes_per_sector == 0
            || !is_power_of_2!(bpb.bytes_per_sector)
            || bpb.sectors_per_cluster == 0
            || bpb.number_of_fats == 0
            || bpb.sectors_per_fat == 0
            || bpb.root_directory_cluster < 2
        {
            return Err(Error::InvalidBpb);
        }

        let geometry = Self {
            bytes_per_sector: bpb.bytes_per_sector as u32,
            sectors_per_cluster: bpb.sectors_per_cluster as u32,
            reserved_sectors: bpb.number_of_reserved_sectors as u32,
            fat_count: bpb.number_of_fats as u32,
            sectors_per_fat: bpb.sectors_per_fat,
            root_cluster: bpb.root_directory_cluster,
            total_sectors: bpb.total_sectors(),
        };

        if geometry.total_sectors <= geometry.data_start_sector() {
            return Err(Error::InvalidBpb);
        }

        Ok(geometry)
    }

    #[inline]
    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    #[inline]
    pub fn data_start_sector(&self) -> u32 {
        self.reserved_sectors + self.fat_count * self.sectors_per_fat
    }

    /// Absolute byte offset of a data cluster. Defined only for cluster >= 2.
    pub fn cluster_to_offset(&self, cluster: u32) -> u64 {
        debug_assert!(cluster >= 2);
        ((cluster as u64 - 2) * self.sectors_per_cluster as u64
            + self.data_start_sector() as u64)
            * self.bytes_per_sector as u64
    }

    /// Absolute byte offset of a cluster's 4-byte entry in the first FAT.
    #[inline]
    pub fn fat_entry_offset(&self, cluster: u32) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64 + cluster as u64 * 4
    }

    /// Exclusive upper bound for valid cluster numbers, limited by both the
    /// data region and the capacity of the FAT itself.
    pub fn cluster_limit(&self) -> u32 {
        let data_clusters =
            (self.total_sectors - self.data_start_sector()) / self.sectors_per_cluster;
        let fat_entries = self.sectors_per_fat as u64 * self.bytes_per_sector as u64 / 4;

        min(2 + data_clusters as u64, fat_entries) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::Geometry;

    fn sample() -> Geometry {
        Geometry {
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
            reserved_sectors: 4,
            fat_count: 2,
            sectors_per_fat: 8,
            root_cluster: 2,
            total_sectors: 276,
        }
    }

    #[test]
    fn test_data_start() {
        crate::tests_init();

        let g = sample();
        assert_eq!(g.data_start_sector(), 4 + 2 * 8);
        assert_eq!(g.cluster_size(), 1024);
    }

    #[test]
    fn test_cluster_offset_monotonic() {
        crate::tests_init();

        let g = sample();
        assert_eq!(g.cluster_to_offset(2), g.data_start_sector() as u64 * 512);

        let mut previous = g.cluster_to_offset(2);
        for cluster in 3..64 {
            let offset = g.cluster_to_offset(cluster);
            assert!(offset > previous);
            assert_eq!(offset - previous, g.cluster_size() as u64);
            previous = offset;
        }
    }

    #[test]
    fn test_fat_entry_offset() {
        crate::tests_init();

        let g = sample();
        assert_eq!(g.fat_entry_offset(0), 4 * 512);
        assert_eq!(g.fat_entry_offset(7), 4 * 512 + 28);
    }

    #[test]
    fn test_cluster_limit() {
        crate::tests_init();

        let g = sample();
        // (276 - 20) / 2 data clusters, FAT holds 8 * 512 / 4 entries
        assert_eq!(g.cluster_limit(), 2 + 128);
    }
}
