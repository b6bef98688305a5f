mod bpb;
pub mod dir;
mod geometry;
mod handle;
pub mod table;

pub use bpb::BpbFat32;
pub use dir::{Attributes, DirEntry};
pub use geometry::Geometry;
pub use handle::{OpenFile, OpenMode, Whence, MAX_OPEN_FILES};

use crate::disk::Disk;
use crate::{Error, Result};
use dir::DirSlot;
use handle::OpenFileTable;
use std::cmp::min;
use std::io::{Read, Seek, SeekFrom, Write};

/// A mounted FAT32 volume. Owns every piece of mutable state an operation
/// touches: the device borrow, the working-directory cursor and its
/// display path, and the open file table. One instance has exclusive
/// access to the image for its whole lifetime.
pub struct Fat32Volume<'a> {
    device: &'a mut dyn Disk,
    bpb: BpbFat32,
    geometry: Geometry,
    current_cluster: u32,
    path: String,
    open_files: OpenFileTable,
}

impl<'a> Fat32Volume<'a> {
    /// Parses the boot sector and positions the working directory at the
    /// root cluster. Any failure here is fatal to the caller.
    pub fn mount(device: &'a mut dyn Disk) -> Result<Self> {
        let mut sector = [0u8; BpbFat32::SIZE];
        device
            .seek(SeekFrom::Start(0))
            .and_then(|_| device.read_exact(&mut sector))
            .map_err(|e| Error::Mount(e.to_string()))?;

        let bpb = match BpbFat32::decode(&sector) {
            Ok(bpb) => bpb,
            Err(e) => return Err(Error::Mount(e.to_string())),
        };
        debug!("mounted volume:\n{}", bpb);

        let geometry = match Geometry::from_bpb(&bpb) {
            Ok(g) => g,
            Err(e) => return Err(Error::Mount(e.to_string())),
        };

        Ok(Self {
            device,
            current_cluster: geometry.root_cluster,
            path: String::from("/"),
            open_files: OpenFileTable::new(),
            bpb,
            geometry,
        })
    }

    pub fn bpb(&self) -> &BpbFat32 {
        &self.bpb
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Logical path of the working directory, for display.
    pub fn pwd(&self) -> &str {
        &self.path
    }

    pub fn current_cluster(&self) -> u32 {
        self.current_cluster
    }

    /// Raw FAT entry of a cluster. Diagnostic accessor.
    pub fn fat_entry(&mut self, cluster: u32) -> Result<u32> {
        table::read_entry(self.device, &self.geometry, cluster)
    }

    pub fn open_files(&self) -> &[OpenFile] {
        self.open_files.as_slice()
    }

    /// In-use entries of the working directory, in slot order.
    pub fn list(&mut self) -> Result<Vec<DirEntry>> {
        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        Ok(dir::live_entries(&slots).map(|s| s.entry).collect())
    }

    pub fn change_directory(&mut self, name: &str) -> Result<()> {
        if name == "." {
            return Ok(());
        }
        if name == ".." && self.current_cluster == self.geometry.root_cluster {
            // root's parent is the root itself
            return Ok(());
        }

        let name11 = dir::format_short_name(name);
        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        let slot = dir::find_entry(&slots, &name11).ok_or(Error::NotFound)?;
        if !slot.entry.is_directory() {
            return Err(Error::NotADirectory);
        }

        let target = slot.entry.first_cluster();
        // ".." of a first-level directory may store 0 for the root
        self.current_cluster = if target < 2 {
            self.geometry.root_cluster
        } else {
            target
        };

        if name == ".." {
            self.pop_path_segment();
        } else {
            if !self.path.ends_with('/') {
                self.path.push('/');
            }
            self.path.push_str(&slot.entry.display_name());
        }
        trace!("cwd now {} (cluster {})", self.path, self.current_cluster);

        Ok(())
    }

    fn pop_path_segment(&mut self) {
        if let Some(pos) = self.path.rfind('/') {
            self.path.truncate(if pos == 0 { 1 } else { pos });
        }
    }

    pub fn create_file(&mut self, name: &str) -> Result<()> {
        self.create_entry(name, Attributes::ARCHIVE)
    }

    pub fn create_directory(&mut self, name: &str) -> Result<()> {
        self.create_entry(name, Attributes::DIRECTORY)
    }

    /// Files and directories share one namespace; a plain file gets no
    /// cluster until its first write, a directory gets one cluster seeded
    /// with its "." and ".." entries before the parent entry is stored.
    fn create_entry(&mut self, name: &str, attributes: Attributes) -> Result<()> {
        // the root has no dot entries, so the namespace check alone would
        // let a literal "." or ".." slip through there
        if name == "." || name == ".." {
            return Err(Error::AlreadyExists);
        }

        let name11 = dir::format_short_name(name);
        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        if dir::find_entry(&slots, &name11).is_some() {
            return Err(Error::AlreadyExists);
        }

        let mut entry = DirEntry::new(name11, attributes);

        if attributes.contains(Attributes::DIRECTORY) {
            let fresh = table::extend(self.device, &self.geometry, None, 1)?;
            dir::zero_cluster(self.device, &self.geometry, fresh)?;

            let mut dot = DirEntry::new(dir::format_short_name("."), Attributes::DIRECTORY);
            dot.set_first_cluster(fresh);
            let mut dotdot = DirEntry::new(dir::format_short_name(".."), Attributes::DIRECTORY);
            dotdot.set_first_cluster(self.current_cluster);

            let base = self.geometry.cluster_to_offset(fresh);
            dir::store_slot(self.device, &DirSlot { offset: base, entry: dot })?;
            dir::store_slot(
                self.device,
                &DirSlot {
                    offset: base + dir::ENTRY_SIZE as u64,
                    entry: dotdot,
                },
            )?;

            entry.set_first_cluster(fresh);
        }

        let offset = dir::find_free_slot(self.device, &self.geometry, self.current_cluster)?;
        dir::store_slot(self.device, &DirSlot { offset, entry })?;
        debug!("created {} ({:?})", entry.display_name(), attributes);

        Ok(())
    }

    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        let name11 = dir::format_short_name(name);
        if self.open_files.is_open(&name11) {
            return Err(Error::FileBusy);
        }

        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        let slot = dir::find_entry(&slots, &name11).ok_or(Error::NotFound)?;
        if slot.entry.is_directory() {
            return Err(Error::IsDirectory);
        }

        let mut slot = *slot;
        let head = slot.entry.first_cluster();
        // deletion mark reaches the directory before any cluster is freed
        slot.entry.name[0] = dir::DELETED;
        dir::store_slot(self.device, &slot)?;
        if head >= 2 {
            table::reclaim(self.device, &self.geometry, head)?;
        }
        debug!("removed file {}", name);

        Ok(())
    }

    pub fn remove_directory(&mut self, name: &str) -> Result<()> {
        // "." would reclaim the working directory out from under the
        // cursor while the parent's entry stays live; ".." likewise for
        // the parent. Both keep their dot entries, so refuse as non-empty.
        if name == "." || name == ".." {
            return Err(Error::NotEmpty);
        }

        let name11 = dir::format_short_name(name);
        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        let slot = dir::find_entry(&slots, &name11).ok_or(Error::NotFound)?;
        if !slot.entry.is_directory() {
            return Err(Error::NotADirectory);
        }

        let target = slot.entry.first_cluster();
        if target >= 2 {
            let target_slots = dir::load_chain(self.device, &self.geometry, target)?;
            if dir::live_entries(&target_slots).any(|s| !s.entry.is_dot_entry()) {
                return Err(Error::NotEmpty);
            }
        }

        let mut slot = *slot;
        slot.entry.name[0] = dir::DELETED;
        dir::store_slot(self.device, &slot)?;
        if target >= 2 {
            table::reclaim(self.device, &self.geometry, target)?;
        }
        debug!("removed directory {}", name);

        Ok(())
    }

    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<()> {
        let name11 = dir::format_short_name(name);
        if self.open_files.is_open(&name11) {
            return Err(Error::AlreadyOpen);
        }

        let slots = dir::load_chain(self.device, &self.geometry, self.current_cluster)?;
        let slot = dir::find_entry(&slots, &name11).ok_or(Error::NotFound)?;
        if slot.entry.is_directory() {
            return Err(Error::IsDirectory);
        }

        self.open_files
            .insert(OpenFile::new(slot.entry, slot.offset, mode))
    }

    pub fn close(&mut self, name: &str) -> Result<()> {
        self.open_files
            .remove(&dir::format_short_name(name))
            .map(|_| ())
    }

    /// Moves a handle's cursor. The append position (cursor == size) is
    /// valid; anything negative or beyond it is not.
    pub fn seek(&mut self, name: &str, whence: Whence, offset: i64) -> Result<u32> {
        let name11 = dir::format_short_name(name);
        let file = self.open_files.get_mut(&name11).ok_or(Error::NotOpen)?;

        let base = match whence {
            Whence::Start => 0,
            Whence::Current => file.cursor as i64,
            Whence::End => file.entry.size as i64,
        };
        let target = base.checked_add(offset).ok_or(Error::OutOfBounds)?;
        if target < 0 || target > file.entry.size as i64 {
            return Err(Error::OutOfBounds);
        }

        file.cursor = target as u32;
        Ok(file.cursor)
    }

    /// Reads up to `count` bytes at the handle's cursor and advances it.
    /// Reading at or past end of file yields an empty buffer.
    pub fn read(&mut self, name: &str, count: usize) -> Result<Vec<u8>> {
        let name11 = dir::format_short_name(name);
        let (entry, mode, cursor) = {
            let file = self.open_files.get(&name11).ok_or(Error::NotOpen)?;
            (file.entry, file.mode, file.cursor)
        };
        if entry.is_directory() {
            return Err(Error::IsDirectory);
        }
        if !mode.can_read() {
            return Err(Error::NotOpenForReading);
        }

        let remaining = entry.size.saturating_sub(cursor) as usize;
        let len = min(count, remaining);

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailure)?;
        data.resize(len, 0);

        if len > 0 {
            self.chain_read(entry.first_cluster(), cursor, &mut data)?;
        }
        if let Some(file) = self.open_files.get_mut(&name11) {
            file.cursor = cursor + len as u32;
        }

        Ok(data)
    }

    /// Writes at the handle's cursor, extending the cluster chain and the
    /// recorded size first when the write reaches past end of file. The
    /// updated entry is stored back into its directory slot before the
    /// data lands, so a later open never sees stale size or cluster
    /// fields.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<usize> {
        let name11 = dir::format_short_name(name);
        let (mut entry, slot_offset, mode, cursor) = {
            let file = self.open_files.get(&name11).ok_or(Error::NotOpen)?;
            (file.entry, file.slot_offset, file.mode, file.cursor)
        };
        if entry.is_directory() {
            return Err(Error::IsDirectory);
        }
        if !mode.can_write() {
            return Err(Error::NotOpenForWriting);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let end = cursor as u64 + data.len() as u64;
        if end > u32::MAX as u64 {
            return Err(Error::OutOfBounds);
        }

        let mut head = entry.first_cluster();
        if end > entry.size as u64 {
            let cluster_size = self.geometry.cluster_size() as u64;
            let have = if head >= 2 {
                table::collect_chain(self.device, &self.geometry, head)?.len() as u64
            } else {
                0
            };
            let need = (end + cluster_size - 1) / cluster_size;
            if need > have {
                head = table::extend(
                    self.device,
                    &self.geometry,
                    if head >= 2 { Some(head) } else { None },
                    (need - have) as u32,
                )?;
            }

            entry.set_first_cluster(head);
            entry.size = end as u32;
            dir::store_slot(
                self.device,
                &DirSlot {
                    offset: slot_offset,
                    entry,
                },
            )?;
        }

        self.chain_write(head, cursor, data)?;

        if let Some(file) = self.open_files.get_mut(&name11) {
            file.entry = entry;
            file.cursor = cursor + data.len() as u32;
        }

        Ok(data.len())
    }

    fn chain_read(&mut self, head: u32, offset: u32, buf: &mut [u8]) -> Result<()> {
        let cluster_size = self.geometry.cluster_size();
        let clusters = table::collect_chain(self.device, &self.geometry, head)?;

        let mut within = (offset % cluster_size) as usize;
        let mut done = 0usize;
        for &cluster in clusters.iter().skip((offset / cluster_size) as usize) {
            if done == buf.len() {
                break;
            }
            let take = min(buf.len() - done, cluster_size as usize - within);
            self.device.seek(SeekFrom::Start(
                self.geometry.cluster_to_offset(cluster) + within as u64,
            ))?;
            self.device.read_exact(&mut buf[done..done + take])?;
            done += take;
            within = 0;
        }

        debug_assert_eq!(done, buf.len());
        Ok(())
    }

    fn chain_write(&mut self, head: u32, offset: u32, buf: &[u8]) -> Result<()> {
        let cluster_size = self.geometry.cluster_size();
        let clusters = table::collect_chain(self.device, &self.geometry, head)?;

        let mut within = (offset % cluster_size) as usize;
        let mut done = 0usize;
        for &cluster in clusters.iter().skip((offset / cluster_size) as usize) {
            if done == buf.len() {
                break;
            }
            let take = min(buf.len() - done, cluster_size as usize - within);
            self.device.seek(SeekFrom::Start(
                self.geometry.cluster_to_offset(cluster) + within as u64,
            ))?;
            self.device.write_all(&buf[done..done + take])?;
            done += take;
            within = 0;
        }

        debug_assert_eq!(done, buf.len());
        Ok(())
    }
}
