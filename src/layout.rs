//! On-disk geometry: the fixed constants of spec §3 and the superblock
//! that records a formatted image's layout.

use crate::error::{FsError, FsResult};
use crate::image::Image;

/// Size of one block/cluster, in bytes (spec §3, "1024 bytes in the reference").
pub const BLOCK_SIZE: u32 = 1024;
/// On-disk size of one i-node record (spec §3.3).
pub const INODE_RECORD_SIZE: u32 = 38;
/// On-disk size of one directory entry (spec §3.4).
pub const DIR_ENTRY_SIZE: u32 = 16;
/// Maximum number of significant bytes in a name, not counting the NUL.
pub const NAME_MAX_LEN: usize = 11;
/// Number of direct block references carried by an i-node.
pub const DIRECT_COUNT: usize = 5;
/// Number of block numbers a single indirect table holds (`B / 4`).
pub const INDIRECT_ENTRIES: u32 = BLOCK_SIZE / 4;
/// Number of directory entries that fit in one data block (`B / 16`).
pub const DIR_ENTRIES_PER_BLOCK: u32 = BLOCK_SIZE / DIR_ENTRY_SIZE;
/// Sentinel for "unused" in an i-node reference field.
pub const FREE: i32 = -1;
/// I-node id of the root directory; also its slot in the arena.
pub const ROOT_INODE: u32 = 0;

/// Maximum regular file size: `5*B + 2*(B/4)*B` (spec §3.3).
pub const MAX_FILE_SIZE: u64 =
	DIRECT_COUNT as u64 * BLOCK_SIZE as u64 + 2 * INDIRECT_ENTRIES as u64 * BLOCK_SIZE as u64;

/// Minimum and maximum accepted `format` size, in bytes (spec §4.1).
pub const MIN_IMAGE_SIZE: u64 = 20480;
pub const MAX_IMAGE_SIZE: u64 = i32::MAX as u64;

/// The on-disk superblock: ten little-endian `i32` fields at offset 0,
/// padded with reserved zeros to one whole block (spec §3.1).
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	pub disk_size: i32,
	pub cluster_size: i32,
	pub cluster_count: i32,
	pub inode_count: i32,
	pub bitmap_cluster_count: i32,
	pub inode_cluster_count: i32,
	pub data_cluster_count: i32,
	pub bitmap_start: i32,
	pub inode_start: i32,
	pub data_start: i32,
}

impl Superblock {
	/// Computes the geometry for a freshly formatted image of `size_bytes`,
	/// following the derivation order of spec §4.1 exactly (each field is
	/// derived from the ones before it; changing the order changes the
	/// result because of integer truncation at every division).
	pub fn for_size(size_bytes: u64) -> FsResult<Self> {
		if !(MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE).contains(&size_bytes) {
			return Err(FsError::NoSpace);
		}
		let b = BLOCK_SIZE as u64;
		let cluster_count = size_bytes / b;
		let disk_size = cluster_count * b;
		let inode_cluster_count = cluster_count / 20;
		let inode_count = (inode_cluster_count * b) / INODE_RECORD_SIZE as u64;
		let bitmap_cluster_count = ((cluster_count - inode_cluster_count - 1) + b - 1) / b;
		let data_cluster_count = cluster_count - 1 - bitmap_cluster_count - inode_cluster_count;

		let bitmap_start = 1u64;
		let inode_start = bitmap_start + bitmap_cluster_count;
		let data_start = inode_start + inode_cluster_count;

		Ok(Self {
			disk_size: disk_size as i32,
			cluster_size: BLOCK_SIZE as i32,
			cluster_count: cluster_count as i32,
			inode_count: inode_count as i32,
			bitmap_cluster_count: bitmap_cluster_count as i32,
			inode_cluster_count: inode_cluster_count as i32,
			data_cluster_count: data_cluster_count as i32,
			bitmap_start: bitmap_start as i32,
			inode_start: inode_start as i32,
			data_start: data_start as i32,
		})
	}

	pub fn to_bytes(&self) -> [u8; 40] {
		let mut buf = [0u8; 40];
		let fields = [
			self.disk_size,
			self.cluster_size,
			self.cluster_count,
			self.inode_count,
			self.bitmap_cluster_count,
			self.inode_cluster_count,
			self.data_cluster_count,
			self.bitmap_start,
			self.inode_start,
			self.data_start,
		];
		for (i, f) in fields.iter().enumerate() {
			buf[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
		}
		buf
	}

	pub fn from_bytes(buf: &[u8; 40]) -> Self {
		let mut read = |i: usize| i32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
		Self {
			disk_size: read(0),
			cluster_size: read(1),
			cluster_count: read(2),
			inode_count: read(3),
			bitmap_cluster_count: read(4),
			inode_cluster_count: read(5),
			data_cluster_count: read(6),
			bitmap_start: read(7),
			inode_start: read(8),
			data_start: read(9),
		}
	}

	pub fn write(&self, image: &mut Image) -> std::io::Result<()> {
		image.write_at(0, &self.to_bytes())
	}

	pub fn read(image: &mut Image) -> std::io::Result<Self> {
		let mut buf = [0u8; 40];
		image.read_at(0, &mut buf)?;
		Ok(Self::from_bytes(&buf))
	}

	/// Byte offset of data block `n` (data-region-relative).
	pub fn data_block_offset(&self, n: u32) -> u64 {
		(self.data_start as u64 + n as u64) * BLOCK_SIZE as u64
	}

	/// Byte offset of i-node `id`'s record.
	pub fn inode_offset(&self, id: u32) -> u64 {
		self.inode_start as u64 * BLOCK_SIZE as u64 + id as u64 * INODE_RECORD_SIZE as u64
	}

	/// Byte offset of the bitmap byte for data block `n`.
	pub fn bitmap_byte_offset(&self, n: u32) -> u64 {
		self.bitmap_start as u64 * BLOCK_SIZE as u64 + n as u64
	}
}
