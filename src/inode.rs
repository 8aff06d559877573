//! The 38-byte packed i-node record and the i-node table allocator.

use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::layout::{Superblock, DIRECT_COUNT, FREE, INODE_RECORD_SIZE};

/// One i-node: `nodeid`, directory flag, reference count, size, five direct
/// block references, and two single-indirect references (spec §3.3).
#[derive(Debug, Clone, Copy)]
pub struct Inode {
	pub nodeid: i32,
	pub is_directory: bool,
	pub references: i8,
	pub file_size: i32,
	pub direct: [i32; DIRECT_COUNT],
	pub indirect1: i32,
	pub indirect2: i32,
}

impl Inode {
	pub fn free_slot() -> Self {
		Self {
			nodeid: FREE,
			is_directory: false,
			references: 0,
			file_size: 0,
			direct: [FREE; DIRECT_COUNT],
			indirect1: FREE,
			indirect2: FREE,
		}
	}

	pub fn is_free(&self) -> bool {
		self.nodeid == FREE
	}

	pub fn to_bytes(&self) -> [u8; INODE_RECORD_SIZE as usize] {
		let mut buf = [0u8; INODE_RECORD_SIZE as usize];
		buf[0..4].copy_from_slice(&self.nodeid.to_le_bytes());
		buf[4] = self.is_directory as u8;
		buf[5] = self.references as u8;
		buf[6..10].copy_from_slice(&self.file_size.to_le_bytes());
		for i in 0..DIRECT_COUNT {
			let off = 10 + i * 4;
			buf[off..off + 4].copy_from_slice(&self.direct[i].to_le_bytes());
		}
		buf[30..34].copy_from_slice(&self.indirect1.to_le_bytes());
		buf[34..38].copy_from_slice(&self.indirect2.to_le_bytes());
		buf
	}

	pub fn from_bytes(buf: &[u8; INODE_RECORD_SIZE as usize]) -> Self {
		let i32_at = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		let mut direct = [FREE; DIRECT_COUNT];
		for (i, d) in direct.iter_mut().enumerate() {
			*d = i32_at(10 + i * 4);
		}
		Self {
			nodeid: i32_at(0),
			is_directory: buf[4] != 0,
			references: buf[5] as i8,
			file_size: i32_at(6),
			direct,
			indirect1: i32_at(30),
			indirect2: i32_at(34),
		}
	}
}

/// Reads the i-node at slot `id`.
pub fn read(image: &mut Image, sb: &Superblock, id: u32) -> std::io::Result<Inode> {
	let mut buf = [0u8; INODE_RECORD_SIZE as usize];
	image.read_at(sb.inode_offset(id), &mut buf)?;
	Ok(Inode::from_bytes(&buf))
}

/// Writes the i-node at slot `id`, write-through.
pub fn write(image: &mut Image, sb: &Superblock, id: u32, inode: &Inode) -> std::io::Result<()> {
	image.write_at(sb.inode_offset(id), &inode.to_bytes())
}

/// Linear scan over i-node slots `1..inode_count` for a free one (slot 0 is
/// always the root and is never allocated this way).
pub fn find_free(inodes: &[Inode]) -> FsResult<u32> {
	for (i, node) in inodes.iter().enumerate().skip(1) {
		if node.is_free() {
			return Ok(i as u32);
		}
	}
	Err(FsError::NoSpace)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip_through_bytes() {
		let node = Inode {
			nodeid: 3,
			is_directory: true,
			references: 2,
			file_size: 4096,
			direct: [1, 2, 3, FREE, FREE],
			indirect1: FREE,
			indirect2: 9,
		};
		let back = Inode::from_bytes(&node.to_bytes());
		assert_eq!(back.nodeid, node.nodeid);
		assert_eq!(back.is_directory, node.is_directory);
		assert_eq!(back.references, node.references);
		assert_eq!(back.file_size, node.file_size);
		assert_eq!(back.direct, node.direct);
		assert_eq!(back.indirect1, node.indirect1);
		assert_eq!(back.indirect2, node.indirect2);
	}

	#[test]
	fn free_slot_is_recognized() {
		assert!(Inode::free_slot().is_free());
	}

	#[test]
	fn find_free_skips_slot_zero() {
		let mut inodes = vec![Inode::free_slot(); 4];
		inodes[0].nodeid = 0;
		inodes[1].nodeid = 1;
		assert_eq!(find_free(&inodes).unwrap(), 2);
	}
}
