//! Encodes and decodes directory contents: a flat sequence of 16-byte
//! entries (spec §3.4) spread across a directory i-node's block chain.

use crate::bitmap::Bitmap;
use crate::block_addr;
use crate::error::{FsError, FsResult, NotFoundKind};
use crate::image::Image;
use crate::inode::{self, Inode};
use crate::layout::{Superblock, BLOCK_SIZE, DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE, NAME_MAX_LEN};

/// One directory entry: a name and the i-node id it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
	pub name: String,
	pub inode_id: u32,
}

impl DirEntry {
	/// `inode:i32` (0 = empty slot) followed by `name:[u8;12]`, NUL-padded
	/// (spec §3.4).
	fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE as usize] {
		let mut buf = [0u8; DIR_ENTRY_SIZE as usize];
		buf[0..4].copy_from_slice(&(self.inode_id as i32).to_le_bytes());
		let name_bytes = self.name.as_bytes();
		let len = name_bytes.len().min(NAME_MAX_LEN);
		buf[4..4 + len].copy_from_slice(&name_bytes[..len]);
		buf
	}

	fn from_bytes(buf: &[u8; DIR_ENTRY_SIZE as usize]) -> Option<Self> {
		let id = i32::from_le_bytes(buf[0..4].try_into().unwrap());
		if id <= 0 {
			return None;
		}
		let name_field = &buf[4..16];
		let nul = name_field.iter().position(|&b| b == 0).unwrap_or(12);
		if nul == 0 {
			return None;
		}
		let name = String::from_utf8_lossy(&name_field[..nul]).into_owned();
		Some(Self { name, inode_id: id as u32 })
	}
}

/// Reads every live entry out of a directory's block chain, in on-disk
/// order. A slot whose id is `0` (never written, or cleared by [`remove`])
/// is a hole and is skipped rather than ending the scan, so removal never
/// needs to compact the remaining entries.
pub fn list(image: &mut Image, sb: &Superblock, dir: &Inode) -> FsResult<Vec<DirEntry>> {
	let blocks = block_addr::referenced_blocks(image, sb, dir)?;
	let mut out = Vec::new();
	for block in blocks {
		let mut buf = [0u8; BLOCK_SIZE as usize];
		image.read_at(sb.data_block_offset(block), &mut buf)?;
		for i in 0..DIR_ENTRIES_PER_BLOCK as usize {
			let off = i * DIR_ENTRY_SIZE as usize;
			let raw: [u8; DIR_ENTRY_SIZE as usize] = buf[off..off + DIR_ENTRY_SIZE as usize].try_into().unwrap();
			if let Some(entry) = DirEntry::from_bytes(&raw) {
				out.push(entry);
			}
		}
	}
	Ok(out)
}

/// Appends one entry, growing the directory's block chain by one block
/// via [`block_addr::append_block`] when every existing block is full
/// (spec §4.4). Does not touch `dir.file_size`: that field tracks the
/// recursive byte total of the subtree's *files*, not the directory's own
/// entry-table size (spec §3.6), and is rolled up separately by the
/// caller via ancestor-size updates.
pub fn insert(
	image: &mut Image,
	sb: &Superblock,
	bitmap: &mut Bitmap,
	dir_id: u32,
	dir: &mut Inode,
	entry: DirEntry,
) -> FsResult<()> {
	let blocks = block_addr::referenced_blocks(image, sb, dir)?;
	for block in &blocks {
		if let Some(slot) = find_free_slot(image, sb, *block)? {
			write_slot(image, sb, *block, slot, &entry)?;
			return Ok(());
		}
	}
	let new_block = block_addr::append_block(image, sb, bitmap, dir)?;
	zero_block(image, sb, new_block)?;
	write_slot(image, sb, new_block, 0, &entry)?;
	inode::write(image, sb, dir_id, dir)?;
	Ok(())
}

/// Clears the entry named `name`. If the block that held it is both the
/// directory's last data block and now entirely empty, that block is
/// released back to the allocator (spec §4.4) — except `direct[0]`, which
/// persists for the directory's lifetime. An emptied *interior* block is
/// left as a hole for `defrag` to reclaim, so the break-on-sentinel block
/// traversal the rest of this module relies on never has to skip gaps.
/// Returns the i-node id the entry named.
pub fn remove(
	image: &mut Image,
	sb: &Superblock,
	bitmap: &mut Bitmap,
	dir_id: u32,
	dir: &mut Inode,
	name: &str,
) -> FsResult<u32> {
	let blocks = block_addr::referenced_blocks(image, sb, dir)?;
	for (pos, &block) in blocks.iter().enumerate() {
		let mut buf = [0u8; BLOCK_SIZE as usize];
		image.read_at(sb.data_block_offset(block), &mut buf)?;
		for i in 0..DIR_ENTRIES_PER_BLOCK as usize {
			let off = i * DIR_ENTRY_SIZE as usize;
			let raw: [u8; DIR_ENTRY_SIZE as usize] = buf[off..off + DIR_ENTRY_SIZE as usize].try_into().unwrap();
			if let Some(entry) = DirEntry::from_bytes(&raw) {
				if entry.name == name {
					let cleared = [0u8; DIR_ENTRY_SIZE as usize];
					image.write_at(sb.data_block_offset(block) + off as u64, &cleared)?;
					let is_last = pos + 1 == blocks.len();
					let is_first = block as i32 == dir.direct[0];
					if is_last && !is_first && block_is_empty(image, sb, block)? {
						block_addr::release_last_block(image, sb, bitmap, dir)?;
					}
					inode::write(image, sb, dir_id, dir)?;
					return Ok(entry.inode_id);
				}
			}
		}
	}
	Err(FsError::NotFound(NotFoundKind::File))
}

fn block_is_empty(image: &mut Image, sb: &Superblock, block: u32) -> FsResult<bool> {
	let mut buf = [0u8; BLOCK_SIZE as usize];
	image.read_at(sb.data_block_offset(block), &mut buf)?;
	Ok(buf.iter().all(|&b| b == 0))
}

fn find_free_slot(image: &mut Image, sb: &Superblock, block: u32) -> FsResult<Option<usize>> {
	let mut buf = [0u8; BLOCK_SIZE as usize];
	image.read_at(sb.data_block_offset(block), &mut buf)?;
	for i in 0..DIR_ENTRIES_PER_BLOCK as usize {
		let off = i * DIR_ENTRY_SIZE as usize;
		let id = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		if id == 0 {
			return Ok(Some(i));
		}
	}
	Ok(None)
}

fn write_slot(image: &mut Image, sb: &Superblock, block: u32, slot: usize, entry: &DirEntry) -> FsResult<()> {
	let off = sb.data_block_offset(block) + (slot * DIR_ENTRY_SIZE as usize) as u64;
	image.write_at(off, &entry.to_bytes())?;
	Ok(())
}

fn zero_block(image: &mut Image, sb: &Superblock, block: u32) -> FsResult<()> {
	let zeros = [0u8; BLOCK_SIZE as usize];
	image.write_at(sb.data_block_offset(block), &zeros)?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn entry_roundtrips_through_bytes() {
		let e = DirEntry { name: "readme".into(), inode_id: 7 };
		let back = DirEntry::from_bytes(&e.to_bytes()).unwrap();
		assert_eq!(back, e);
	}

	#[test]
	fn empty_slot_decodes_to_none() {
		let buf = [0u8; DIR_ENTRY_SIZE as usize];
		assert!(DirEntry::from_bytes(&buf).is_none());
	}

	#[test]
	fn name_truncates_at_max_len() {
		let e = DirEntry { name: "a".repeat(20), inode_id: 1 };
		let bytes = e.to_bytes();
		let nul = bytes[4..16].iter().position(|&b| b == 0).unwrap_or(12);
		assert_eq!(nul, NAME_MAX_LEN);
	}
}
