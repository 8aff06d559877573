//! Tracks free/used data blocks and finds single or contiguous runs.
//!
//! The in-memory byte array mirrors the on-disk bitmap exactly (spec §3.2);
//! every mutation updates both in the same call, write-through.

use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::layout::Superblock;

pub struct Bitmap {
	bytes: Vec<u8>,
}

impl Bitmap {
	/// Builds an all-free bitmap for a freshly formatted image; callers set
	/// block 0 (root's block) afterwards.
	pub fn new_empty(data_cluster_count: u32) -> Self {
		Self {
			bytes: vec![0u8; data_cluster_count as usize],
		}
	}

	pub fn load(image: &mut Image, sb: &Superblock) -> std::io::Result<Self> {
		let mut bytes = vec![0u8; sb.data_cluster_count as usize];
		image.read_at(sb.bitmap_start as u64 * crate::layout::BLOCK_SIZE as u64, &mut bytes)?;
		Ok(Self { bytes })
	}

	/// Rewrites the entire bitmap region, padded to whole blocks.
	pub fn flush(&self, image: &mut Image, sb: &Superblock) -> std::io::Result<()> {
		let block_size = crate::layout::BLOCK_SIZE as usize;
		let padded_len = sb.bitmap_cluster_count as usize * block_size;
		let mut padded = vec![0u8; padded_len];
		padded[..self.bytes.len()].copy_from_slice(&self.bytes);
		image.write_at(sb.bitmap_start as u64 * block_size as u64, &padded)
	}

	pub fn is_free(&self, block: u32) -> bool {
		self.bytes[block as usize] == 0
	}

	pub fn popcount(&self) -> usize {
		self.bytes.iter().filter(|&&b| b != 0).count()
	}

	pub fn len(&self) -> u32 {
		self.bytes.len() as u32
	}

	/// Flips one bit in memory and persists just that byte, per the
	/// single-byte write-through the original `update_bitmap` performs.
	pub fn set(&mut self, image: &mut Image, sb: &Superblock, block: u32, used: bool) -> std::io::Result<()> {
		self.bytes[block as usize] = used as u8;
		image.write_at(sb.bitmap_byte_offset(block), &[used as u8])
	}

	/// Allocates `count` data blocks: first tries a contiguous run, then
	/// falls back to any `count` free blocks. A clean two-pointer scan,
	/// not the decrement-on-mismatch approach the original source used
	/// (Design Notes §9(c) flags that as a bug to avoid, not reproduce).
	pub fn allocate(&mut self, image: &mut Image, sb: &Superblock, count: u32) -> FsResult<Vec<u32>> {
		if count == 0 {
			return Ok(Vec::new());
		}
		if let Some(run) = self.find_contiguous_run(count) {
			for b in run.clone() {
				self.set(image, sb, b, true)?;
			}
			return Ok(run.collect());
		}
		let any = self.find_any(count);
		if any.len() < count as usize {
			return Err(FsError::NoSpace);
		}
		for &b in &any {
			self.set(image, sb, b, true)?;
		}
		Ok(any)
	}

	fn find_contiguous_run(&self, count: u32) -> Option<std::ops::Range<u32>> {
		let count = count as usize;
		let mut run_start = None;
		let mut run_len = 0usize;
		for i in 1..self.bytes.len() {
			if self.bytes[i] == 0 {
				if run_start.is_none() {
					run_start = Some(i);
				}
				run_len += 1;
				if run_len == count {
					let start = run_start.unwrap() as u32;
					return Some(start..start + count as u32);
				}
			} else {
				run_start = None;
				run_len = 0;
			}
		}
		None
	}

	fn find_any(&self, count: u32) -> Vec<u32> {
		let mut blocks = Vec::with_capacity(count as usize);
		for i in 1..self.bytes.len() {
			if self.bytes[i] == 0 {
				blocks.push(i as u32);
				if blocks.len() == count as usize {
					break;
				}
			}
		}
		blocks
	}

	/// Releases a set of data blocks in one call.
	pub fn free_many(&mut self, image: &mut Image, sb: &Superblock, blocks: &[u32]) -> std::io::Result<()> {
		for &b in blocks {
			self.set(image, sb, b, false)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn scratch_sb() -> Superblock {
		Superblock::for_size(crate::layout::MIN_IMAGE_SIZE).unwrap()
	}

	#[test]
	fn contiguous_preferred_over_scattered() {
		let mut bm = Bitmap::new_empty(32);
		bm.bytes[1] = 1;
		bm.bytes[3] = 1;
		let run = bm.find_contiguous_run(4);
		assert_eq!(run, Some(4..8));
	}

	#[test]
	fn falls_back_to_any_when_no_run_exists() {
		let mut bm = Bitmap::new_empty(8);
		for i in (1..8).step_by(2) {
			bm.bytes[i] = 1;
		}
		assert!(bm.find_contiguous_run(2).is_none());
		let any = bm.find_any(3);
		assert_eq!(any, vec![2, 4, 6]);
	}

	#[test]
	fn popcount_tracks_allocation() {
		let sb = scratch_sb();
		let mut bm = Bitmap::new_empty(sb.data_cluster_count as u32);
		bm.bytes[0] = 1;
		assert_eq!(bm.popcount(), 1);
	}
}
