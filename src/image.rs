//! Positioned read/write of fixed-width records against the image file.
//!
//! Grounded on the `Seek`+`read_exact`/`write_all` idiom used throughout
//! `mkfs/src/ext2.rs` (`BlockGroupDescriptor::read`/`write`, `fill_bitmap`):
//! every structure on disk is accessed by computing a byte offset and doing
//! one positioned read or write, never by keeping the file cursor implicit.

use crate::layout::BLOCK_SIZE;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// The image file backing a simulated filesystem.
pub struct Image {
	file: File,
}

impl Image {
	pub fn new(file: File) -> Self {
		Self { file }
	}

	pub fn len(&mut self) -> io::Result<u64> {
		self.file.seek(SeekFrom::End(0))
	}

	/// Reads `buf.len()` bytes starting at byte offset `off`.
	pub fn read_at(&mut self, off: u64, buf: &mut [u8]) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(off))?;
		self.file.read_exact(buf)
	}

	/// Writes `buf` at byte offset `off` and flushes it through to the
	/// image, per the write-through protocol of spec §5.
	pub fn write_at(&mut self, off: u64, buf: &[u8]) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(off))?;
		self.file.write_all(buf)?;
		self.file.sync_data()
	}

	/// Reads one whole block.
	pub fn read_block(&mut self, block: u32) -> io::Result<[u8; BLOCK_SIZE as usize]> {
		let mut buf = [0u8; BLOCK_SIZE as usize];
		self.read_at(block as u64 * BLOCK_SIZE as u64, &mut buf)?;
		Ok(buf)
	}

	/// Writes one whole block.
	pub fn write_block(&mut self, block: u32, data: &[u8]) -> io::Result<()> {
		debug_assert_eq!(data.len(), BLOCK_SIZE as usize);
		self.write_at(block as u64 * BLOCK_SIZE as u64, data)
	}

	/// Fills `count` whole blocks starting at `start` with zeros, used by
	/// `format` to zero the entire image up front.
	pub fn zero_fill(&mut self, start: u32, count: u32) -> io::Result<()> {
		let zeros = [0u8; BLOCK_SIZE as usize];
		for b in start..start + count {
			self.write_block(b, &zeros)?;
		}
		Ok(())
	}

	/// Reads a little-endian `i32` at a byte offset.
	pub fn read_i32(&mut self, off: u64) -> io::Result<i32> {
		let mut buf = [0u8; 4];
		self.read_at(off, &mut buf)?;
		Ok(i32::from_le_bytes(buf))
	}

	/// Writes a little-endian `i32` at a byte offset, with write-through.
	pub fn write_i32(&mut self, off: u64, value: i32) -> io::Result<()> {
		self.write_at(off, &value.to_le_bytes())
	}
}
