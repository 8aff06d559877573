//! Two-pass defragmenter (spec §4.7): compacts every used data block into
//! the low prefix of the data region, then lays each i-node's blocks out
//! physically-ascending and contiguous.
//!
//! Bypasses the normal allocator entirely and rewrites the data region in
//! place, tracking for every currently-used physical block which i-node
//! owns it and where that i-node's reference to it lives — reusing
//! [`block_addr::RefLoc`] so a block's owner can be found and rewritten the
//! same way allocation and directory-entry removal do.

use crate::bitmap::Bitmap;
use crate::block_addr::{self, RefLoc};
use crate::error::FsResult;
use crate::image::Image;
use crate::inode::{self, Inode};
use crate::layout::{Superblock, BLOCK_SIZE};

#[derive(Clone, Copy)]
struct Owner {
	inode_id: u32,
	loc: RefLoc,
}

pub fn run(image: &mut Image, sb: &Superblock, bitmap: &mut Bitmap, inodes: &mut [Inode]) -> FsResult<()> {
	let total = sb.data_cluster_count as usize;
	let mut owner: Vec<Option<Owner>> = vec![None; total];

	for (id, node) in inodes.iter().enumerate() {
		if node.is_free() {
			continue;
		}
		let id = id as u32;
		for &b in &block_addr::referenced_blocks(image, sb, node)? {
			if let Some(loc) = block_addr::locate(image, sb, node, b)? {
				owner[b as usize] = Some(Owner { inode_id: id, loc });
			}
		}
		for &t in &block_addr::table_blocks(node) {
			let loc = if node.indirect1 == t as i32 { RefLoc::Indirect1Field } else { RefLoc::Indirect2Field };
			owner[t as usize] = Some(Owner { inode_id: id, loc });
		}
	}

	let used_count = bitmap.popcount() as u32;

	// Pass 1: move every used block into [0, used_count).
	let mut search = used_count;
	for i in 0..used_count {
		if bitmap.is_free(i) {
			while bitmap.is_free(search) {
				search += 1;
			}
			switch_blocks(image, sb, bitmap, inodes, &mut owner, search, i)?;
			search += 1;
		}
	}

	// Pass 2: lay each i-node's blocks out contiguous and ascending.
	let mut i = 0u32;
	while i < used_count {
		let owning = owner[i as usize].expect("every position in the used prefix has an owner after pass 1");
		let mut list = inode_block_list(&owner, owning.inode_id);
		let len = list.len() as u32;
		let sequential = list.windows(2).all(|w| w[1] == w[0] + 1);
		if !sequential {
			for k in 0..list.len() {
				let target = i + k as u32;
				if list[k] != target {
					let old = list[k];
					switch_blocks(image, sb, bitmap, inodes, &mut owner, old, target)?;
					for v in list.iter_mut() {
						if *v == target {
							*v = old;
						}
					}
					list[k] = target;
				}
			}
		}
		i += len;
	}

	for (id, node) in inodes.iter().enumerate() {
		if !node.is_free() {
			inode::write(image, sb, id as u32, node)?;
		}
	}
	bitmap.flush(image, sb)?;
	Ok(())
}

/// The physical positions an i-node currently occupies, in the order spec
/// §4.7 lays blocks out in: direct slots by index, then indirect1's
/// payload by offset, then indirect2's payload by offset, then the
/// indirect table blocks themselves.
fn inode_block_list(owner: &[Option<Owner>], inode_id: u32) -> Vec<u32> {
	let mut direct = Vec::new();
	let mut ind1 = Vec::new();
	let mut ind2 = Vec::new();
	let mut tables = Vec::new();
	for (pos, slot) in owner.iter().enumerate() {
		let Some(o) = slot else { continue };
		if o.inode_id != inode_id {
			continue;
		}
		match o.loc {
			RefLoc::Direct(k) => direct.push((k, pos as u32)),
			RefLoc::InIndirect1(_, off) => ind1.push((off, pos as u32)),
			RefLoc::InIndirect2(_, off) => ind2.push((off, pos as u32)),
			RefLoc::Indirect1Field => tables.push((0u8, pos as u32)),
			RefLoc::Indirect2Field => tables.push((1u8, pos as u32)),
		}
	}
	direct.sort_by_key(|&(k, _)| k);
	ind1.sort_by_key(|&(k, _)| k);
	ind2.sort_by_key(|&(k, _)| k);
	tables.sort_by_key(|&(k, _)| k);
	direct
		.into_iter()
		.map(|(_, p)| p)
		.chain(ind1.into_iter().map(|(_, p)| p))
		.chain(ind2.into_iter().map(|(_, p)| p))
		.chain(tables.into_iter().map(|(_, p)| p))
		.collect()
}

/// Swaps the physical contents of data blocks `a` and `b`, their bitmap
/// bits, and rewrites whichever i-node fields or indirect-table entries
/// named them so the reference now points at the other position. When the
/// block moving is itself an indirect table, every bookkeeping record that
/// located a payload block through it is retargeted to the table's new
/// position (spec §4.7).
fn switch_blocks(
	image: &mut Image,
	sb: &Superblock,
	bitmap: &mut Bitmap,
	inodes: &mut [Inode],
	owner: &mut [Option<Owner>],
	a: u32,
	b: u32,
) -> FsResult<()> {
	if a == b {
		return Ok(());
	}
	let mut buf_a = [0u8; BLOCK_SIZE as usize];
	let mut buf_b = [0u8; BLOCK_SIZE as usize];
	image.read_at(sb.data_block_offset(a), &mut buf_a)?;
	image.read_at(sb.data_block_offset(b), &mut buf_b)?;
	image.write_at(sb.data_block_offset(a), &buf_b)?;
	image.write_at(sb.data_block_offset(b), &buf_a)?;

	let used_a = !bitmap.is_free(a);
	let used_b = !bitmap.is_free(b);
	if used_a != used_b {
		bitmap.set(image, sb, a, used_b)?;
		bitmap.set(image, sb, b, used_a)?;
	}

	let owner_a = owner[a as usize];
	let owner_b = owner[b as usize];
	let a_is_table = matches!(owner_a.map(|o| o.loc), Some(RefLoc::Indirect1Field) | Some(RefLoc::Indirect2Field));
	let b_is_table = matches!(owner_b.map(|o| o.loc), Some(RefLoc::Indirect1Field) | Some(RefLoc::Indirect2Field));

	if let Some(o) = owner_a {
		block_addr::write_ref(image, sb, &mut inodes[o.inode_id as usize], o.loc, b as i32)?;
	}
	if let Some(o) = owner_b {
		block_addr::write_ref(image, sb, &mut inodes[o.inode_id as usize], o.loc, a as i32)?;
	}
	if a_is_table || b_is_table {
		retarget_table_references(owner, a, b);
	}

	owner[a as usize] = owner_b;
	owner[b as usize] = owner_a;
	Ok(())
}

fn retarget_table_references(owner: &mut [Option<Owner>], a: u32, b: u32) {
	for slot in owner.iter_mut() {
		let Some(o) = slot else { continue };
		o.loc = match o.loc {
			RefLoc::InIndirect1(t, off) if t == a => RefLoc::InIndirect1(b, off),
			RefLoc::InIndirect1(t, off) if t == b => RefLoc::InIndirect1(a, off),
			RefLoc::InIndirect2(t, off) if t == a => RefLoc::InIndirect2(b, off),
			RefLoc::InIndirect2(t, off) if t == b => RefLoc::InIndirect2(a, off),
			other => other,
		};
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::layout::{Superblock, FREE, ROOT_INODE};
	use std::fs::OpenOptions;
	use tempfile::tempdir;

	fn scratch(size: u64) -> (Image, Superblock, tempfile::TempDir) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("image.bin");
		let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
		let mut image = Image::new(file);
		let sb = Superblock::for_size(size).unwrap();
		image.zero_fill(0, sb.cluster_count as u32).unwrap();
		sb.write(&mut image).unwrap();
		(image, sb, dir)
	}

	#[test]
	fn compacts_fragmented_direct_blocks() {
		let (mut image, sb, _guard) = scratch(1_000_000);
		let mut bitmap = Bitmap::new_empty(sb.data_cluster_count as u32);
		let mut inodes = vec![Inode::free_slot(); sb.inode_count as usize];

		bitmap.set(&mut image, &sb, 0, true).unwrap();
		inodes[ROOT_INODE as usize] = Inode {
			nodeid: ROOT_INODE as i32,
			is_directory: true,
			references: 1,
			file_size: 0,
			direct: [0, FREE, FREE, FREE, FREE],
			indirect1: FREE,
			indirect2: FREE,
		};

		// A file owning blocks 2 and 5, leaving 1, 3, 4 free inside the
		// used range.
		for &b in &[2u32, 5] {
			bitmap.set(&mut image, &sb, b, true).unwrap();
		}
		let payload = [b'x'; BLOCK_SIZE as usize];
		image.write_at(sb.data_block_offset(2), &payload).unwrap();
		image.write_at(sb.data_block_offset(5), &payload).unwrap();
		inodes[1] = Inode {
			nodeid: 1,
			is_directory: false,
			references: 1,
			file_size: 2 * BLOCK_SIZE as i32,
			direct: [2, 5, FREE, FREE, FREE],
			indirect1: FREE,
			indirect2: FREE,
		};

		run(&mut image, &sb, &mut bitmap, &mut inodes).unwrap();

		let used_count = bitmap.popcount() as u32;
		assert_eq!(used_count, 3);
		for b in 0..used_count {
			assert!(!bitmap.is_free(b));
		}
		for b in used_count..bitmap.len() {
			assert!(bitmap.is_free(b));
		}

		let node = inodes[1];
		assert_eq!(node.direct[1], node.direct[0] + 1);

		let mut buf = [0u8; BLOCK_SIZE as usize];
		image.read_at(sb.data_block_offset(node.direct[0] as u32), &mut buf).unwrap();
		assert_eq!(buf, payload);
		image.read_at(sb.data_block_offset(node.direct[1] as u32), &mut buf).unwrap();
		assert_eq!(buf, payload);
	}
}
