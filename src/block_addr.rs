//! Translates `(i-node, logical block index)` to physical block numbers,
//! including the two levels of single-indirect tables (spec §4.3).
//!
//! Every call site that needs a file's or directory's block list goes
//! through [`referenced_blocks`] rather than re-deriving the
//! direct/indirect staircase inline; the original source had at least six
//! near-duplicate copies of this traversal (Design Notes §9), which this
//! module exists to avoid.

use crate::bitmap::Bitmap;
use crate::error::{FsError, FsResult, NotFoundKind};
use crate::image::Image;
use crate::inode::Inode;
use crate::layout::{Superblock, BLOCK_SIZE, DIRECT_COUNT, FREE, INDIRECT_ENTRIES};

/// Number of logical blocks a file of `size` bytes occupies.
pub fn logical_count(size: u32) -> u32 {
	if size == 0 {
		0
	} else {
		(size + BLOCK_SIZE - 1) / BLOCK_SIZE
	}
}

/// Length of the last block's valid bytes (`B` if the file is an exact
/// multiple of the block size and non-empty).
pub fn tail_len(size: u32) -> u32 {
	let rem = size % BLOCK_SIZE;
	if rem == 0 && size > 0 {
		BLOCK_SIZE
	} else {
		rem
	}
}

/// Total blocks to allocate for `n` logical blocks, including whichever
/// indirect tables are needed to address them (spec §4.3).
pub fn blocks_needed(n: u32) -> u32 {
	if n <= DIRECT_COUNT as u32 {
		n
	} else if n <= DIRECT_COUNT as u32 + INDIRECT_ENTRIES {
		n + 1
	} else {
		n + 2
	}
}

/// Where a physical block's number is stored: directly in an i-node field,
/// or at some offset inside one of its indirect tables. Shared by
/// allocation, release, and the defragmenter's per-block bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefLoc {
	Direct(usize),
	Indirect1Field,
	Indirect2Field,
	InIndirect1(u32, usize),
	InIndirect2(u32, usize),
}

/// The result of planning storage for `n` fresh logical blocks out of a
/// pool of `blocks_needed(n)` newly allocated physical block numbers.
pub struct Placement {
	pub direct: [i32; DIRECT_COUNT],
	pub indirect1: i32,
	pub indirect2: i32,
	/// Payload entries to write into the indirect1 table, in order.
	pub indirect1_entries: Vec<i32>,
	/// Payload entries to write into the indirect2 table, in order.
	pub indirect2_entries: Vec<i32>,
}

/// Lays `pool` (length `blocks_needed(n)`) out into direct/indirect slots.
/// The indirect table blocks themselves are taken from the *tail* of the
/// pool, in `indirect1`-then-`indirect2` order (spec §4.3).
pub fn place(n: u32, pool: &[u32]) -> Placement {
	let data_count = n as usize;
	let mut direct = [FREE; DIRECT_COUNT];
	let direct_n = data_count.min(DIRECT_COUNT);
	for i in 0..direct_n {
		direct[i] = pool[i] as i32;
	}

	if data_count <= DIRECT_COUNT {
		return Placement {
			direct,
			indirect1: FREE,
			indirect2: FREE,
			indirect1_entries: Vec::new(),
			indirect2_entries: Vec::new(),
		};
	}

	let rest = &pool[DIRECT_COUNT..data_count];
	if data_count <= DIRECT_COUNT + INDIRECT_ENTRIES as usize {
		let table_block = pool[pool.len() - 1];
		Placement {
			direct,
			indirect1: table_block as i32,
			indirect2: FREE,
			indirect1_entries: rest.iter().map(|&b| b as i32).collect(),
			indirect2_entries: Vec::new(),
		}
	} else {
		let split = INDIRECT_ENTRIES as usize;
		let (first, second) = rest.split_at(split);
		let table1 = pool[pool.len() - 2];
		let table2 = pool[pool.len() - 1];
		Placement {
			direct,
			indirect1: table1 as i32,
			indirect2: table2 as i32,
			indirect1_entries: first.iter().map(|&b| b as i32).collect(),
			indirect2_entries: second.iter().map(|&b| b as i32).collect(),
		}
	}
}

/// Writes a [`Placement`]'s indirect table contents to the image and
/// applies it to `inode`'s fields. Does not persist the i-node record
/// itself; the caller does that after also setting `nodeid`/`file_size`/etc.
pub fn apply_placement(
	image: &mut Image,
	sb: &Superblock,
	inode: &mut Inode,
	placement: &Placement,
) -> std::io::Result<()> {
	inode.direct = placement.direct;
	inode.indirect1 = placement.indirect1;
	inode.indirect2 = placement.indirect2;
	if placement.indirect1 != FREE {
		write_table(image, sb, placement.indirect1 as u32, &placement.indirect1_entries)?;
	}
	if placement.indirect2 != FREE {
		write_table(image, sb, placement.indirect2 as u32, &placement.indirect2_entries)?;
	}
	Ok(())
}

fn write_table(image: &mut Image, sb: &Superblock, table_block: u32, entries: &[i32]) -> std::io::Result<()> {
	let mut buf = [0u8; BLOCK_SIZE as usize];
	for (i, &e) in entries.iter().enumerate() {
		buf[i * 4..i * 4 + 4].copy_from_slice(&e.to_le_bytes());
	}
	image.write_at(sb.data_block_offset(table_block), &buf)
}

/// Reads every block number out of an indirect table, stopping at the
/// first zero entry (a zero can never be a valid data block number since
/// block 0 is permanently root's own block) or after `INDIRECT_ENTRIES`.
fn read_table(image: &mut Image, sb: &Superblock, table_block: u32) -> std::io::Result<Vec<i32>> {
	let mut buf = [0u8; BLOCK_SIZE as usize];
	image.read_at(sb.data_block_offset(table_block), &mut buf)?;
	let mut out = Vec::new();
	for i in 0..INDIRECT_ENTRIES as usize {
		let v = i32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
		if v == 0 {
			break;
		}
		out.push(v);
	}
	Ok(out)
}

/// All data blocks this i-node currently references: direct slots in
/// order, then indirect1's entries, then indirect2's entries. Used both to
/// read a file's/directory's payload and as the per-i-node flat list the
/// defragmenter needs (spec §4.7's "direct blocks, then indirect-table
/// contents" ordering, minus the table blocks themselves — see
/// [`table_blocks`]).
pub fn referenced_blocks(image: &mut Image, sb: &Superblock, inode: &Inode) -> std::io::Result<Vec<u32>> {
	let mut out = Vec::new();
	for &d in &inode.direct {
		if d == FREE {
			break;
		}
		out.push(d as u32);
	}
	if inode.indirect1 != FREE {
		out.extend(read_table(image, sb, inode.indirect1 as u32)?.into_iter().map(|v| v as u32));
	}
	if inode.indirect2 != FREE {
		out.extend(read_table(image, sb, inode.indirect2 as u32)?.into_iter().map(|v| v as u32));
	}
	Ok(out)
}

/// The indirect table blocks an i-node currently owns (not their payload).
pub fn table_blocks(inode: &Inode) -> Vec<u32> {
	let mut out = Vec::new();
	if inode.indirect1 != FREE {
		out.push(inode.indirect1 as u32);
	}
	if inode.indirect2 != FREE {
		out.push(inode.indirect2 as u32);
	}
	out
}

/// Every physical block an i-node references, in the order spec §4.7
/// wants for defragmentation bookkeeping: direct blocks, then indirect
/// table contents, then the indirect table blocks themselves.
pub fn all_referenced(image: &mut Image, sb: &Superblock, inode: &Inode) -> std::io::Result<Vec<u32>> {
	let mut out = referenced_blocks(image, sb, inode)?;
	out.extend(table_blocks(inode));
	Ok(out)
}

/// Extends an i-node's block chain by exactly one data block, allocating
/// whichever table block is needed to keep addressing it (spec §4.4's
/// directory-growth rule, generalized: used directly by directory growth,
/// and is the same staircase [`place`] encodes for bulk allocation).
pub fn append_block(
	image: &mut Image,
	sb: &Superblock,
	bitmap: &mut Bitmap,
	inode: &mut Inode,
) -> FsResult<u32> {
	let direct_free = inode.direct.iter().position(|&d| d == FREE);
	if let Some(slot) = direct_free {
		let new_block = bitmap.allocate(image, sb, 1)?[0];
		inode.direct[slot] = new_block as i32;
		return Ok(new_block);
	}

	if inode.indirect1 == FREE {
		let pair = bitmap.allocate(image, sb, 2)?;
		let (data_block, table_block) = (pair[0], pair[1]);
		inode.indirect1 = table_block as i32;
		write_table(image, sb, table_block, &[data_block as i32])?;
		return Ok(data_block);
	}

	let mut entries = read_table(image, sb, inode.indirect1 as u32)?;
	if entries.len() < INDIRECT_ENTRIES as usize {
		let new_block = bitmap.allocate(image, sb, 1)?[0];
		entries.push(new_block as i32);
		write_table(image, sb, inode.indirect1 as u32, &entries)?;
		return Ok(new_block);
	}

	if inode.indirect2 == FREE {
		let pair = bitmap.allocate(image, sb, 2)?;
		let (data_block, table_block) = (pair[0], pair[1]);
		inode.indirect2 = table_block as i32;
		write_table(image, sb, table_block, &[data_block as i32])?;
		return Ok(data_block);
	}

	let mut entries2 = read_table(image, sb, inode.indirect2 as u32)?;
	if entries2.len() >= INDIRECT_ENTRIES as usize {
		return Err(FsError::NoSpace);
	}
	let new_block = bitmap.allocate(image, sb, 1)?[0];
	entries2.push(new_block as i32);
	write_table(image, sb, inode.indirect2 as u32, &entries2)?;
	Ok(new_block)
}

fn zero_table_slot(image: &mut Image, sb: &Superblock, table_block: u32, idx: usize) -> std::io::Result<()> {
	image.write_at(sb.data_block_offset(table_block) + idx as u64 * 4, &0i32.to_le_bytes())
}

/// Shrinks an i-node's block chain by exactly one block, always trimming
/// from the logical tail (the highest-index populated direct slot, or the
/// last entry of the last populated indirect table). Collapses an
/// indirect table to `FREE` once its last entry is gone. The inverse of
/// [`append_block`]; used by directory-entry removal to reclaim a data
/// block that became empty (spec §4.4), restricted to the tail so the
/// break-on-sentinel traversal the rest of this module relies on stays
/// valid — interior holes are left for `defrag` to sweep up instead.
pub fn release_last_block(
	image: &mut Image,
	sb: &Superblock,
	bitmap: &mut Bitmap,
	inode: &mut Inode,
) -> FsResult<u32> {
	if inode.indirect2 != FREE {
		let mut entries = read_table(image, sb, inode.indirect2 as u32)?;
		if let Some(last) = entries.pop() {
			zero_table_slot(image, sb, inode.indirect2 as u32, entries.len())?;
			bitmap.free_many(image, sb, &[last as u32])?;
			if entries.is_empty() {
				let table = inode.indirect2 as u32;
				inode.indirect2 = FREE;
				bitmap.free_many(image, sb, &[table])?;
			}
			return Ok(last as u32);
		}
	}
	if inode.indirect1 != FREE {
		let mut entries = read_table(image, sb, inode.indirect1 as u32)?;
		if let Some(last) = entries.pop() {
			zero_table_slot(image, sb, inode.indirect1 as u32, entries.len())?;
			bitmap.free_many(image, sb, &[last as u32])?;
			if entries.is_empty() && inode.indirect2 == FREE {
				let table = inode.indirect1 as u32;
				inode.indirect1 = FREE;
				bitmap.free_many(image, sb, &[table])?;
			}
			return Ok(last as u32);
		}
	}
	if let Some(slot) = inode.direct.iter().rposition(|&d| d != FREE) {
		let blk = inode.direct[slot] as u32;
		inode.direct[slot] = FREE;
		bitmap.free_many(image, sb, &[blk])?;
		return Ok(blk);
	}
	Err(FsError::NotFound(NotFoundKind::File))
}

/// Finds where `block`'s number is currently recorded in `inode`, if at
/// all: a direct slot, or an offset within one of its indirect tables.
pub fn locate(image: &mut Image, sb: &Superblock, inode: &Inode, block: u32) -> std::io::Result<Option<RefLoc>> {
	for (i, &d) in inode.direct.iter().enumerate() {
		if d == block as i32 {
			return Ok(Some(RefLoc::Direct(i)));
		}
	}
	if inode.indirect1 != FREE {
		let entries = read_table(image, sb, inode.indirect1 as u32)?;
		if let Some(off) = entries.iter().position(|&e| e == block as i32) {
			return Ok(Some(RefLoc::InIndirect1(inode.indirect1 as u32, off)));
		}
	}
	if inode.indirect2 != FREE {
		let entries = read_table(image, sb, inode.indirect2 as u32)?;
		if let Some(off) = entries.iter().position(|&e| e == block as i32) {
			return Ok(Some(RefLoc::InIndirect2(inode.indirect2 as u32, off)));
		}
	}
	Ok(None)
}

/// Overwrites the slot named by `loc` with `value`, in both the in-memory
/// i-node and, for table-resident slots, the table block on disk.
pub fn write_ref(
	image: &mut Image,
	sb: &Superblock,
	inode: &mut Inode,
	loc: RefLoc,
	value: i32,
) -> std::io::Result<()> {
	match loc {
		RefLoc::Direct(i) => inode.direct[i] = value,
		RefLoc::Indirect1Field => inode.indirect1 = value,
		RefLoc::Indirect2Field => inode.indirect2 = value,
		RefLoc::InIndirect1(table, off) => {
			image.write_at(
				sb.data_block_offset(table) + off as u64 * 4,
				&value.to_le_bytes(),
			)?;
		}
		RefLoc::InIndirect2(table, off) => {
			image.write_at(
				sb.data_block_offset(table) + off as u64 * 4,
				&value.to_le_bytes(),
			)?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn logical_count_rounds_up() {
		assert_eq!(logical_count(0), 0);
		assert_eq!(logical_count(1), 1);
		assert_eq!(logical_count(BLOCK_SIZE), 1);
		assert_eq!(logical_count(BLOCK_SIZE + 1), 2);
	}

	#[test]
	fn tail_len_matches_exact_multiples() {
		assert_eq!(tail_len(BLOCK_SIZE), BLOCK_SIZE);
		assert_eq!(tail_len(BLOCK_SIZE + 10), 10);
		assert_eq!(tail_len(0), 0);
	}

	#[test]
	fn blocks_needed_accounts_for_indirect_tables() {
		assert_eq!(blocks_needed(5), 5);
		assert_eq!(blocks_needed(6), 7);
		assert_eq!(blocks_needed(DIRECT_COUNT as u32 + INDIRECT_ENTRIES), DIRECT_COUNT as u32 + INDIRECT_ENTRIES + 1);
		assert_eq!(blocks_needed(DIRECT_COUNT as u32 + INDIRECT_ENTRIES + 1), DIRECT_COUNT as u32 + INDIRECT_ENTRIES + 3);
	}

	#[test]
	fn place_only_direct() {
		let pool = [10u32, 11, 12];
		let p = place(3, &pool);
		assert_eq!(p.direct, [10, 11, 12, FREE, FREE]);
		assert_eq!(p.indirect1, FREE);
	}

	#[test]
	fn place_uses_tail_of_pool_for_indirect_table() {
		let pool: Vec<u32> = (100..107).collect(); // 5 direct + 1 payload + 1 table
		let p = place(6, &pool);
		assert_eq!(p.direct, [100, 101, 102, 103, 104]);
		assert_eq!(p.indirect1, 106);
		assert_eq!(p.indirect1_entries, vec![105]);
	}

	#[test]
	fn place_uses_both_indirect_tables() {
		let n = DIRECT_COUNT as u32 + INDIRECT_ENTRIES + 1; // needs both tables
		let total = blocks_needed(n);
		let pool: Vec<u32> = (0..total).collect();
		let p = place(n, &pool);
		assert_eq!(p.indirect1, pool[pool.len() - 2]);
		assert_eq!(p.indirect2, pool[pool.len() - 1]);
		assert_eq!(p.indirect1_entries.len(), INDIRECT_ENTRIES as usize);
		assert_eq!(p.indirect2_entries.len(), 1);
	}
}
