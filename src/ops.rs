//! The `Filesystem` object: owns the image, superblock, bitmap, i-node
//! table, and in-memory directory tree, and implements every operation
//! contract of spec §4.6. Operations return data (or an [`FsError`]); they
//! never print — `commands.rs` is the only place that maps a result onto
//! the response vocabulary of spec §6.3 (Design Notes §9).

use std::fs;
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::block_addr;
use crate::defrag;
use crate::dirstore::{self, DirEntry};
use crate::error::{FsError, FsResult, NotFoundKind};
use crate::image::Image;
use crate::inode::{self, Inode};
use crate::layout::{Superblock, BLOCK_SIZE, DIRECT_COUNT, FREE, MAX_FILE_SIZE, ROOT_INODE};
use crate::path;
use crate::tree::Tree;

pub struct Filesystem {
	image: Image,
	sb: Superblock,
	bitmap: Bitmap,
	inodes: Vec<Inode>,
	tree: Tree,
}

impl Filesystem {
	/// Formats a fresh image of `size_bytes` (spec §4.1): zero-fills the
	/// whole image, writes the superblock, marks i-node 0 as the root
	/// directory with `direct[0]=0`, and sets bitmap byte 0 to 1.
	pub fn format(mut image: Image, size_bytes: u64) -> FsResult<Self> {
		let sb = Superblock::for_size(size_bytes)?;
		image.zero_fill(0, sb.cluster_count as u32)?;
		sb.write(&mut image)?;

		let mut bitmap = Bitmap::new_empty(sb.data_cluster_count as u32);
		bitmap.set(&mut image, &sb, 0, true)?;

		let mut inodes = vec![Inode::free_slot(); sb.inode_count as usize];
		let root = Inode {
			nodeid: ROOT_INODE as i32,
			is_directory: true,
			references: 1,
			file_size: 0,
			direct: [0, FREE, FREE, FREE, FREE],
			indirect1: FREE,
			indirect2: FREE,
		};
		inode::write(&mut image, &sb, ROOT_INODE, &root)?;
		inodes[ROOT_INODE as usize] = root;
		for id in 1..inodes.len() as u32 {
			inode::write(&mut image, &sb, id, &inodes[id as usize])?;
		}

		let tree = Tree::new(sb.inode_count as u32);
		Ok(Self { image, sb, bitmap, inodes, tree })
	}

	/// Loads a previously formatted image: superblock, bitmap, i-node
	/// table, then rebuilds the directory tree by recursive descent from
	/// the root (spec §3.5).
	pub fn load(mut image: Image) -> FsResult<Self> {
		let sb = Superblock::read(&mut image)?;
		let bitmap = Bitmap::load(&mut image, &sb)?;
		let mut inodes = Vec::with_capacity(sb.inode_count as usize);
		for id in 0..sb.inode_count as u32 {
			inodes.push(inode::read(&mut image, &sb, id)?);
		}
		let mut tree = Tree::new(sb.inode_count as u32);
		build_tree(&mut image, &sb, &inodes, &mut tree, ROOT_INODE)?;
		Ok(Self { image, sb, bitmap, inodes, tree })
	}

	pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
		let (parent_id, leaf) = path::split_parent_leaf(&self.tree, path)?;
		if self.tree.name_exists(parent_id, leaf) {
			return Err(FsError::Exist);
		}
		let new_id = inode::find_free(&self.inodes)?;
		let block = self.bitmap.allocate(&mut self.image, &self.sb, 1)?[0];
		self.zero_block(block)?;

		let new_inode = Inode {
			nodeid: new_id as i32,
			is_directory: true,
			references: 1,
			file_size: 0,
			direct: [block as i32, FREE, FREE, FREE, FREE],
			indirect1: FREE,
			indirect2: FREE,
		};
		inode::write(&mut self.image, &self.sb, new_id, &new_inode)?;
		self.inodes[new_id as usize] = new_inode;

		if let Err(e) = dirstore::insert(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			parent_id,
			&mut self.inodes[parent_id as usize],
			DirEntry { name: leaf.to_string(), inode_id: new_id },
		) {
			self.rollback_new_inode(new_id, &[block])?;
			return Err(e);
		}
		self.tree.add_subdir(parent_id, leaf, new_id);
		Ok(())
	}

	pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
		let (parent_id, leaf) = path::split_parent_leaf(&self.tree, path)?;
		let child_id = self
			.tree
			.find_subdir(parent_id, leaf)
			.ok_or(FsError::NotFound(NotFoundKind::File))?;
		if !self.tree.is_empty_dir(child_id) {
			return Err(FsError::NotEmpty);
		}

		dirstore::remove(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			parent_id,
			&mut self.inodes[parent_id as usize],
			leaf,
		)?;

		let child_inode = self.inodes[child_id as usize];
		let blocks = block_addr::all_referenced(&mut self.image, &self.sb, &child_inode)?;
		self.bitmap.free_many(&mut self.image, &self.sb, &blocks)?;
		self.inodes[child_id as usize] = Inode::free_slot();
		inode::write(&mut self.image, &self.sb, child_id, &Inode::free_slot())?;

		self.tree.remove_subdir(parent_id, child_id);
		if self.tree.cwd == child_id {
			self.tree.cwd = parent_id;
		}
		Ok(())
	}

	pub fn ls(&mut self, path: &str) -> FsResult<String> {
		let dir_id = path::resolve_dir(&self.tree, path)?;
		let node = self.tree.get(dir_id).ok_or(FsError::NotFound(NotFoundKind::Path))?;
		let mut out = String::new();
		for (name, _) in &node.child_dirs {
			out.push('+');
			out.push_str(name);
			out.push('\n');
		}
		for (name, _) in &node.child_files {
			out.push('-');
			out.push_str(name);
			out.push('\n');
		}
		Ok(out)
	}

	pub fn cd(&mut self, path: &str) -> FsResult<()> {
		let dir_id = path::resolve_dir(&self.tree, path)?;
		self.tree.cwd = dir_id;
		Ok(())
	}

	pub fn pwd(&self) -> String {
		let components = self.tree.path_of(self.tree.cwd);
		if components.is_empty() {
			"/".to_string()
		} else {
			format!("/{}", components.join("/"))
		}
	}

	/// `name - size - inode - <direct blocks..., then indirect-table
	/// payload...>`, stopping wherever the block chain itself stops (spec
	/// §4.6; grounded on `print_info` in the original source, which prints
	/// the direct chain up to its first `FREE` and only descends into an
	/// indirect table when the direct chain in front of it is full).
	pub fn info(&mut self, path: &str) -> FsResult<String> {
		let (_, name, id) = self.resolve_file(path)?;
		let node = self.inodes[id as usize];
		let blocks = block_addr::referenced_blocks(&mut self.image, &self.sb, &node)?;
		let mut out = format!("{name} - {}B - i-node {id} -", node.file_size);
		for b in blocks {
			out.push_str(&format!(" {b}"));
		}
		Ok(out)
	}

	pub fn cat(&mut self, path: &str) -> FsResult<Vec<u8>> {
		let (_, _, id) = self.resolve_file(path)?;
		let node = self.inodes[id as usize];
		self.read_file_bytes(&node)
	}

	pub fn cp(&mut self, src: &str, dst: &str) -> FsResult<()> {
		let (_, _, src_id) = self.resolve_file(src)?;
		let src_inode = self.inodes[src_id as usize];
		let bytes = self.read_file_bytes(&src_inode)?;
		let (dst_dir_id, name) = path::resolve_install_dest(&self.tree, dst, leaf_component(src)?)?;
		self.install_file(dst_dir_id, name, &bytes)
	}

	pub fn mv(&mut self, src: &str, dst: &str) -> FsResult<()> {
		let (src_parent, name, file_id) = self.resolve_file(src)?;
		let dst_dir_id = path::resolve_dir(&self.tree, dst)?;
		if dst_dir_id == src_parent {
			return Ok(());
		}
		if self.tree.name_exists(dst_dir_id, &name) {
			return Err(FsError::Exist);
		}
		let size = self.inodes[file_id as usize].file_size;

		dirstore::remove(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			src_parent,
			&mut self.inodes[src_parent as usize],
			&name,
		)?;
		self.update_sizes(src_parent, -size)?;

		dirstore::insert(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			dst_dir_id,
			&mut self.inodes[dst_dir_id as usize],
			DirEntry { name: name.clone(), inode_id: file_id },
		)?;
		self.tree.move_file(src_parent, dst_dir_id, &name, file_id);
		self.update_sizes(dst_dir_id, size)?;
		Ok(())
	}

	pub fn rm(&mut self, path: &str) -> FsResult<()> {
		let (parent_id, name, file_id) = self.resolve_file(path)?;
		let file_inode = self.inodes[file_id as usize];
		let blocks = block_addr::all_referenced(&mut self.image, &self.sb, &file_inode)?;
		self.bitmap.free_many(&mut self.image, &self.sb, &blocks)?;

		dirstore::remove(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			parent_id,
			&mut self.inodes[parent_id as usize],
			&name,
		)?;
		self.inodes[file_id as usize] = Inode::free_slot();
		inode::write(&mut self.image, &self.sb, file_id, &Inode::free_slot())?;
		self.tree.remove_file(parent_id, &name);
		self.update_sizes(parent_id, -file_inode.file_size)?;
		Ok(())
	}

	/// Copies a host file into the image (spec §4.6's `incp`). Rejects
	/// before allocating anything if the host file exceeds `MAX_FILE_SIZE`.
	/// `dst` may name an existing directory (the new entry keeps the host
	/// file's own name) or a `parent/new-name` path (spec §8's
	/// `incp host.bin /a/f`, which must create `f` under `/a`).
	pub fn incp(&mut self, host_path: &Path, dst: &str) -> FsResult<()> {
		let bytes = fs::read(host_path).map_err(FsError::Io)?;
		if bytes.len() as u64 > MAX_FILE_SIZE {
			return Err(FsError::TooLarge);
		}
		let host_name = host_path
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or(FsError::NotFound(NotFoundKind::File))?;
		let (dst_dir_id, name) = path::resolve_install_dest(&self.tree, dst, host_name)?;
		self.install_file(dst_dir_id, name, &bytes)
	}

	/// Exports the in-image file `src` to `<host_dir>/<name>` (spec §4.6's
	/// `outcp`).
	pub fn outcp(&mut self, src: &str, host_dir: &Path) -> FsResult<()> {
		let (_, name, id) = self.resolve_file(src)?;
		let node = self.inodes[id as usize];
		let bytes = self.read_file_bytes(&node)?;
		fs::write(host_dir.join(&name), bytes).map_err(FsError::Io)
	}

	pub fn defrag(&mut self) -> FsResult<()> {
		defrag::run(&mut self.image, &self.sb, &mut self.bitmap, &mut self.inodes)
	}

	/// Reclaims the underlying image handle, e.g. so `format` can reuse the
	/// same open file instead of reopening it for a re-format (spec §4.1,
	/// grounded on the original's `format()` reusing its already-open `fs`
	/// handle on every call, first or repeat).
	pub fn into_image(self) -> Image {
		self.image
	}

	// -- internal helpers -------------------------------------------------

	fn resolve_file(&self, path: &str) -> FsResult<(u32, String, u32)> {
		let (parent_id, leaf) = path::split_parent_leaf(&self.tree, path)?;
		let id = self
			.tree
			.find_file(parent_id, leaf)
			.ok_or(FsError::NotFound(NotFoundKind::File))?;
		Ok((parent_id, leaf.to_string(), id))
	}

	fn read_file_bytes(&mut self, node: &Inode) -> FsResult<Vec<u8>> {
		let size = node.file_size as u32;
		if size == 0 {
			return Ok(Vec::new());
		}
		let logical = block_addr::logical_count(size);
		let tail = block_addr::tail_len(size);
		let blocks = block_addr::referenced_blocks(&mut self.image, &self.sb, node)?;
		let mut out = Vec::with_capacity(size as usize);
		for (i, &block) in blocks.iter().take(logical as usize).enumerate() {
			let mut buf = [0u8; BLOCK_SIZE as usize];
			self.image.read_at(self.sb.data_block_offset(block), &mut buf)?;
			let take = if i as u32 + 1 == logical { tail } else { BLOCK_SIZE };
			out.extend_from_slice(&buf[..take as usize]);
		}
		Ok(out)
	}

	/// Allocates a fresh i-node and data blocks for `bytes`, links it into
	/// `dst_dir_id` under `name`, and rolls up ancestor sizes. Shared by
	/// `cp` and `incp` (spec §4.6).
	fn install_file(&mut self, dst_dir_id: u32, name: &str, bytes: &[u8]) -> FsResult<()> {
		if self.tree.name_exists(dst_dir_id, name) {
			return Err(FsError::Exist);
		}
		let new_id = inode::find_free(&self.inodes)?;

		let size = bytes.len() as u32;
		let logical = block_addr::logical_count(size);
		let total = block_addr::blocks_needed(logical);
		let pool = self.bitmap.allocate(&mut self.image, &self.sb, total)?;
		let placement = block_addr::place(logical, &pool);

		let mut new_inode = Inode {
			nodeid: new_id as i32,
			is_directory: false,
			references: 1,
			file_size: size as i32,
			direct: [FREE; DIRECT_COUNT],
			indirect1: FREE,
			indirect2: FREE,
		};
		block_addr::apply_placement(&mut self.image, &self.sb, &mut new_inode, &placement)?;
		inode::write(&mut self.image, &self.sb, new_id, &new_inode)?;
		self.inodes[new_id as usize] = new_inode;

		let data_blocks = block_addr::referenced_blocks(&mut self.image, &self.sb, &new_inode)?;
		let tail = block_addr::tail_len(size);
		for (i, &block) in data_blocks.iter().enumerate() {
			let mut buf = [0u8; BLOCK_SIZE as usize];
			let start = i * BLOCK_SIZE as usize;
			let take = if i as u32 + 1 == logical { tail as usize } else { BLOCK_SIZE as usize };
			buf[..take].copy_from_slice(&bytes[start..start + take]);
			self.image.write_at(self.sb.data_block_offset(block), &buf)?;
		}

		if let Err(e) = dirstore::insert(
			&mut self.image,
			&self.sb,
			&mut self.bitmap,
			dst_dir_id,
			&mut self.inodes[dst_dir_id as usize],
			DirEntry { name: name.to_string(), inode_id: new_id },
		) {
			self.rollback_new_inode(new_id, &pool)?;
			return Err(e);
		}
		self.tree.add_file(dst_dir_id, name, new_id);
		self.update_sizes(dst_dir_id, size as i32)?;
		Ok(())
	}

	/// Unwinds a freshly allocated i-node and its data blocks when linking
	/// it into its parent directory fails after both were already
	/// committed, so no allocation outlives the operation that reserved it
	/// (spec §7).
	fn rollback_new_inode(&mut self, id: u32, blocks: &[u32]) -> FsResult<()> {
		self.bitmap.free_many(&mut self.image, &self.sb, blocks)?;
		self.inodes[id as usize] = Inode::free_slot();
		inode::write(&mut self.image, &self.sb, id, &Inode::free_slot())?;
		Ok(())
	}

	/// Walks from `start_dir` up to and including the root, adding `delta`
	/// to each ancestor's `file_size` and persisting the i-node immediately
	/// (spec §3, "`update_sizes`").
	fn update_sizes(&mut self, start_dir: u32, delta: i32) -> FsResult<()> {
		let mut id = start_dir;
		loop {
			self.inodes[id as usize].file_size += delta;
			let node = self.inodes[id as usize];
			inode::write(&mut self.image, &self.sb, id, &node)?;
			if id == ROOT_INODE {
				break;
			}
			id = self.tree.get(id).map(|n| n.parent).unwrap_or(ROOT_INODE);
		}
		Ok(())
	}

	fn zero_block(&mut self, block: u32) -> FsResult<()> {
		let zeros = [0u8; BLOCK_SIZE as usize];
		self.image.write_at(self.sb.data_block_offset(block), &zeros)?;
		Ok(())
	}
}

fn leaf_component(path: &str) -> FsResult<&str> {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(pos) => {
			let leaf = &trimmed[pos + 1..];
			if leaf.is_empty() {
				Err(FsError::NotFound(NotFoundKind::Path))
			} else {
				Ok(leaf)
			}
		}
		None if trimmed.is_empty() => Err(FsError::NotFound(NotFoundKind::Path)),
		None => Ok(trimmed),
	}
}

fn build_tree(image: &mut Image, sb: &Superblock, inodes: &[Inode], tree: &mut Tree, dir_id: u32) -> FsResult<()> {
	let entries = dirstore::list(image, sb, &inodes[dir_id as usize])?;
	for entry in entries {
		let child = &inodes[entry.inode_id as usize];
		if child.is_directory {
			tree.add_subdir(dir_id, &entry.name, entry.inode_id);
			build_tree(image, sb, inodes, tree, entry.inode_id)?;
		} else {
			tree.add_file(dir_id, &entry.name, entry.inode_id);
		}
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use std::fs::OpenOptions;
	use tempfile::tempdir;

	fn new_fs(size: u64) -> (Filesystem, tempfile::TempDir) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("image.bin");
		let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
		(Filesystem::format(Image::new(file), size).unwrap(), dir)
	}

	#[test]
	fn mkdir_then_ls_shows_entry() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		assert_eq!(fs.ls("/").unwrap(), "+a\n");
	}

	#[test]
	fn mkdir_twice_is_exist() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		assert!(matches!(fs.mkdir("/a"), Err(FsError::Exist)));
	}

	#[test]
	fn rmdir_nonempty_is_not_empty() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		fs.mkdir("/a/b").unwrap();
		assert!(matches!(fs.rmdir("/a"), Err(FsError::NotEmpty)));
	}

	#[test]
	fn rmdir_then_ls_empty() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		fs.rmdir("/a").unwrap();
		assert_eq!(fs.ls("/").unwrap(), "");
	}

	#[test]
	fn cd_and_pwd_roundtrip() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		fs.mkdir("/a/b").unwrap();
		fs.cd("/a/b").unwrap();
		assert_eq!(fs.pwd(), "/a/b");
	}

	#[test]
	fn install_file_then_cat_roundtrips_bytes() {
		let (mut fs, _guard) = new_fs(1_000_000);
		let payload = vec![7u8; 5_000];
		fs.install_file(ROOT_INODE, "host.bin", &payload).unwrap();
		assert_eq!(fs.cat("/host.bin").unwrap(), payload);
	}

	#[test]
	fn large_file_uses_indirect_tables() {
		let (mut fs, _guard) = new_fs(4_000_000);
		let payload = vec![9u8; 300_000];
		fs.install_file(ROOT_INODE, "big.bin", &payload).unwrap();
		let id = fs.tree.find_file(ROOT_INODE, "big.bin").unwrap();
		let node = fs.inodes[id as usize];
		assert_ne!(node.indirect1, FREE);
		assert_eq!(node.indirect2, FREE);
	}

	#[test]
	fn file_at_exactly_max_size_succeeds() {
		let (mut fs, _guard) = new_fs(8_000_000);
		let ok_payload = vec![1u8; MAX_FILE_SIZE as usize];
		fs.install_file(ROOT_INODE, "huge.bin", &ok_payload).unwrap();
		let id = fs.tree.find_file(ROOT_INODE, "huge.bin").unwrap();
		let node = fs.inodes[id as usize];
		assert_ne!(node.indirect2, FREE);
	}

	#[test]
	fn rm_then_ancestor_size_drops_back_to_zero() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.install_file(ROOT_INODE, "f", &vec![1u8; 100]).unwrap();
		assert_eq!(fs.inodes[ROOT_INODE as usize].file_size, 100);
		fs.rm("/f").unwrap();
		assert_eq!(fs.inodes[ROOT_INODE as usize].file_size, 0);
	}

	#[test]
	fn mv_updates_both_ancestor_sizes() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.mkdir("/a").unwrap();
		fs.install_file(ROOT_INODE, "f", &vec![1u8; 100]).unwrap();
		fs.mv("/f", "/a").unwrap();
		let a_id = fs.tree.find_subdir(ROOT_INODE, "a").unwrap();
		assert_eq!(fs.inodes[a_id as usize].file_size, 100);
		assert_eq!(fs.inodes[ROOT_INODE as usize].file_size, 100);
		assert!(fs.tree.find_file(ROOT_INODE, "f").is_none());
	}

	#[test]
	fn mv_into_same_directory_is_a_no_op_success() {
		let (mut fs, _guard) = new_fs(1_000_000);
		fs.install_file(ROOT_INODE, "f", &vec![1u8; 10]).unwrap();
		fs.mv("/f", "/").unwrap();
		assert!(fs.tree.find_file(ROOT_INODE, "f").is_some());
	}
}
