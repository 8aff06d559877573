//! Path syntax: `/`-separated components, `.` and `..` recognized, root
//! if the path starts with `/` else the working directory (spec §4.5).

use crate::error::{FsError, FsResult, NotFoundKind};
use crate::layout::ROOT_INODE;
use crate::tree::Tree;

/// Resolves `path` to a directory i-node id, descending one component at
/// a time from root (absolute) or the working directory (relative). Any
/// missing component is reported as [`NotFoundKind::Path`].
pub fn resolve_dir(tree: &Tree, path: &str) -> FsResult<u32> {
	let (mut current, rest) = start(tree, path);
	for component in rest.split('/').filter(|c| !c.is_empty()) {
		current = step(tree, current, component)?;
	}
	Ok(current)
}

/// Splits a "parent-path + leaf-name" request: the leaf is the substring
/// after the last `/`, the parent is everything before it (root if the
/// path has no other `/`). Resolves the parent directory and returns
/// `(parent_id, leaf_name)`.
pub fn split_parent_leaf<'a>(tree: &Tree, path: &'a str) -> FsResult<(u32, &'a str)> {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return Err(FsError::NotFound(NotFoundKind::Path));
	}
	match trimmed.rfind('/') {
		Some(pos) => {
			let parent_path = &trimmed[..=pos];
			let leaf = &trimmed[pos + 1..];
			if leaf.is_empty() {
				return Err(FsError::NotFound(NotFoundKind::Path));
			}
			let parent_path = if parent_path.is_empty() { "/" } else { parent_path };
			Ok((resolve_dir(tree, parent_path)?, leaf))
		}
		None => {
			let parent_id = if trimmed.starts_with('.') {
				resolve_dir(tree, ".")?
			} else {
				tree.cwd
			};
			Ok((parent_id, trimmed))
		}
	}
}

/// Resolves a `cp`/`incp` destination argument, which names either an
/// existing directory to copy into under `fallback_name` (spec §8's
/// `incp host.bin /`, mirroring the original's `find_directory(dest)`) or a
/// `parent/new-name` path whose parent exists but whose leaf does not yet
/// (spec §8's `incp host.bin /a/f`). The directory case is tried first, so
/// a destination that happens to resolve as a directory always keeps its
/// original meaning.
pub fn resolve_install_dest<'a>(tree: &Tree, dst: &'a str, fallback_name: &'a str) -> FsResult<(u32, &'a str)> {
	if let Ok(dir_id) = resolve_dir(tree, dst) {
		return Ok((dir_id, fallback_name));
	}
	split_parent_leaf(tree, dst)
}

fn start<'a>(tree: &Tree, path: &'a str) -> (u32, &'a str) {
	if let Some(rest) = path.strip_prefix('/') {
		(ROOT_INODE, rest)
	} else {
		(tree.cwd, path)
	}
}

fn step(tree: &Tree, current: u32, component: &str) -> FsResult<u32> {
	match component {
		"." => Ok(current),
		".." => Ok(tree.get(current).map(|n| n.parent).unwrap_or(ROOT_INODE)),
		name => tree.find_subdir(current, name).ok_or(FsError::NotFound(NotFoundKind::Path)),
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn sample_tree() -> Tree {
		let mut tree = Tree::new(8);
		tree.add_subdir(0, "a", 1);
		tree.add_subdir(1, "b", 2);
		tree
	}

	#[test]
	fn absolute_path_resolves_from_root() {
		let tree = sample_tree();
		assert_eq!(resolve_dir(&tree, "/a/b").unwrap(), 2);
	}

	#[test]
	fn relative_path_resolves_from_cwd() {
		let mut tree = sample_tree();
		tree.cwd = 1;
		assert_eq!(resolve_dir(&tree, "b").unwrap(), 2);
	}

	#[test]
	fn dot_dot_walks_to_parent() {
		let mut tree = sample_tree();
		tree.cwd = 2;
		assert_eq!(resolve_dir(&tree, "..").unwrap(), 1);
		assert_eq!(resolve_dir(&tree, "../..").unwrap(), 0);
	}

	#[test]
	fn missing_component_is_not_found() {
		let tree = sample_tree();
		assert!(matches!(resolve_dir(&tree, "/a/missing"), Err(FsError::NotFound(NotFoundKind::Path))));
	}

	#[test]
	fn split_parent_leaf_handles_nested_path() {
		let tree = sample_tree();
		let (parent, leaf) = split_parent_leaf(&tree, "/a/b/file.txt").unwrap();
		assert_eq!(parent, 2);
		assert_eq!(leaf, "file.txt");
	}

	#[test]
	fn split_parent_leaf_bare_name_uses_cwd() {
		let mut tree = sample_tree();
		tree.cwd = 1;
		let (parent, leaf) = split_parent_leaf(&tree, "file.txt").unwrap();
		assert_eq!(parent, 1);
		assert_eq!(leaf, "file.txt");
	}

	#[test]
	fn split_parent_leaf_root_level() {
		let tree = sample_tree();
		let (parent, leaf) = split_parent_leaf(&tree, "/a").unwrap();
		assert_eq!(parent, 0);
		assert_eq!(leaf, "a");
	}
}
