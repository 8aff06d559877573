//! In-memory directory tree: a single arena indexed by i-node id, so
//! parent/child relationships are plain `u32` lookups rather than the
//! pointer chases the original source used (spec §3.5, Design Notes §9).

/// One live directory. `parent` is the i-node id of the enclosing
/// directory (root is its own parent, matching spec §3.5). `child_dirs`
/// and `child_files` mirror the on-disk entry order.
#[derive(Debug, Clone)]
pub struct DirNode {
	pub nodeid: u32,
	pub parent: u32,
	pub name: String,
	pub child_dirs: Vec<(String, u32)>,
	pub child_files: Vec<(String, u32)>,
}

impl DirNode {
	pub fn root() -> Self {
		Self {
			nodeid: crate::layout::ROOT_INODE,
			parent: crate::layout::ROOT_INODE,
			name: String::new(),
			child_dirs: Vec::new(),
			child_files: Vec::new(),
		}
	}
}

/// The tree itself: a table mapping i-node id to [`DirNode`] (only
/// populated for directory i-nodes, per spec §3.5), plus the current
/// working directory's i-node id.
pub struct Tree {
	nodes: Vec<Option<DirNode>>,
	pub cwd: u32,
}

impl Tree {
	pub fn new(inode_count: u32) -> Self {
		let mut nodes = vec![None; inode_count as usize];
		nodes[crate::layout::ROOT_INODE as usize] = Some(DirNode::root());
		Self { nodes, cwd: crate::layout::ROOT_INODE }
	}

	pub fn get(&self, id: u32) -> Option<&DirNode> {
		self.nodes.get(id as usize)?.as_ref()
	}

	pub fn get_mut(&mut self, id: u32) -> Option<&mut DirNode> {
		self.nodes.get_mut(id as usize)?.as_mut()
	}

	/// Registers a freshly created subdirectory as a live node and records
	/// it as a child of `parent`.
	pub fn add_subdir(&mut self, parent: u32, name: &str, child_id: u32) {
		if let Some(p) = self.get_mut(parent) {
			p.child_dirs.push((name.to_string(), child_id));
		}
		self.nodes[child_id as usize] = Some(DirNode {
			nodeid: child_id,
			parent,
			name: name.to_string(),
			child_dirs: Vec::new(),
			child_files: Vec::new(),
		});
	}

	/// Records a freshly created or moved-in file as a child of `parent`.
	/// Files have no arena entry of their own — only directories do.
	pub fn add_file(&mut self, parent: u32, name: &str, file_id: u32) {
		if let Some(p) = self.get_mut(parent) {
			p.child_files.push((name.to_string(), file_id));
		}
	}

	/// Removes a subdirectory entry from `parent` and drops its arena slot.
	pub fn remove_subdir(&mut self, parent: u32, child_id: u32) {
		if let Some(p) = self.get_mut(parent) {
			p.child_dirs.retain(|(_, id)| *id != child_id);
		}
		self.nodes[child_id as usize] = None;
	}

	/// Removes a file entry from `parent` by name.
	pub fn remove_file(&mut self, parent: u32, name: &str) {
		if let Some(p) = self.get_mut(parent) {
			p.child_files.retain(|(n, _)| n != name);
		}
	}

	/// Renames/moves a file entry from `name` under `old_parent` to the
	/// same name under `new_parent` (used by `mv` within the same tree).
	pub fn move_file(&mut self, old_parent: u32, new_parent: u32, name: &str, file_id: u32) {
		self.remove_file(old_parent, name);
		self.add_file(new_parent, name, file_id);
	}

	pub fn move_subdir(&mut self, old_parent: u32, new_parent: u32, name: &str, child_id: u32) {
		if let Some(p) = self.get_mut(old_parent) {
			p.child_dirs.retain(|(_, id)| *id != child_id);
		}
		if let Some(p) = self.get_mut(new_parent) {
			p.child_dirs.push((name.to_string(), child_id));
		}
		if let Some(node) = self.get_mut(child_id) {
			node.parent = new_parent;
			node.name = name.to_string();
		}
	}

	/// `true` once a directory has no child directories and no child files.
	pub fn is_empty_dir(&self, id: u32) -> bool {
		match self.get(id) {
			Some(n) => n.child_dirs.is_empty() && n.child_files.is_empty(),
			None => true,
		}
	}

	/// Looks up a child directory of `parent` by name.
	pub fn find_subdir(&self, parent: u32, name: &str) -> Option<u32> {
		self.get(parent)?.child_dirs.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
	}

	/// Looks up a child file of `parent` by name.
	pub fn find_file(&self, parent: u32, name: &str) -> Option<u32> {
		self.get(parent)?.child_files.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
	}

	/// `true` if `parent` already has any child (directory or file) named
	/// `name` (spec §3.6: no two entries in one directory share a name).
	pub fn name_exists(&self, parent: u32, name: &str) -> bool {
		self.find_subdir(parent, name).is_some() || self.find_file(parent, name).is_some()
	}

	/// Walks parent pointers from `id` up to and including root, returning
	/// path components root-to-leaf (root itself contributes no component).
	pub fn path_of(&self, mut id: u32) -> Vec<String> {
		let mut components = Vec::new();
		while id != crate::layout::ROOT_INODE {
			let Some(node) = self.get(id) else { break };
			components.push(node.name.clone());
			id = node.parent;
		}
		components.reverse();
		components
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn root_starts_as_cwd_and_is_its_own_parent() {
		let tree = Tree::new(8);
		assert_eq!(tree.cwd, crate::layout::ROOT_INODE);
		assert_eq!(tree.get(0).unwrap().parent, 0);
	}

	#[test]
	fn add_and_find_subdir_roundtrips() {
		let mut tree = Tree::new(8);
		tree.add_subdir(0, "a", 1);
		assert_eq!(tree.find_subdir(0, "a"), Some(1));
		assert!(tree.is_empty_dir(1));
	}

	#[test]
	fn name_exists_checks_both_kinds() {
		let mut tree = Tree::new(8);
		tree.add_subdir(0, "a", 1);
		tree.add_file(0, "b", 2);
		assert!(tree.name_exists(0, "a"));
		assert!(tree.name_exists(0, "b"));
		assert!(!tree.name_exists(0, "c"));
	}

	#[test]
	fn path_of_joins_ancestors_root_to_leaf() {
		let mut tree = Tree::new(8);
		tree.add_subdir(0, "a", 1);
		tree.add_subdir(1, "b", 2);
		assert_eq!(tree.path_of(2), vec!["a".to_string(), "b".to_string()]);
		assert!(tree.path_of(0).is_empty());
	}

	#[test]
	fn remove_subdir_clears_arena_slot() {
		let mut tree = Tree::new(8);
		tree.add_subdir(0, "a", 1);
		tree.remove_subdir(0, 1);
		assert!(tree.get(1).is_none());
		assert!(!tree.name_exists(0, "a"));
	}
}
