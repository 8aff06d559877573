//! Core library for the i-node filesystem simulator: on-disk layout,
//! allocators, block addressing, directory storage, path resolution, the
//! operations surface, the defragmenter, and the command dispatcher.
//! `main.rs` is the only piece of this crate that does terminal I/O.

pub mod bitmap;
pub mod block_addr;
pub mod commands;
pub mod defrag;
pub mod dirstore;
pub mod error;
pub mod image;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod path;
pub mod tree;
