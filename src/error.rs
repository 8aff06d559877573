//! Error kinds returned by filesystem operations and their mapping onto the
//! response vocabulary printed by the command dispatcher.

use std::fmt;
use std::io;

/// The five error kinds an operation can fail with, plus a catch-all for
/// unrecoverable image I/O failures.
#[derive(Debug)]
pub enum FsError {
	/// A path component, file, or directory entry does not exist. The
	/// response text depends on which kind of lookup failed, not on a
	/// distinct error kind (spec §7 counts `NotFound` as one kind).
	NotFound(NotFoundKind),
	/// A name collision in the target directory.
	Exist,
	/// `rmdir` on a directory that still has children.
	NotEmpty,
	/// No free i-node or insufficient free data blocks.
	NoSpace,
	/// An `incp` source exceeds the maximum file size.
	TooLarge,
	/// The image is not formatted yet.
	NotFormatted,
	/// A positioned read/write against the image failed.
	Io(io::Error),
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound(_) => write!(f, "not found"),
			Self::Exist => write!(f, "exist"),
			Self::NotEmpty => write!(f, "not empty"),
			Self::NoSpace => write!(f, "filesystem has not enough space"),
			Self::TooLarge => write!(f, "file is too large"),
			Self::NotFormatted => write!(f, "filesystem is not formatted"),
			Self::Io(e) => write!(f, "image I/O error: {e}"),
		}
	}
}

impl std::error::Error for FsError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for FsError {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

pub type FsResult<T> = Result<T, FsError>;

/// Which kind of lookup came up empty: a directory component on the way
/// to the target (`Path`), or the target name itself in its resolved
/// parent directory (`File`). Most operations resolve a parent path first
/// and then look for a leaf name in it, so both kinds show up across a
/// single operation's call sites (e.g. `rmdir`'s parent-path resolution
/// is `Path`, but the child subdirectory lookup inside it is `File`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
	Path,
	File,
}

impl FsError {
	/// The response text from spec §6.3. `Io` has no entry in the response
	/// vocabulary proper; it surfaces the underlying OS error message instead
	/// of a fixed string, since a positioned read/write against the image
	/// can genuinely fail (disk full, permissions revoked mid-session) and
	/// the dispatcher must still be able to print something rather than
	/// panic.
	pub fn response(&self) -> std::borrow::Cow<'static, str> {
		match self {
			Self::NotFound(NotFoundKind::Path) => "PATH NOT FOUND".into(),
			Self::NotFound(NotFoundKind::File) => "FILE NOT FOUND".into(),
			Self::Exist => "EXIST".into(),
			Self::NotEmpty => "NOT EMPTY".into(),
			Self::NoSpace => "FILESYSTEM HAS NOT ENOUGH SPACE".into(),
			Self::TooLarge => "FILE IS TOO LARGE".into(),
			Self::NotFormatted => "The filesystem has to be formatted first.\nUsage: format [size]".into(),
			Self::Io(e) => format!("I/O ERROR: {e}").into(),
		}
	}
}
