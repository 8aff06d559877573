//! The interactive dispatcher: tokenizes one input line, calls the matching
//! [`Filesystem`] operation, and maps its `Result` onto the exact response
//! vocabulary of spec §6.3. Core operations never print (ops.rs's own
//! doc comment); this module is the one place that does.

use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};
use crate::image::Image;
use crate::layout::{MAX_IMAGE_SIZE, MIN_IMAGE_SIZE};
use crate::ops::Filesystem;

/// Whether the image behind a [`Session`] has been formatted yet. Mirrors
/// the original's `fs_formatted` flag, but as a sum type instead of a bool
/// plus a separately-initialized set of globals (Design Notes §9).
enum State {
	Unformatted(Image),
	Ready(Filesystem),
}

pub struct Session {
	state: Option<State>,
}

/// What the dispatcher wants the REPL loop to do after one line.
pub enum Outcome {
	/// Print this text (already newline-terminated) and read the next line
	/// from the current input source.
	Text(String),
	/// Print `OK`, then read subsequent lines from this file until EOF,
	/// then revert to whatever was feeding input before (spec §6.2's
	/// `load`).
	LoadScript(PathBuf),
	Quit,
}

/// Builds a session already positioned in the right state, without
/// emitting a response (there is none for process startup itself — the
/// "format first" notice, when needed, is the CLI's job, see `main.rs`).
/// `already_formatted` mirrors the CLI's own existence check (spec §6.1):
/// an existing image is loaded immediately, a fresh one starts
/// unformatted.
pub fn open_session(image: Image, already_formatted: bool) -> FsResult<Session> {
	let state = if already_formatted {
		State::Ready(Filesystem::load(image)?)
	} else {
		State::Unformatted(image)
	};
	Ok(Session { state: Some(state) })
}

/// Tokenizes `line` (command name, then the rest of the line as a single
/// argument string, per spec §6.2's `strtok(buffer, DELIM)` /
/// `strtok(NULL, "\n")` split) and dispatches it.
pub fn dispatch(session: &mut Session, line: &str) -> Outcome {
	let line = line.trim_end_matches(['\n', '\r']);
	if line.is_empty() {
		return Outcome::Text(String::new());
	}
	let (cmd, args) = match line.split_once(char::is_whitespace) {
		Some((c, rest)) => (c, rest.trim_start()),
		None => (line, ""),
	};

	if cmd == "q" {
		return Outcome::Quit;
	}
	if cmd == "format" {
		return run_format(session, args);
	}

	let State::Ready(fs) = session.state.as_mut().expect("session always holds a state") else {
		return Outcome::Text(not_formatted_text());
	};

	let text = match cmd {
		"mkdir" => respond(fs.mkdir(args)),
		"rmdir" => respond(fs.rmdir(args)),
		"ls" => respond_lines(fs.ls(args)),
		"cd" => respond(fs.cd(args)),
		"pwd" => format!("{}\n", fs.pwd()),
		"info" => respond_string(fs.info(args)),
		"cat" => respond_bytes(fs.cat(args)),
		"cp" => {
			let (src, dst) = split_two(args);
			respond(fs.cp(src, dst))
		}
		"mv" => {
			let (src, dst) = split_two(args);
			respond(fs.mv(src, dst))
		}
		"rm" => respond(fs.rm(args)),
		"incp" => {
			let (host_src, image_dst) = split_two(args);
			respond(fs.incp(Path::new(host_src), image_dst))
		}
		"outcp" => {
			let (image_src, host_dst) = split_two(args);
			respond(fs.outcp(image_src, Path::new(host_dst)))
		}
		"load" => return run_load(args),
		"defrag" => respond(fs.defrag()),
		_ => "UNKNOWN COMMAND\n".to_string(),
	};
	Outcome::Text(text)
}

fn run_format(session: &mut Session, args: &str) -> Outcome {
	let Some(size) = parse_size(args) else {
		return Outcome::Text("CANNOT CREATE FILE\n".to_string());
	};
	let image = match session.state.take().expect("session always holds a state") {
		State::Unformatted(image) => image,
		State::Ready(fs) => fs.into_image(),
	};
	match Filesystem::format(image, size) {
		Ok(fs) => {
			session.state = Some(State::Ready(fs));
			Outcome::Text("OK\n".to_string())
		}
		Err(_) => {
			// Only reachable if `Superblock::for_size`'s own range check
			// disagrees with `parse_size`'s; treated the same as a
			// malformed size (spec §6.3's `format`-specific note).
			Outcome::Text("CANNOT CREATE FILE\n".to_string())
		}
	}
}

fn run_load(args: &str) -> Outcome {
	let path = args.trim();
	if path.is_empty() || !Path::new(path).is_file() {
		return Outcome::Text("FILE NOT FOUND\n".to_string());
	}
	Outcome::LoadScript(PathBuf::from(path))
}

/// Digits optionally followed by a case-sensitive `KB`/`MB`/`GB` suffix
/// (decimal multipliers), then range-checked against the image size
/// bounds — grounded on `get_size` in the original source, which folds a
/// parse failure, a zero value, and an out-of-range value into the same
/// `CANNOT CREATE FILE` response.
fn parse_size(args: &str) -> Option<u64> {
	let s = args.trim();
	let digit_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
	if digit_end == 0 {
		return None;
	}
	let (digits, suffix) = s.split_at(digit_end);
	let mut number: u64 = digits.parse().ok()?;
	if number == 0 {
		return None;
	}
	if suffix.starts_with("KB") {
		number = number.checked_mul(1_000)?;
	} else if suffix.starts_with("MB") {
		number = number.checked_mul(1_000_000)?;
	} else if suffix.starts_with("GB") {
		number = number.checked_mul(1_000_000_000)?;
	}
	if !(MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE).contains(&number) {
		return None;
	}
	Some(number)
}

fn split_two(args: &str) -> (&str, &str) {
	match args.split_once(char::is_whitespace) {
		Some((a, b)) => (a, b.trim_start()),
		None => (args, ""),
	}
}

fn respond(result: Result<(), FsError>) -> String {
	match result {
		Ok(()) => "OK\n".to_string(),
		Err(e) => format!("{}\n", e.response()),
	}
}

fn respond_string(result: Result<String, FsError>) -> String {
	match result {
		Ok(s) => format!("{s}\n"),
		Err(e) => format!("{}\n", e.response()),
	}
}

/// Like [`respond`] but for a listing that is already newline-per-entry
/// terminated (or empty for an empty directory) — an extra newline here
/// would print a blank line after every `ls` (grounded on the original's
/// `ls`, which prints nothing at all for an empty directory).
fn respond_lines(result: Result<String, FsError>) -> String {
	match result {
		Ok(s) => s,
		Err(e) => format!("{}\n", e.response()),
	}
}

fn respond_bytes(result: Result<Vec<u8>, FsError>) -> String {
	match result {
		Ok(bytes) => format!("{}\n", String::from_utf8_lossy(&bytes)),
		Err(e) => format!("{}\n", e.response()),
	}
}

fn not_formatted_text() -> String {
	format!("{}\n", FsError::NotFormatted.response())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_size_rejects_non_numeric_input() {
		assert_eq!(parse_size("oops"), None);
	}

	#[test]
	fn parse_size_applies_suffix_multiplier() {
		assert_eq!(parse_size("5KB"), Some(5_000));
		assert_eq!(parse_size("2MB"), Some(2_000_000));
	}

	#[test]
	fn parse_size_rejects_below_minimum() {
		assert_eq!(parse_size("10"), None);
	}

	#[test]
	fn parse_size_rejects_zero() {
		assert_eq!(parse_size("0KB"), None);
	}

	#[test]
	fn parse_size_accepts_bare_digits() {
		assert_eq!(parse_size("20480"), Some(20480));
	}

	#[test]
	fn split_two_trims_the_second_argument() {
		assert_eq!(split_two("/a  /b"), ("/a", "/b"));
	}

	#[test]
	fn commands_before_format_report_not_formatted() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("image.bin");
		let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
		let mut session = open_session(Image::new(file), false).unwrap();
		let response = match dispatch(&mut session, "ls /") {
			Outcome::Text(s) => s,
			_ => panic!("expected a text response"),
		};
		assert_eq!(response, "The filesystem has to be formatted first.\nUsage: format [size]\n");
	}

	#[test]
	fn load_of_a_missing_script_is_reported() {
		match run_load("/no/such/script") {
			Outcome::Text(s) => assert_eq!(s, "FILE NOT FOUND\n"),
			_ => panic!("expected a text response"),
		}
	}
}
