//! Entry point: opens or creates the image named on the command line,
//! then runs the interactive command loop (spec §6.1–§6.2).

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use inodefs::commands::{self, Outcome};
use inodefs::image::Image;

fn main() -> ExitCode {
	let mut args = env::args_os();
	args.next();
	let Some(image_arg) = args.next() else {
		eprintln!("No argument! Enter the filesystem name.");
		return ExitCode::FAILURE;
	};
	let image_path = PathBuf::from(image_arg);

	println!("Filesystem is running...");

	let already_formatted = image_path.exists();
	if !already_formatted {
		println!("The filesystem has to be formatted first.\nUsage: format [size]");
	}

	let file = match OpenOptions::new().read(true).write(true).create(true).open(&image_path) {
		Ok(f) => f,
		Err(e) => {
			eprintln!("could not open {}: {e}", image_path.display());
			return ExitCode::FAILURE;
		}
	};

	let mut session = match commands::open_session(Image::new(file), already_formatted) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("could not load {}: {e}", image_path.display());
			return ExitCode::FAILURE;
		}
	};

	let stdin = io::stdin();
	let mut console = stdin.lock();
	let mut script: Option<BufReader<File>> = None;

	loop {
		let mut line = String::new();
		let read = match &mut script {
			Some(reader) => reader.read_line(&mut line),
			None => console.read_line(&mut line),
		};
		let bytes_read = match read {
			Ok(n) => n,
			Err(e) => {
				eprintln!("input error: {e}");
				return ExitCode::FAILURE;
			}
		};

		if bytes_read == 0 {
			if script.take().is_some() {
				// End of a `load`-ed script: silently revert to the
				// console, matching the original's `file_input = 0`.
				continue;
			}
			break;
		}
		if script.is_some() {
			print!("{line}");
		}

		match commands::dispatch(&mut session, &line) {
			Outcome::Text(text) => {
				print!("{text}");
				let _ = io::stdout().flush();
			}
			Outcome::LoadScript(path) => match File::open(&path) {
				Ok(f) => {
					println!("OK");
					script = Some(BufReader::new(f));
				}
				Err(_) => println!("FILE NOT FOUND"),
			},
			Outcome::Quit => break,
		}
	}

	ExitCode::SUCCESS
}
