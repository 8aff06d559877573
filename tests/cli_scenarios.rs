//! Multi-operation end-to-end scenarios (SPEC_FULL.md §8), driven through
//! the same `dispatch()` entry point `main.rs` uses so assertions see the
//! literal response text a user would, not just `Filesystem`'s return
//! values.

use std::fs::{self, OpenOptions};

use inodefs::commands::{self, Outcome};
use inodefs::image::Image;

fn text(outcome: Outcome) -> String {
    match outcome {
        Outcome::Text(s) => s,
        Outcome::LoadScript(_) => panic!("unexpected load"),
        Outcome::Quit => panic!("unexpected quit"),
    }
}

fn fresh_session(size_bytes: &str) -> (commands::Session, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.bin");
    let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
    let mut session = commands::open_session(Image::new(file), false).unwrap();
    assert_eq!(text(commands::dispatch(&mut session, &format!("format {size_bytes}"))), "OK\n");
    (session, dir)
}

#[test]
fn mkdir_and_ls_show_the_new_entry() {
    let (mut session, _guard) = fresh_session("1000000");
    assert_eq!(text(commands::dispatch(&mut session, "mkdir /a")), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "ls /")), "+a\n");
}

#[test]
fn incp_small_file_uses_only_direct_blocks() {
    let (mut session, guard) = fresh_session("1000000");
    let host_path = guard.path().join("small.bin");
    fs::write(&host_path, vec![0xABu8; 5000]).unwrap();

    let cmd = format!("incp {} /small.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");

    let info = text(commands::dispatch(&mut session, "info /small.bin"));
    assert!(info.starts_with("small.bin - 5000B - i-node"));
    let block_count = info.trim_end().rsplit(" - ").next().unwrap().split_whitespace().count();
    assert_eq!(block_count, 5);
}

#[test]
fn incp_medium_file_spills_into_one_indirect_table() {
    let (mut session, guard) = fresh_session("4000000");
    let host_path = guard.path().join("medium.bin");
    fs::write(&host_path, vec![0x11u8; 200_000]).unwrap();

    let cmd = format!("incp {} /medium.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");

    let info = text(commands::dispatch(&mut session, "info /medium.bin"));
    let blocks = info.trim_end().rsplit(" - ").next().unwrap().split_whitespace().count();
    // 200000 bytes -> 196 logical blocks: 5 direct + 191 via indirect1
    // (indirect1 holds up to 256 entries, so indirect2 stays unused).
    assert_eq!(blocks, 196);
}

#[test]
fn incp_file_using_both_indirect_tables_round_trips() {
    let (mut session, guard) = fresh_session("8000000");
    let host_path = guard.path().join("big.bin");
    let payload = vec![0x22u8; 529_408]; // exactly MAX_FILE_SIZE
    fs::write(&host_path, &payload).unwrap();

    let cmd = format!("incp {} /big.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");

    let cat = text(commands::dispatch(&mut session, "cat /big.bin"));
    assert_eq!(cat.trim_end_matches('\n').as_bytes(), payload.as_slice());
}

#[test]
fn incp_oversized_file_is_rejected() {
    let (mut session, guard) = fresh_session("8000000");
    let host_path = guard.path().join("toobig.bin");
    fs::write(&host_path, vec![0x33u8; 529_409]).unwrap();

    let cmd = format!("incp {} /toobig.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "FILE IS TOO LARGE\n");
}

#[test]
fn mkdir_on_existing_name_is_exist() {
    let (mut session, _guard) = fresh_session("1000000");
    assert_eq!(text(commands::dispatch(&mut session, "mkdir /a")), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "mkdir /a")), "EXIST\n");
}

#[test]
fn rmdir_nonempty_directory_is_refused() {
    let (mut session, guard) = fresh_session("1000000");
    assert_eq!(text(commands::dispatch(&mut session, "mkdir /a")), "OK\n");
    let host_path = guard.path().join("f.bin");
    fs::write(&host_path, vec![0u8; 10]).unwrap();
    let cmd = format!("incp {} /a/f.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "rmdir /a")), "NOT EMPTY\n");
}

#[test]
fn defrag_after_fragmentation_leaves_files_readable() {
    let (mut session, guard) = fresh_session("1000000");
    for i in 0..4 {
        let host_path = guard.path().join(format!("f{i}.bin"));
        fs::write(&host_path, vec![i as u8; 1200]).unwrap();
        let cmd = format!("incp {} /f{i}.bin", host_path.display());
        assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");
    }
    // Removing the odd files fragments the block space between the evens.
    assert_eq!(text(commands::dispatch(&mut session, "rm /f1.bin")), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "rm /f3.bin")), "OK\n");

    assert_eq!(text(commands::dispatch(&mut session, "defrag")), "OK\n");

    for i in [0u8, 2] {
        let cat = text(commands::dispatch(&mut session, &format!("cat /f{i}.bin")));
        assert_eq!(cat.trim_end_matches('\n').as_bytes(), vec![i; 1200].as_slice());
    }
}

#[test]
fn format_rejects_a_size_below_the_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.bin");
    let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
    let mut session = commands::open_session(Image::new(file), false).unwrap();
    assert_eq!(text(commands::dispatch(&mut session, "format 10")), "CANNOT CREATE FILE\n");
}

#[test]
fn mv_then_rm_round_trips_through_the_dispatcher() {
    let (mut session, guard) = fresh_session("1000000");
    assert_eq!(text(commands::dispatch(&mut session, "mkdir /a")), "OK\n");
    let host_path = guard.path().join("f.bin");
    fs::write(&host_path, vec![7u8; 50]).unwrap();
    let cmd = format!("incp {} /f.bin", host_path.display());
    assert_eq!(text(commands::dispatch(&mut session, &cmd)), "OK\n");

    assert_eq!(text(commands::dispatch(&mut session, "mv /f.bin /a")), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "ls /")), "+a\n");
    assert_eq!(text(commands::dispatch(&mut session, "ls /a")), "-f.bin\n");

    assert_eq!(text(commands::dispatch(&mut session, "rm /a/f.bin")), "OK\n");
    assert_eq!(text(commands::dispatch(&mut session, "ls /a")), "");
}
