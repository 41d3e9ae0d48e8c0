//! Power-loss scenarios. The RAM device stages writes until `commit`, so a
//! commit-failure fuse leaves flash in the exact image a power cut at that
//! point would, and the next mount has to recover from it.

#![allow(unused)]

mod common;

use std::sync::Arc;

use common::{init_logging, RamFlash, BLOCK_DATA_CAPACITY, NUM_BLOCKS};
use ember::{Error, FlashFs};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn fresh_fs() -> (Arc<RamFlash>, FlashFs<RamFlash>) {
    init_logging();
    let dev = Arc::new(RamFlash::new(NUM_BLOCKS));
    FlashFs::format(Arc::clone(&dev)).unwrap();
    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    (dev, fs)
}

fn write_file(fs: &FlashFs<RamFlash>, name: &str, data: &[u8]) {
    let mut wf = fs.open_write(name).unwrap();
    fs.write(&mut wf, data).unwrap();
    fs.close_write(wf).unwrap();
}

fn read_file(fs: &FlashFs<RamFlash>, name: &str) -> Vec<u8> {
    let mut rf = fs.open_read(name).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 200];
    loop {
        let n = fs.read(&mut rf, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    fs.close_read(rf);
    out
}

// Commit schedule for writing BLOCK_DATA_CAPACITY + 1 bytes into a fresh
// volume, with this geometry (6 data sectors per block):
//   1        inode entry (open_write)
//   2 .. 7   six full data sectors
//   8        tail record linking the successor block
//   9        successor block header
// The byte that spills over stays staged in RAM until a later flush.

/// Power cut between the tail record and the successor's header. The tail is
/// the only durable witness of the allocation, and mount re-initializes the
/// claimed-but-headerless block from it.
#[test]
fn test_repair_interrupted_chain_extension() {
    let (dev, fs) = fresh_fs();
    let data = pattern(BLOCK_DATA_CAPACITY + 1, 11);
    let mut wf = fs.open_write("big").unwrap();
    dev.fail_after_commits(7);
    assert_eq!(fs.write(&mut wf, &data), Err(Error::IoError));
    drop(wf);
    drop(fs);

    dev.clear_failure();
    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    // Everything committed before the cut survives.
    assert_eq!(read_file(&fs, "big"), &data[..BLOCK_DATA_CAPACITY]);

    // The repaired block belongs to the file now; the volume keeps working.
    write_file(&fs, "after", b"life goes on");
    assert_eq!(read_file(&fs, "after"), b"life goes on");
}

/// Power cut right before the tail record: the successor block was claimed
/// but nothing about it reached flash. The file simply ends at its last
/// committed sector and no repair is needed.
#[test]
fn test_interrupted_tail_write() {
    let (dev, fs) = fresh_fs();
    let data = pattern(BLOCK_DATA_CAPACITY + 1, 12);
    let mut wf = fs.open_write("big").unwrap();
    dev.fail_after_commits(6);
    assert_eq!(fs.write(&mut wf, &data), Err(Error::IoError));
    drop(wf);
    drop(fs);

    dev.clear_failure();
    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    assert_eq!(read_file(&fs, "big"), &data[..BLOCK_DATA_CAPACITY]);
}

/// The inode entry commits before the first block's header, which only
/// reaches flash with the first data flush. A cut between the two leaves a
/// live file whose first block is blank; mount re-initializes it and the
/// file reads as empty.
#[test]
fn test_repair_entry_without_block_header() {
    let (dev, fs) = fresh_fs();
    let wf = fs.open_write("ghost").unwrap();
    // Session abandoned; the staged sector 0 (header included) is lost.
    drop(wf);
    drop(fs);

    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    assert_eq!(fs.max_file_id(), 1);
    assert_eq!(read_file(&fs, "ghost"), Vec::<u8>::new());
    // The repaired block is headered for the file, so it is no longer free.
    assert_eq!(fs.free_blocks() as usize, NUM_BLOCKS - 2);
}

/// Power cut before the inode entry commits: the creation never happened.
#[test]
fn test_interrupted_creation_leaves_nothing() {
    let (dev, fs) = fresh_fs();
    dev.fail_after_commits(0);
    assert_eq!(fs.open_write("never").err(), Some(Error::IoError));
    drop(fs);

    dev.clear_failure();
    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    assert_eq!(fs.max_file_id(), 0);
    assert_eq!(fs.open_read("never").err(), Some(Error::FileNotFound));
    assert_eq!(fs.free_blocks() as usize, NUM_BLOCKS - 1);
}

/// Deletion writes the inode-level record first, then invalidates the data
/// blocks with the terminal block last. A cut after the inode record leaves
/// the terminal block alive, which the next mount refuses to paper over.
#[test]
fn test_incomplete_deletion_single_block() {
    let (dev, fs) = fresh_fs();
    write_file(&fs, "doomed", &pattern(100, 13));
    // One commit for the inode invalidation record, then the cut lands
    // before the block's own invalidation sector.
    dev.fail_after_commits(1);
    assert_eq!(fs.rm("doomed"), Err(Error::IoError));
    drop(fs);

    dev.clear_failure();
    assert_eq!(
        FlashFs::mount(Arc::clone(&dev)).err(),
        Some(Error::IncompleteDeletion)
    );
}

/// Same, across a block chain: the first block gets invalidated but the
/// terminal one does not.
#[test]
fn test_incomplete_deletion_multi_block() {
    let (dev, fs) = fresh_fs();
    write_file(&fs, "doomed", &pattern(BLOCK_DATA_CAPACITY + 10, 14));
    dev.fail_after_commits(2);
    assert_eq!(fs.rm("doomed"), Err(Error::IoError));
    drop(fs);

    dev.clear_failure();
    assert_eq!(
        FlashFs::mount(Arc::clone(&dev)).err(),
        Some(Error::IncompleteDeletion)
    );
}

/// A cut before even the inode record commits is harmless: the file is
/// still fully live after remount.
#[test]
fn test_interrupted_deletion_before_inode_record() {
    let (dev, fs) = fresh_fs();
    let data = pattern(700, 15);
    write_file(&fs, "survivor", &data);
    dev.fail_after_commits(0);
    assert_eq!(fs.rm("survivor"), Err(Error::IoError));
    drop(fs);

    dev.clear_failure();
    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    assert_eq!(read_file(&fs, "survivor"), data);
}

/// A deletion that ran to completion passes the mount check.
#[test]
fn test_completed_deletion_mounts_clean() {
    let (dev, fs) = fresh_fs();
    write_file(&fs, "gone", &pattern(BLOCK_DATA_CAPACITY + 10, 16));
    fs.rm("gone").unwrap();
    drop(fs);

    let fs = FlashFs::mount(Arc::clone(&dev)).unwrap();
    assert_eq!(fs.open_read("gone").err(), Some(Error::FileNotFound));
    write_file(&fs, "next", b"still writable");
    assert_eq!(read_file(&fs, "next"), b"still writable");
}
