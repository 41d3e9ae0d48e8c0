//! Common utilities for tests: an in-RAM flash device with erase-to-0xFF
//! semantics, per-sector spare areas, a bad-block list, and a commit-staging
//! model so a commit-failure fuse produces exact crash images.

use std::sync::Mutex;

use ember::{FlashDevice, FsError, SECTOR_SIZE, SPARE_SIZE};

pub const NUM_BLOCKS: usize = 16;
pub const PAGES_PER_BLOCK: usize = 2;
pub const SECTORS_PER_PAGE: usize = 4;
pub const SECTORS_PER_BLOCK: usize = PAGES_PER_BLOCK * SECTORS_PER_PAGE;

/// Data bytes a file block can hold with this geometry: sector 0 shares with
/// the 8-byte header, two page-0 sectors are reserved for tail records.
pub const BLOCK_DATA_CAPACITY: usize = (SECTOR_SIZE - 8) + 5 * SECTOR_SIZE;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A staged write not yet made durable by `commit`.
enum Staged {
    Main { at: usize, data: Vec<u8> },
    Spare { at: usize, data: Vec<u8> },
}

struct Inner {
    main: Vec<u8>,
    spare: Vec<u8>,
    open: Option<(u16, u16)>,
    staged: Vec<Staged>,
    /// `Some(n)`: n more commits succeed, then every mutation fails and
    /// staged writes are lost, like a power cut.
    commits_left: Option<u32>,
    bad: Vec<u16>,
    open_calls: u32,
}

impl Inner {
    fn tripped(&self) -> bool {
        self.commits_left == Some(0)
    }
}

pub struct RamFlash {
    num_blocks: usize,
    inner: Mutex<Inner>,
}

impl RamFlash {
    /// A factory-fresh device: every byte reads erased (0xFF).
    pub fn new(num_blocks: usize) -> Self {
        let sectors = num_blocks * SECTORS_PER_BLOCK;
        RamFlash {
            num_blocks,
            inner: Mutex::new(Inner {
                main: vec![0xFF; sectors * SECTOR_SIZE],
                spare: vec![0xFF; sectors * SPARE_SIZE],
                open: None,
                staged: Vec::new(),
                commits_left: None,
                bad: Vec::new(),
                open_calls: 0,
            }),
        }
    }

    /// Allows `n` more commits to succeed; after that the device behaves as
    /// if power was cut (mutations fail, staged writes are discarded).
    pub fn fail_after_commits(&self, n: u32) {
        self.inner.lock().unwrap().commits_left = Some(n);
    }

    /// "Power comes back": the fuse is reset, durable state is kept.
    pub fn clear_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.commits_left = None;
        inner.staged.clear();
    }

    pub fn mark_bad(&self, block: u16) {
        self.inner.lock().unwrap().bad.push(block);
    }

    pub fn open_calls(&self) -> u32 {
        self.inner.lock().unwrap().open_calls
    }

    fn sector_base(&self, block: u16, sector: u16) -> usize {
        block as usize * SECTORS_PER_BLOCK + sector as usize
    }
}

impl FlashDevice for RamFlash {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn pages_per_block(&self) -> usize {
        PAGES_PER_BLOCK
    }

    fn sectors_per_page(&self) -> usize {
        SECTORS_PER_PAGE
    }

    fn init(&self) -> Result<(), FsError> {
        Ok(())
    }

    fn lock(&self) {}

    fn unlock(&self) {}

    fn open_page(&self, block: u16, page: u16) -> Result<bool, FsError> {
        let mut inner = self.inner.lock().unwrap();
        if block as usize >= self.num_blocks || page as usize >= PAGES_PER_BLOCK {
            return Err(FsError::OutOfBounds);
        }
        inner.open_calls += 1;
        inner.open = Some((block, page));
        Ok(true)
    }

    fn block_is_bad(&self) -> Result<bool, FsError> {
        let inner = self.inner.lock().unwrap();
        match inner.open {
            Some((block, _)) => Ok(inner.bad.contains(&block)),
            None => Err(FsError::IoError),
        }
    }

    fn erase_block(&self, block: u16) -> Result<(), FsError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tripped() {
            return Err(FsError::IoError);
        }
        let first = block as usize * SECTORS_PER_BLOCK;
        let main_range = first * SECTOR_SIZE..(first + SECTORS_PER_BLOCK) * SECTOR_SIZE;
        let spare_range = first * SPARE_SIZE..(first + SECTORS_PER_BLOCK) * SPARE_SIZE;
        inner.main[main_range].fill(0xFF);
        inner.spare[spare_range].fill(0xFF);
        Ok(())
    }

    fn read_sector(&self, buf: &mut [u8], sector: u16, offset: usize) -> Result<(), FsError> {
        let inner = self.inner.lock().unwrap();
        let (block, page) = inner.open.ok_or(FsError::IoError)?;
        assert_eq!(
            page as usize,
            sector as usize / SECTORS_PER_PAGE,
            "sector read outside the staged page"
        );
        let at = self.sector_base(block, sector) * SECTOR_SIZE + offset;
        buf.copy_from_slice(&inner.main[at..at + buf.len()]);
        Ok(())
    }

    fn write_sector(&self, buf: &[u8], sector: u16, offset: usize) -> Result<(), FsError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tripped() {
            return Err(FsError::IoError);
        }
        let (block, page) = inner.open.ok_or(FsError::IoError)?;
        assert_eq!(page as usize, sector as usize / SECTORS_PER_PAGE);
        let at = self.sector_base(block, sector) * SECTOR_SIZE + offset;
        inner.staged.push(Staged::Main {
            at,
            data: buf.to_vec(),
        });
        Ok(())
    }

    fn read_spare(&self, buf: &mut [u8], sector: u16) -> Result<(), FsError> {
        let inner = self.inner.lock().unwrap();
        let (block, _) = inner.open.ok_or(FsError::IoError)?;
        let at = self.sector_base(block, sector) * SPARE_SIZE;
        buf.copy_from_slice(&inner.spare[at..at + buf.len()]);
        Ok(())
    }

    fn write_spare(&self, buf: &[u8], sector: u16) -> Result<(), FsError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tripped() {
            return Err(FsError::IoError);
        }
        let (block, _) = inner.open.ok_or(FsError::IoError)?;
        let at = self.sector_base(block, sector) * SPARE_SIZE;
        inner.staged.push(Staged::Spare {
            at,
            data: buf.to_vec(),
        });
        Ok(())
    }

    fn commit(&self) -> Result<(), FsError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.commits_left {
            Some(0) => {
                // Power cut: everything staged since the last commit is lost.
                inner.staged.clear();
                return Err(FsError::IoError);
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        let staged = std::mem::take(&mut inner.staged);
        for write in staged {
            match write {
                Staged::Main { at, data } => {
                    inner.main[at..at + data.len()].copy_from_slice(&data);
                }
                Staged::Spare { at, data } => {
                    inner.spare[at..at + data.len()].copy_from_slice(&data);
                }
            }
        }
        Ok(())
    }

    fn close_page(&self) {
        self.inner.lock().unwrap().open = None;
    }
}
