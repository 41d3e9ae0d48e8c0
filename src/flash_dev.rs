use crate::config::BLOCK_IDX_NONE;
use crate::error::FsError;

/// Device geometry, captured once from the driver at format/mount time.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub num_blocks: u16,
    pub pages_per_block: u16,
    pub sectors_per_page: u16,
}

impl Geometry {
    /// Captures and validates the device-reported geometry. The format needs
    /// at least four sectors per page (two reserved page-0 sectors plus room
    /// for data), a block besides the chain root, and indices that fit the
    /// on-disk u16 fields without colliding with the sentinel.
    pub fn of(dev: &impl FlashDevice) -> Result<Self, FsError> {
        let num_blocks = dev.num_blocks();
        let pages_per_block = dev.pages_per_block();
        let sectors_per_page = dev.sectors_per_page();
        let sectors_per_block = pages_per_block.checked_mul(sectors_per_page);
        if sectors_per_page < 4
            || num_blocks < 2
            || num_blocks > BLOCK_IDX_NONE as usize
            || sectors_per_block.map_or(true, |s| s == 0 || s > u16::MAX as usize)
        {
            return Err(FsError::OutOfBounds);
        }
        Ok(Self {
            num_blocks: num_blocks as u16,
            pages_per_block: pages_per_block as u16,
            sectors_per_page: sectors_per_page as u16,
        })
    }

    pub fn sectors_per_block(&self) -> u16 {
        self.pages_per_block * self.sectors_per_page
    }

    /// Reserved tail sector (last sector of page 0): the forward pointer of
    /// an inode block, or the successor record of a file block.
    pub fn tail_sector(&self) -> u16 {
        self.sectors_per_page - 1
    }

    /// Reserved sector holding a block's own invalidation timestamp.
    pub fn invalidation_sector(&self) -> u16 {
        self.sectors_per_page - 2
    }

    /// First inode entry slot: entries start on page 1.
    pub fn first_entry_sector(&self) -> u16 {
        self.sectors_per_page
    }
}

/// Flash Adaptation Layer: raw block/page/sector primitives supplied by the
/// hardware driver. All calls are synchronous and blocking.
///
/// Sector indices are block-relative; `read_sector`/`write_sector`/`read_spare`/
/// `write_spare` address the page most recently staged with `open_page`, and
/// the driver may assume the addressed sector lies inside that page. Writes
/// become durable only once `commit` succeeds.
pub trait FlashDevice: Send + Sync {
    /// Returns the number of erase blocks on the device.
    fn num_blocks(&self) -> usize;

    /// Returns the number of program pages per erase block.
    fn pages_per_block(&self) -> usize;

    /// Returns the number of sectors per page. Must be at least 4.
    fn sectors_per_page(&self) -> usize;

    /// One-time driver initialization.
    fn init(&self) -> Result<(), FsError>;

    /// Claims the device for a sequence of raw operations.
    fn lock(&self);

    /// Releases the device.
    fn unlock(&self);

    /// Stages (block, page) for sector I/O.
    /// Returns false if the page exists but could not be read back cleanly.
    fn open_page(&self, block: u16, page: u16) -> Result<bool, FsError>;

    /// Whether the block containing the currently staged page is marked bad.
    fn block_is_bad(&self) -> Result<bool, FsError>;

    /// Erases a whole block. Every byte of it reads 0xFF afterwards.
    fn erase_block(&self, block: u16) -> Result<(), FsError>;

    /// Reads `buf.len()` bytes from `offset` within a sector of the staged page.
    fn read_sector(&self, buf: &mut [u8], sector: u16, offset: usize) -> Result<(), FsError>;

    /// Writes `buf` at `offset` within a sector of the staged page.
    fn write_sector(&self, buf: &[u8], sector: u16, offset: usize) -> Result<(), FsError>;

    /// Reads the spare (out-of-band) area of a sector of the staged page.
    fn read_spare(&self, buf: &mut [u8], sector: u16) -> Result<(), FsError>;

    /// Writes the spare area of a sector of the staged page.
    fn write_spare(&self, buf: &[u8], sector: u16) -> Result<(), FsError>;

    /// Makes all writes since the last commit durable.
    fn commit(&self) -> Result<(), FsError>;

    /// Releases the staged page without committing.
    fn close_page(&self);
}
