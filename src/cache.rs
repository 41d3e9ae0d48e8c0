//! The open-page cache: the single process-wide point of flash-staging truth.
//!
//! Only one (block, page) is staged at a time. Repeating a request for the
//! page that is already staged returns the previously cached result without
//! touching the driver; anything else replaces the staged page. Callers must
//! not bypass the cache with raw driver access while relying on it.

use crate::flash_dev::FlashDevice;
use crate::fs::Volume;
use crate::structs::*;
use crate::Result;

pub struct OpenPageCache {
    staged: Option<(u16, u16)>,
    found: bool,
}

impl OpenPageCache {
    pub fn new() -> Self {
        Self {
            staged: None,
            found: false,
        }
    }

    pub fn open_page(&mut self, dev: &impl FlashDevice, block: u16, page: u16) -> Result<bool> {
        if self.staged == Some((block, page)) {
            return Ok(self.found);
        }
        match dev.open_page(block, page) {
            Ok(found) => {
                self.staged = Some((block, page));
                self.found = found;
                Ok(found)
            }
            Err(e) => {
                self.staged = None;
                Err(e)
            }
        }
    }

    pub fn open_sector(
        &mut self,
        dev: &impl FlashDevice,
        block: u16,
        sector: u16,
        sectors_per_page: u16,
    ) -> Result<bool> {
        self.open_page(dev, block, sector / sectors_per_page)
    }

    pub fn close_sector(&mut self) {
        self.staged = None;
    }
}

impl Default for OpenPageCache {
    fn default() -> Self {
        Self::new()
    }
}

// Record-level I/O. Each reader stages the containing page through the cache
// and decodes through the typed record functions in `structs`.
impl<D: FlashDevice> Volume<D> {
    pub(crate) fn open_sector(&mut self, block: u16, sector: u16) -> Result<bool> {
        self.cache
            .open_sector(&*self.dev, block, sector, self.geo.sectors_per_page)
    }

    pub(crate) fn close_sector(&mut self) {
        self.cache.close_sector();
    }

    pub(crate) fn read_exact(
        &mut self,
        block: u16,
        sector: u16,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        self.open_sector(block, sector)?;
        self.dev.read_sector(buf, sector, offset)
    }

    pub(crate) fn read_spare_tag(&mut self, block: u16, sector: u16) -> Result<SpareTag> {
        self.open_sector(block, sector)?;
        let mut buf = [0u8; SpareTag::SIZE];
        self.dev.read_spare(&mut buf, sector)?;
        Ok(SpareTag::decode(&buf))
    }

    pub(crate) fn read_inode_header(&mut self, block: u16) -> Result<InodeBlockHeader> {
        let mut buf = [0u8; InodeBlockHeader::SIZE];
        self.read_exact(block, 0, 0, &mut buf)?;
        Ok(InodeBlockHeader::decode(&buf))
    }

    pub(crate) fn read_file_header(&mut self, block: u16) -> Result<FileBlockHeader> {
        let mut buf = [0u8; FileBlockHeader::SIZE];
        self.read_exact(block, 0, 0, &mut buf)?;
        Ok(FileBlockHeader::decode(&buf))
    }

    pub(crate) fn read_inode_tail(&mut self, block: u16) -> Result<InodeTail> {
        let mut buf = [0u8; InodeTail::SIZE];
        self.read_exact(block, self.geo.tail_sector(), 0, &mut buf)?;
        Ok(InodeTail::decode(&buf))
    }

    pub(crate) fn read_file_tail(&mut self, block: u16) -> Result<FileTail> {
        let mut buf = [0u8; FileTail::SIZE];
        self.read_exact(block, self.geo.tail_sector(), 0, &mut buf)?;
        Ok(FileTail::decode(&buf))
    }

    /// A block's own invalidation timestamp (sentinel = still live).
    pub(crate) fn read_block_invalidation(&mut self, block: u16) -> Result<Timestamp> {
        let mut buf = [0u8; 4];
        self.read_exact(block, self.geo.invalidation_sector(), 0, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_alloc_entry(&mut self, block: u16, sector: u16) -> Result<InodeAllocEntry> {
        let mut buf = [0u8; InodeAllocEntry::SIZE];
        self.read_exact(block, sector, 0, &mut buf)?;
        Ok(InodeAllocEntry::decode(&buf))
    }

    pub(crate) fn read_invalid_entry(
        &mut self,
        block: u16,
        sector: u16,
    ) -> Result<InodeInvalidEntry> {
        let mut buf = [0u8; InodeInvalidEntry::SIZE];
        self.read_exact(block, sector, 0, &mut buf)?;
        Ok(InodeInvalidEntry::decode(&buf))
    }

    /// Writes a sector's main area plus its spare tag. The page must be
    /// committed by the caller once the multi-sector sequence is complete.
    pub(crate) fn write_tagged(
        &mut self,
        block: u16,
        sector: u16,
        data: &[u8],
        tag: &SpareTag,
    ) -> Result<()> {
        self.open_sector(block, sector)?;
        self.dev.write_sector(data, sector, 0)?;
        self.dev.write_spare(&tag.encode(), sector)
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        self.dev.commit()
    }

    /// Whether scans should skip a block: page 0 unreadable or marked bad.
    pub(crate) fn block_unusable(&mut self, block: u16) -> Result<bool> {
        if !self.open_sector(block, 0)? {
            return Ok(true);
        }
        self.dev.block_is_bad()
    }
}
