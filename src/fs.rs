//! The mounted volume: an explicit context object owned by the caller. All
//! volatile state (mount result, timestamp counter, open-page cache) lives
//! here; there is no process-global.
//!
//! Every operation serializes on one mutex for its full duration and claims
//! the flash driver for the same span. The lock is not re-entrant and admits
//! no partial concurrency; crash safety comes from the mount-time recovery
//! scan, not from runtime transactions.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::cache::OpenPageCache;
use crate::config::*;
use crate::file::{ReadFile, WriteFile};
use crate::flash_dev::{FlashDevice, Geometry};
use crate::structs::*;
use crate::Result;

/// Volatile filesystem state, rebuilt by the recovery scan at every mount.
pub(crate) struct VolumeState {
    /// Location of the chain root inode block.
    pub inode0: BlockIdx,
    pub max_file_id: FileId,
    pub free_blocks: u16,
    /// The global monotonic timestamp counter; every recorded event draws
    /// from it.
    pub t: Timestamp,
    /// Blocks handed out whose typed header is not on flash yet.
    pub claimed: Vec<BlockIdx>,
}

pub(crate) struct Volume<D: FlashDevice> {
    pub(crate) dev: Arc<D>,
    pub(crate) geo: Geometry,
    pub(crate) cache: OpenPageCache,
    pub(crate) state: VolumeState,
}

impl<D: FlashDevice> Volume<D> {
    fn new(dev: Arc<D>) -> Result<Self> {
        let geo = Geometry::of(&*dev)?;
        Ok(Self {
            dev,
            geo,
            cache: OpenPageCache::new(),
            state: VolumeState {
                inode0: ROOT_BLOCK,
                max_file_id: 0,
                free_blocks: 0,
                t: 1,
                claimed: Vec::new(),
            },
        })
    }

    /// Draws the next timestamp. Strictly increasing for the life of the
    /// mount; re-seeded past all observed values at the next one.
    pub(crate) fn take_timestamp(&mut self) -> Timestamp {
        let t = self.state.t;
        self.state.t += 1;
        t
    }

    /// Drops a block from the claimed list once its header is durable.
    pub(crate) fn unclaim(&mut self, block: BlockIdx) {
        self.state.claimed.retain(|&b| b != block);
    }
}

/// RAII claim on the flash driver, released on every exit path.
struct DeviceGuard<D: FlashDevice>(Arc<D>);

impl<D: FlashDevice> DeviceGuard<D> {
    fn claim(dev: Arc<D>) -> Self {
        dev.lock();
        Self(dev)
    }
}

impl<D: FlashDevice> Drop for DeviceGuard<D> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// A mounted ember volume.
pub struct FlashFs<D: FlashDevice> {
    inner: Mutex<Volume<D>>,
}

impl<D: FlashDevice> FlashFs<D> {
    /// Erases every good block and writes the chain root (inode block 0,
    /// age 0, timestamp 0) at block 0. The volume must be mounted afterwards.
    pub fn format(dev: Arc<D>) -> Result<()> {
        dev.init()?;
        let mut vol = Volume::new(Arc::clone(&dev))?;
        let _claim = DeviceGuard::claim(dev);

        for block in 0..vol.geo.num_blocks {
            if vol.block_unusable(block)? {
                continue;
            }
            vol.dev.erase_block(block)?;
            vol.close_sector();
        }

        let header = InodeBlockHeader::new(0, 0);
        vol.write_tagged(
            ROOT_BLOCK,
            0,
            &header.encode(),
            &SpareTag::Inode { inode_index: 0 },
        )?;
        vol.commit()?;
        vol.dev.close_page();
        Ok(())
    }

    /// Mounts the volume, running the full recovery scan (and any repairs)
    /// before anything else may touch the flash.
    pub fn mount(dev: Arc<D>) -> Result<Self> {
        dev.init()?;
        let mut vol = Volume::new(Arc::clone(&dev))?;
        {
            let _claim = DeviceGuard::claim(dev);
            vol.recover()?;
        }
        log::debug!(
            "mounted: inode0={} max_file_id={} free_blocks={}",
            vol.state.inode0,
            vol.state.max_file_id,
            vol.state.free_blocks
        );
        Ok(Self {
            inner: Mutex::new(vol),
        })
    }

    pub fn open_read(&self, filename: &str) -> Result<ReadFile> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.open_read_session(filename)
    }

    /// Reads up to `buf.len()` bytes, returning how many were produced;
    /// zero means end of stream.
    pub fn read(&self, file: &mut ReadFile, buf: &mut [u8]) -> Result<usize> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.read_session(file, buf)
    }

    pub fn close_read(&self, file: ReadFile) {
        drop(file);
    }

    /// Creates a new file and returns its append cursor. The name may
    /// collide with earlier generations; the new file gets a fresh, higher
    /// file id.
    pub fn open_write(&self, filename: &str) -> Result<WriteFile> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.open_write_session(filename)
    }

    pub fn write(&self, file: &mut WriteFile, data: &[u8]) -> Result<usize> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.write_session(file, data)
    }

    /// Flushes the final partial sector and retires the session.
    pub fn close_write(&self, mut file: WriteFile) -> Result<()> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.close_write_session(&mut file)
    }

    /// Deletes a live file by name.
    pub fn rm(&self, filename: &str) -> Result<()> {
        let mut vol = self.inner.lock();
        let _claim = DeviceGuard::claim(Arc::clone(&vol.dev));
        vol.rm_session(filename)
    }

    pub fn free_blocks(&self) -> u16 {
        self.inner.lock().state.free_blocks
    }

    pub fn max_file_id(&self) -> FileId {
        self.inner.lock().state.max_file_id
    }
}
