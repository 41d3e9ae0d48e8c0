//! Block allocation and wear leveling.
//!
//! Never-written blocks are handed out first; once none remain, the
//! invalidated (deleted) block with the lowest recorded age is erased and
//! reused. All calls run under the volume lock, and blocks whose typed
//! header has not been committed yet sit in the volatile claimed list so a
//! rescan cannot hand them out twice.

use crate::flash_dev::FlashDevice;
use crate::fs::Volume;
use crate::structs::*;
use crate::{FsError, Result, TIMESTAMP_NONE};

impl<D: FlashDevice> Volume<D> {
    /// Scans for a completely unallocated block. `None` when the volume has
    /// no erased block left.
    pub(crate) fn find_free_block(&mut self) -> Result<Option<BlockIdx>> {
        for block in 0..self.geo.num_blocks {
            if self.state.claimed.contains(&block) {
                continue;
            }
            if self.block_unusable(block)? {
                continue;
            }
            if self.read_spare_tag(block, 0)? == SpareTag::Unallocated {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Hands out a block together with the age its new header must carry.
    /// The block joins the claimed list until its header is committed.
    pub(crate) fn allocate_block(&mut self) -> Result<(BlockIdx, Age)> {
        if let Some(block) = self.find_free_block()? {
            self.state.claimed.push(block);
            self.state.free_blocks = self.state.free_blocks.saturating_sub(1);
            return Ok((block, 0));
        }

        // No erased block left: reclaim the least worn invalidated one.
        let mut best: Option<(BlockIdx, Age)> = None;
        for block in 0..self.geo.num_blocks {
            if self.state.claimed.contains(&block) {
                continue;
            }
            if self.block_unusable(block)? {
                continue;
            }
            if self.read_spare_tag(block, 0)? == SpareTag::Unallocated {
                continue;
            }
            if self.read_block_invalidation(block)? == TIMESTAMP_NONE {
                continue;
            }
            let age = self.get_block_age(block)?;
            if best.map_or(true, |(_, a)| age < a) {
                best = Some((block, age));
            }
        }

        match best {
            Some((block, age)) => {
                self.dev.erase_block(block)?;
                self.close_sector();
                self.state.claimed.push(block);
                log::debug!("reclaimed block {} at age {}", block, age);
                Ok((block, age + 1))
            }
            None => Err(FsError::OutOfSpace),
        }
    }

    /// The age stored in a block's header sector. Unallocated blocks carry
    /// no header and report zero wear.
    pub(crate) fn get_block_age(&mut self, block: BlockIdx) -> Result<Age> {
        match self.read_spare_tag(block, 0)? {
            SpareTag::Inode { .. } => Ok(self.read_inode_header(block)?.age),
            SpareTag::File { .. } => Ok(self.read_file_header(block)?.age),
            SpareTag::Unallocated => Ok(0),
        }
    }
}
