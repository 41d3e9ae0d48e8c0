//! The inode chain: a singly linked sequence of inode blocks holding one
//! 2-sector entry pair per file. The cursor recognizes the terminal sentinel
//! itself and parks on it, so every caller sees the same end-of-chain
//! contract and the append path knows exactly where the next entry goes.

use crate::config::*;
use crate::flash_dev::FlashDevice;
use crate::fs::Volume;
use crate::structs::*;
use crate::Result;

/// Sequential position in the inode chain.
pub(crate) struct InodeCursor {
    pub block: BlockIdx,
    pub next_block: BlockIdx,
    /// Entries stepped over so far.
    pub inode_index: u32,
    /// Ordinal of the current inode block within the chain.
    pub block_ordinal: u32,
    pub sector: u16,
    /// Set when the chain ended with every slot used and no forward pointer.
    pub exhausted: bool,
}

/// One decoded entry pair plus where it lives.
pub(crate) struct InodeRecord {
    pub block: BlockIdx,
    pub sector: u16,
    /// Chain ordinal of the block holding the pair.
    pub ordinal: u32,
    pub alloc: InodeAllocEntry,
    pub invalid: InodeInvalidEntry,
}

impl<D: FlashDevice> Volume<D> {
    pub(crate) fn chain_start(&mut self) -> Result<InodeCursor> {
        let root = self.state.inode0;
        let tail = self.read_inode_tail(root)?;
        Ok(InodeCursor {
            block: root,
            next_block: tail.next_block,
            inode_index: 0,
            block_ordinal: 0,
            sector: self.geo.first_entry_sector(),
            exhausted: false,
        })
    }

    /// Moves past the current entry pair, following the forward pointer into
    /// the next inode block when this one is out of slots.
    fn chain_step(&mut self, cur: &mut InodeCursor) -> Result<()> {
        cur.sector += 2;
        cur.inode_index += 1;
        if cur.sector + 1 >= self.geo.sectors_per_block() {
            if cur.next_block == BLOCK_IDX_NONE {
                cur.exhausted = true;
                return Ok(());
            }
            cur.block = cur.next_block;
            cur.block_ordinal += 1;
            let tail = self.read_inode_tail(cur.block)?;
            cur.next_block = tail.next_block;
            cur.sector = self.geo.first_entry_sector();
        }
        Ok(())
    }

    /// Reads the entry pair under the cursor. Returns `Ok(None)` at the
    /// terminal sentinel, leaving the cursor parked on the free slot; on a
    /// real entry the cursor moves past the pair.
    pub(crate) fn chain_next(&mut self, cur: &mut InodeCursor) -> Result<Option<InodeRecord>> {
        if cur.exhausted {
            return Ok(None);
        }
        let alloc = self.read_alloc_entry(cur.block, cur.sector)?;
        if alloc.is_terminal() {
            if cur.next_block != BLOCK_IDX_NONE {
                log::warn!(
                    "inode block {} ends at a sentinel but still has a forward pointer",
                    cur.block
                );
            }
            return Ok(None);
        }
        let invalid = self.read_invalid_entry(cur.block, cur.sector + 1)?;
        let rec = InodeRecord {
            block: cur.block,
            sector: cur.sector,
            ordinal: cur.block_ordinal,
            alloc,
            invalid,
        };
        self.chain_step(cur)?;
        Ok(Some(rec))
    }

    /// Appends an allocation entry at the first free slot. Its invalidation
    /// half stays erased (sentinel) until the file is deleted. When no slot
    /// is left, a fresh inode block is claimed and fully written before the
    /// old tail's forward pointer is published.
    pub(crate) fn chain_append(&mut self, entry: &InodeAllocEntry) -> Result<()> {
        let mut cur = self.chain_start()?;
        while self.chain_next(&mut cur)?.is_some() {}

        let (block, sector, ordinal) = if cur.exhausted {
            let (new_block, age) = self.allocate_block()?;
            let t = self.take_timestamp();
            let header = InodeBlockHeader::new(age, t);
            let ordinal = cur.block_ordinal + 1;
            self.write_tagged(
                new_block,
                0,
                &header.encode(),
                &SpareTag::Inode {
                    inode_index: ordinal,
                },
            )?;
            self.commit()?;
            self.unclaim(new_block);

            let tail = InodeTail {
                next_block: new_block,
            };
            self.write_tagged(
                cur.block,
                self.geo.tail_sector(),
                &tail.encode(),
                &SpareTag::Inode {
                    inode_index: cur.block_ordinal,
                },
            )?;
            self.commit()?;
            (new_block, self.geo.first_entry_sector(), ordinal)
        } else {
            (cur.block, cur.sector, cur.block_ordinal)
        };

        self.write_tagged(
            block,
            sector,
            &entry.encode(),
            &SpareTag::Inode {
                inode_index: ordinal,
            },
        )?;
        self.commit()
    }

    /// Writes the invalidation half of an existing entry.
    pub(crate) fn chain_invalidate(
        &mut self,
        block: BlockIdx,
        sector: u16,
        ordinal: u32,
        record: &InodeInvalidEntry,
    ) -> Result<()> {
        self.write_tagged(
            block,
            sector + 1,
            &record.encode(),
            &SpareTag::Inode {
                inode_index: ordinal,
            },
        )?;
        self.commit()
    }
}
