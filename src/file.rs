//! File read and write sessions: sequential cursors over a file's block
//! chain. Sessions are transient; nothing about them is persisted.

use core::cmp::min;

use crate::config::*;
use crate::flash_dev::FlashDevice;
use crate::fs::Volume;
use crate::structs::*;
use crate::{FsError, Result};

/// Sequential read cursor, created by `open_read` and discarded on close.
pub struct ReadFile {
    pub(crate) file_id: FileId,
    block: BlockIdx,
    sector: u16,
    /// Byte offset within the sector where the next read starts.
    offset: usize,
    /// Unconsumed data bytes left in the current sector.
    remaining: u16,
    at_end: bool,
}

impl ReadFile {
    pub fn file_id(&self) -> FileId {
        self.file_id
    }
}

/// Sequential append cursor. One sector is staged in RAM and flushed to
/// flash as it fills; the first block's header travels with the staged
/// sector 0, so it reaches flash together with the first data flush.
pub struct WriteFile {
    pub(crate) file_id: FileId,
    block: BlockIdx,
    sector: u16,
    buf: [u8; SECTOR_SIZE],
    /// Bytes staged in `buf`, header included for a pending sector 0.
    offset: usize,
    /// Data bytes staged (header excluded).
    data_in_sector: u16,
    /// The block's header only exists in `buf`, not on flash yet.
    header_pending: bool,
}

impl WriteFile {
    pub fn file_id(&self) -> FileId {
        self.file_id
    }
}

impl<D: FlashDevice> Volume<D> {
    /// Data sector following `sector` within a block, skipping the two
    /// reserved page-0 tail sectors. `None` once the block is exhausted.
    fn next_data_sector(&self, sector: u16) -> Option<u16> {
        let mut next = sector + 1;
        if next == self.geo.invalidation_sector() {
            next = self.geo.sectors_per_page;
        }
        if next >= self.geo.sectors_per_block() {
            None
        } else {
            Some(next)
        }
    }

    /// Locates the first data sector of a block: sector 0 when data shares
    /// it with the header (its spare counts real bytes), else sector 1.
    fn seek_first_data(&mut self, block: BlockIdx) -> Result<(u16, usize, u16)> {
        if let SpareTag::File { nbytes } = self.read_spare_tag(block, 0)? {
            if nbytes != 0 && nbytes != NBYTES_NONE {
                return Ok((0, FileBlockHeader::SIZE, nbytes));
            }
        }
        let remaining = match self.read_spare_tag(block, 1)? {
            SpareTag::File { nbytes } if nbytes != NBYTES_NONE => nbytes,
            _ => 0,
        };
        Ok((1, 0, remaining))
    }

    pub(crate) fn open_read_session(&mut self, filename: &str) -> Result<ReadFile> {
        if filename.len() >= MAX_FNAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let wanted = fixed_name(filename);

        let mut cur = self.chain_start()?;
        while let Some(rec) = self.chain_next(&mut cur)? {
            // Names are compared over their full fixed width.
            if rec.alloc.filename != wanted {
                continue;
            }
            if rec.invalid.is_deleted() {
                continue;
            }
            let (sector, offset, remaining) = self.seek_first_data(rec.alloc.first_block)?;
            return Ok(ReadFile {
                file_id: rec.alloc.file_id,
                block: rec.alloc.first_block,
                sector,
                offset,
                remaining,
                at_end: false,
            });
        }
        Err(FsError::FileNotFound)
    }

    /// Moves the read cursor to the next sector that holds data, following
    /// the tail record into the successor block when this one is exhausted.
    /// An erased spare tag means nothing was ever written past this point.
    fn advance_read(&mut self, f: &mut ReadFile) -> Result<bool> {
        if f.at_end {
            return Ok(false);
        }
        match self.next_data_sector(f.sector) {
            Some(next) => match self.read_spare_tag(f.block, next)? {
                SpareTag::File { nbytes } if nbytes != NBYTES_NONE => {
                    f.sector = next;
                    f.offset = 0;
                    f.remaining = nbytes;
                    Ok(true)
                }
                _ => {
                    f.at_end = true;
                    Ok(false)
                }
            },
            None => {
                let tail = self.read_file_tail(f.block)?;
                if !tail.is_linked() || tail.next_block == BLOCK_IDX_NONE {
                    f.at_end = true;
                    return Ok(false);
                }
                let (sector, offset, remaining) = self.seek_first_data(tail.next_block)?;
                f.block = tail.next_block;
                f.sector = sector;
                f.offset = offset;
                f.remaining = remaining;
                Ok(true)
            }
        }
    }

    pub(crate) fn read_session(&mut self, f: &mut ReadFile, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            if f.remaining == 0 {
                if !self.advance_read(f)? {
                    break;
                }
                continue;
            }
            let n = min(buf.len() - done, f.remaining as usize);
            self.read_exact(f.block, f.sector, f.offset, &mut buf[done..done + n])?;
            f.offset += n;
            f.remaining -= n as u16;
            done += n;
        }
        Ok(done)
    }

    pub(crate) fn open_write_session(&mut self, filename: &str) -> Result<WriteFile> {
        if filename.len() >= MAX_FNAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let file_id = self.state.max_file_id + 1;
        let (first_block, age) = self.allocate_block()?;
        let timestamp = self.take_timestamp();

        // The inode record goes out first; if power dies before the block's
        // header lands, mount repair re-initializes the block from this
        // record.
        let entry = InodeAllocEntry {
            file_id,
            first_block,
            first_block_age: age,
            timestamp,
            filename: fixed_name(filename),
        };
        self.chain_append(&entry)?;
        self.state.max_file_id = file_id;

        let header = FileBlockHeader { age, file_id };
        let mut buf = [0xFFu8; SECTOR_SIZE];
        buf[..FileBlockHeader::SIZE].copy_from_slice(&header.encode());
        Ok(WriteFile {
            file_id,
            block: first_block,
            sector: 0,
            buf,
            offset: FileBlockHeader::SIZE,
            data_in_sector: 0,
            header_pending: true,
        })
    }

    /// Writes the staged sector (main area plus its byte-count spare) and
    /// commits it.
    fn flush_sector(&mut self, f: &mut WriteFile) -> Result<()> {
        self.write_tagged(
            f.block,
            f.sector,
            &f.buf[..f.offset],
            &SpareTag::File {
                nbytes: f.data_in_sector,
            },
        )?;
        self.commit()?;
        if f.header_pending {
            f.header_pending = false;
            self.unclaim(f.block);
        }
        Ok(())
    }

    /// Moves the write cursor past a flushed sector, allocating and linking
    /// a successor block when this one is full. The tail record is committed
    /// before the successor's header so that an interruption between the two
    /// is exactly what mount repair step A detects.
    fn advance_write(&mut self, f: &mut WriteFile) -> Result<()> {
        f.offset = 0;
        f.data_in_sector = 0;
        match self.next_data_sector(f.sector) {
            Some(next) => {
                f.sector = next;
            }
            None => {
                let (next_block, age) = self.allocate_block()?;
                let timestamp = self.take_timestamp();
                let tail = FileTail {
                    next_block,
                    next_age: age,
                    timestamp,
                };
                self.write_tagged(
                    f.block,
                    self.geo.tail_sector(),
                    &tail.encode(),
                    &SpareTag::File { nbytes: 0 },
                )?;
                self.commit()?;

                let header = FileBlockHeader {
                    age,
                    file_id: f.file_id,
                };
                self.write_tagged(next_block, 0, &header.encode(), &SpareTag::File { nbytes: 0 })?;
                self.commit()?;
                self.unclaim(next_block);

                f.block = next_block;
                f.sector = 1;
            }
        }
        Ok(())
    }

    pub(crate) fn write_session(&mut self, f: &mut WriteFile, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            if f.offset == SECTOR_SIZE {
                self.flush_sector(f)?;
                self.advance_write(f)?;
            }
            let n = min(SECTOR_SIZE - f.offset, data.len() - written);
            f.buf[f.offset..f.offset + n].copy_from_slice(&data[written..written + n]);
            f.offset += n;
            f.data_in_sector += n as u16;
            written += n;
        }
        Ok(written)
    }

    /// Flushes the final partial sector. For a small file this is where the
    /// first block's header reaches flash, sharing sector 0 with the data.
    pub(crate) fn close_write_session(&mut self, f: &mut WriteFile) -> Result<()> {
        if f.header_pending || f.data_in_sector > 0 {
            self.flush_sector(f)?;
        }
        Ok(())
    }

    pub(crate) fn rm_session(&mut self, filename: &str) -> Result<()> {
        if filename.len() >= MAX_FNAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let wanted = fixed_name(filename);

        let mut cur = self.chain_start()?;
        let rec = loop {
            match self.chain_next(&mut cur)? {
                Some(rec) if rec.alloc.filename == wanted && !rec.invalid.is_deleted() => {
                    break rec;
                }
                Some(_) => continue,
                None => return Err(FsError::FileNotFound),
            }
        };

        // Find the terminal block of the file's chain.
        let first_block = rec.alloc.first_block;
        let mut last_block = first_block;
        loop {
            let tail = self.read_file_tail(last_block)?;
            if !tail.is_linked() || tail.next_block == BLOCK_IDX_NONE {
                break;
            }
            last_block = tail.next_block;
        }

        // The inode-level record is the durable statement of intent; the
        // per-block invalidations follow, terminal block last, so mount
        // repair step B can tell a finished deletion from a cut-short one.
        let timestamp = self.take_timestamp();
        self.chain_invalidate(
            rec.block,
            rec.sector,
            rec.ordinal,
            &InodeInvalidEntry {
                timestamp,
                last_block,
            },
        )?;

        let mut block = first_block;
        loop {
            let tail = self.read_file_tail(block)?;
            self.write_tagged(
                block,
                self.geo.invalidation_sector(),
                &timestamp.to_le_bytes(),
                &SpareTag::File { nbytes: 0 },
            )?;
            self.commit()?;
            if !tail.is_linked() || tail.next_block == BLOCK_IDX_NONE {
                break;
            }
            block = tail.next_block;
        }
        log::debug!("deleted file {} ({} .. {})", rec.alloc.file_id, first_block, last_block);
        Ok(())
    }
}
