//! On-disk record types.
//!
//! Every record is stored little-endian and goes through an explicit
//! encode/decode pair; raw sector bytes are never reinterpreted in place.
//! Sentinel fields are all-ones so an erased (never written) record decodes
//! to "not set".

use crate::config::*;

pub type BlockIdx = u16;
pub type Age = u32;
pub type Timestamp = u32;
pub type FileId = u32;

fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// A block's type, recorded in the spare tag of every written sector.
/// `Unallocated` is the erased state and carries no header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Unallocated,
    Inode,
    File,
}

pub const TYPE_ID_INODE: u8 = 0x3B;
pub const TYPE_ID_FILE: u8 = 0x9E;

impl BlockType {
    pub fn from_type_id(id: u8) -> Self {
        match id {
            TYPE_ID_INODE => BlockType::Inode,
            TYPE_ID_FILE => BlockType::File,
            _ => BlockType::Unallocated,
        }
    }
}

/// Spare-area tag: a type id plus one type-specific field.
/// Layout: [0] type_id, [1] reserved, [2..6] inode_index (inode blocks)
/// or [2..4] nbytes (file blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpareTag {
    Unallocated,
    /// Ordinal of this inode block within the chain (0 = root).
    Inode { inode_index: u32 },
    /// Data bytes committed in this sector; `NBYTES_NONE` never occurs in a
    /// written tag.
    File { nbytes: u16 },
}

impl SpareTag {
    pub const SIZE: usize = SPARE_SIZE;

    pub fn decode(buf: &[u8; SPARE_SIZE]) -> Self {
        match BlockType::from_type_id(buf[0]) {
            BlockType::Inode => SpareTag::Inode {
                inode_index: get_u32(buf, 2),
            },
            BlockType::File => SpareTag::File {
                nbytes: get_u16(buf, 2),
            },
            BlockType::Unallocated => SpareTag::Unallocated,
        }
    }

    pub fn encode(&self) -> [u8; SPARE_SIZE] {
        let mut buf = [0xFFu8; SPARE_SIZE];
        match *self {
            SpareTag::Unallocated => {}
            SpareTag::Inode { inode_index } => {
                buf[0] = TYPE_ID_INODE;
                put_u32(&mut buf, 2, inode_index);
            }
            SpareTag::File { nbytes } => {
                buf[0] = TYPE_ID_FILE;
                put_u16(&mut buf, 2, nbytes);
            }
        }
        buf
    }
}

/// Sector-0 header of an inode block. Carries the volume signature so a
/// mount scan can tell a real chain root from stale data.
#[derive(Debug, Clone, Copy)]
pub struct InodeBlockHeader {
    pub age: Age,
    pub timestamp: Timestamp,
    magic: [u8; 2],
    vsn_major: u8,
    vsn_minor: u8,
}

impl InodeBlockHeader {
    pub const SIZE: usize = 12;

    pub fn new(age: Age, timestamp: Timestamp) -> Self {
        Self {
            age,
            timestamp,
            magic: MAGIC,
            vsn_major: VSN_MAJOR,
            vsn_minor: VSN_MINOR,
        }
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            magic: [buf[0], buf[1]],
            vsn_major: buf[2],
            vsn_minor: buf[3],
            age: get_u32(buf, 4),
            timestamp: get_u32(buf, 8),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        buf[0] = self.magic[0];
        buf[1] = self.magic[1];
        buf[2] = self.vsn_major;
        buf[3] = self.vsn_minor;
        put_u32(&mut buf, 4, self.age);
        put_u32(&mut buf, 8, self.timestamp);
        buf
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.vsn_major == VSN_MAJOR
    }
}

/// Sector-0 header of a file block, written when the block is claimed for a
/// file. File data may follow it within sector 0.
#[derive(Debug, Clone, Copy)]
pub struct FileBlockHeader {
    pub age: Age,
    pub file_id: FileId,
}

impl FileBlockHeader {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            age: get_u32(buf, 0),
            file_id: get_u32(buf, 4),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        put_u32(&mut buf, 0, self.age);
        put_u32(&mut buf, 4, self.file_id);
        buf
    }
}

/// Allocation half of an inode entry pair. Written once at file creation,
/// never reused.
#[derive(Debug, Clone, Copy)]
pub struct InodeAllocEntry {
    pub file_id: FileId,
    pub first_block: BlockIdx,
    pub first_block_age: Age,
    pub timestamp: Timestamp,
    pub filename: [u8; MAX_FNAME_LEN],
}

impl InodeAllocEntry {
    pub const SIZE: usize = 14 + MAX_FNAME_LEN;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let mut filename = [0u8; MAX_FNAME_LEN];
        filename.copy_from_slice(&buf[14..14 + MAX_FNAME_LEN]);
        Self {
            file_id: get_u32(buf, 0),
            first_block: get_u16(buf, 4),
            first_block_age: get_u32(buf, 6),
            timestamp: get_u32(buf, 10),
            filename,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        put_u32(&mut buf, 0, self.file_id);
        put_u16(&mut buf, 4, self.first_block);
        put_u32(&mut buf, 6, self.first_block_age);
        put_u32(&mut buf, 10, self.timestamp);
        buf[14..14 + MAX_FNAME_LEN].copy_from_slice(&self.filename);
        buf
    }

    /// The terminal sentinel: an entry pair that was never written.
    pub fn is_terminal(&self) -> bool {
        self.file_id == FILE_ID_NONE
    }
}

/// Invalidation half of an inode entry pair. Erased (all sentinel) until the
/// file is deleted.
#[derive(Debug, Clone, Copy)]
pub struct InodeInvalidEntry {
    pub timestamp: Timestamp,
    pub last_block: BlockIdx,
}

impl InodeInvalidEntry {
    pub const SIZE: usize = 6;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            timestamp: get_u32(buf, 0),
            last_block: get_u16(buf, 4),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        put_u32(&mut buf, 0, self.timestamp);
        put_u16(&mut buf, 4, self.last_block);
        buf
    }

    pub fn is_deleted(&self) -> bool {
        self.timestamp != TIMESTAMP_NONE
    }
}

/// Tail sector of an inode block: the forward pointer of the chain.
#[derive(Debug, Clone, Copy)]
pub struct InodeTail {
    pub next_block: BlockIdx,
}

impl InodeTail {
    pub const SIZE: usize = 2;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            next_block: get_u16(buf, 0),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        put_u16(&mut buf, 0, self.next_block);
        buf
    }
}

/// Tail sector of a file block: successor linkage, written when the block
/// fills. The timestamp records when the successor was claimed.
#[derive(Debug, Clone, Copy)]
pub struct FileTail {
    pub next_block: BlockIdx,
    pub next_age: Age,
    pub timestamp: Timestamp,
}

impl FileTail {
    pub const SIZE: usize = 10;

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            next_block: get_u16(buf, 0),
            next_age: get_u32(buf, 2),
            timestamp: get_u32(buf, 6),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0xFFu8; Self::SIZE];
        put_u16(&mut buf, 0, self.next_block);
        put_u32(&mut buf, 2, self.next_age);
        put_u32(&mut buf, 6, self.timestamp);
        buf
    }

    pub fn is_linked(&self) -> bool {
        self.timestamp != TIMESTAMP_NONE
    }
}

/// Builds the fixed-width on-disk form of a filename, zero padded.
pub fn fixed_name(name: &str) -> [u8; MAX_FNAME_LEN] {
    let mut buf = [0u8; MAX_FNAME_LEN];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    buf
}
