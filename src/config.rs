//! Format constants. Device geometry (block count, pages per block, sectors
//! per page) is reported by the [`FlashDevice`](crate::FlashDevice) itself.

/// Magic bytes identifying an ember volume, stored in inode block headers.
pub const MAGIC: [u8; 2] = [0xBE, 0xEF];
pub const VSN_MAJOR: u8 = 1;
pub const VSN_MINOR: u8 = 0;

/// Main-area bytes per sector, the addressable unit for records and data.
pub const SECTOR_SIZE: usize = 512;
/// Side-channel bytes per sector, holding the type tag.
pub const SPARE_SIZE: usize = 8;

/// Fixed on-disk width of a filename. Names are compared over the full
/// width; they are not guaranteed to be NUL-delimited within it.
pub const MAX_FNAME_LEN: usize = 32;

// All-ones sentinels, chosen so erased flash reads as "not set".
pub const BLOCK_IDX_NONE: u16 = 0xFFFF;
pub const TIMESTAMP_NONE: u32 = 0xFFFF_FFFF;
pub const FILE_ID_NONE: u32 = 0xFFFF_FFFF;
pub const NBYTES_NONE: u16 = 0xFFFF;

/// Block 0 holds the root inode block after a format.
pub const ROOT_BLOCK: u16 = 0;
