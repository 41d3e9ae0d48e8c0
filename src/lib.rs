//! Ember is a log-structured filesystem for raw NOR/NAND flash in embedded
//! devices. It exposes named, append-only byte-stream files over a fixed
//! array of erase blocks, with wear-aware allocation and crash-safe
//! metadata: power loss at any point leaves the volume recoverable by the
//! mount-time scan.
//!
//! Ember's layers (from bottom to top):
//! 1. Flash device: raw block/page/sector primitives.   | User implemented (hardware-specific)
//! 2. Open-page cache: single point of staging truth.   | Fs implemented
//! 3. On-disk records: typed encode/decode per record.  | Fs implemented
//! 4. Inode chain, allocator, mount/recovery scanner.   | Fs implemented
//! 5. Read/write sessions and the `FlashFs` interface.  | Fs implemented

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod allocator;
mod cache;
mod config;
mod error;
mod file;
mod flash_dev;
mod fs;
mod inode;
mod mount;
mod structs;

pub use config::*;
pub use error::FsError as Error;
pub use error::{FsError, Result};
pub use file::{ReadFile, WriteFile};
pub use flash_dev::{FlashDevice, Geometry};
pub use fs::FlashFs;
pub use structs::*;
