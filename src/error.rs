use onlyerror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    /// flash I/O failure
    IoError,
    /// filename exceeds the fixed on-disk width
    NameTooLong,
    /// no live file with that name
    FileNotFound,
    /// no free or reclaimable block left
    OutOfSpace,
    /// block or sector index outside the device geometry
    OutOfBounds,
    /// no root inode block found during mount
    NoRootInode,
    /// a deletion was interrupted mid-chain; manual repair required
    IncompleteDeletion,
}

pub type Result<T> = core::result::Result<T, FsError>;
