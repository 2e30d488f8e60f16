// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::hash::{Hash, Hasher};
use std::io;

pub type Error = DiskError;
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("unexpected error")]
    Unexpected,

    #[error("corrupted format")]
    CorruptedFormat,

    #[error("corrupted backend")]
    CorruptedBackend,

    #[error("unformatted disk error")]
    UnformattedDisk,

    #[error("inconsistent drive found")]
    InconsistentDisk,

    #[error("drive id does not match the assigned slot")]
    DiskIdMismatch,

    #[error("drive path full")]
    DiskFull,

    #[error("disk not a dir")]
    DiskNotDir,

    #[error("disk not found")]
    DiskNotFound,

    #[error("drive is part of root drive, will not be used")]
    DriveIsRoot,

    #[error("drive is faulty")]
    FaultyDisk,

    #[error("drive access denied")]
    DiskAccessDenied,

    #[error("file not found")]
    FileNotFound,

    #[error("file version not found")]
    FileVersionNotFound,

    #[error("file name too long")]
    FileNameTooLong,

    #[error("volume already exists")]
    VolumeExists,

    #[error("not of regular file type")]
    IsNotRegular,

    #[error("path not found")]
    PathNotFound,

    #[error("volume not found")]
    VolumeNotFound,

    #[error("volume is not empty")]
    VolumeNotEmpty,

    #[error("volume access denied")]
    VolumeAccessDenied,

    #[error("disk access denied")]
    FileAccessDenied,

    #[error("file is corrupted")]
    FileCorrupt,

    #[error("less data available than what was requested")]
    LessData,

    #[error("part missing or corrupt")]
    PartMissingOrCorrupt,

    #[error("No healing is required")]
    NoHealRequired,

    #[error("erasure write quorum")]
    ErasureWriteQuorum,

    #[error("erasure read quorum")]
    ErasureReadQuorum,

    #[error("timeout")]
    Timeout,

    #[error("invalid path")]
    InvalidPath,

    #[error("io error {0}")]
    Io(io::Error),
}

impl DiskError {
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        DiskError::Io(io::Error::other(error))
    }

    pub fn is_all_not_found(errs: &[Option<DiskError>]) -> bool {
        if errs.is_empty() {
            return false;
        }

        errs.iter()
            .all(|err| matches!(err, Some(DiskError::FileNotFound) | Some(DiskError::FileVersionNotFound)))
    }

    pub fn is_err_object_not_found(err: &DiskError) -> bool {
        matches!(err, DiskError::FileNotFound | DiskError::VolumeNotFound)
    }

    /// Errors that mean the drive itself is gone, as opposed to a missing file on it.
    pub fn is_offline(&self) -> bool {
        matches!(self, DiskError::DiskNotFound | DiskError::FaultyDisk | DiskError::Timeout)
    }

    pub fn to_u32(&self) -> u32 {
        match self {
            DiskError::Unexpected => 0x02,
            DiskError::CorruptedFormat => 0x03,
            DiskError::CorruptedBackend => 0x04,
            DiskError::UnformattedDisk => 0x05,
            DiskError::InconsistentDisk => 0x06,
            DiskError::DiskIdMismatch => 0x07,
            DiskError::DiskFull => 0x08,
            DiskError::DiskNotDir => 0x09,
            DiskError::DiskNotFound => 0x0A,
            DiskError::DriveIsRoot => 0x0C,
            DiskError::FaultyDisk => 0x0E,
            DiskError::DiskAccessDenied => 0x0F,
            DiskError::FileNotFound => 0x10,
            DiskError::FileVersionNotFound => 0x11,
            DiskError::FileNameTooLong => 0x13,
            DiskError::VolumeExists => 0x14,
            DiskError::IsNotRegular => 0x15,
            DiskError::PathNotFound => 0x16,
            DiskError::VolumeNotFound => 0x17,
            DiskError::VolumeNotEmpty => 0x18,
            DiskError::VolumeAccessDenied => 0x19,
            DiskError::FileAccessDenied => 0x1A,
            DiskError::FileCorrupt => 0x1B,
            DiskError::LessData => 0x1E,
            DiskError::PartMissingOrCorrupt => 0x21,
            DiskError::NoHealRequired => 0x22,
            DiskError::Io(_) => 0x24,
            DiskError::ErasureWriteQuorum => 0x25,
            DiskError::ErasureReadQuorum => 0x26,
            DiskError::Timeout => 0x29,
            DiskError::InvalidPath => 0x2A,
        }
    }
}

/// Map an io error raised while touching a file.
pub fn to_file_error(err: io::Error) -> DiskError {
    match err.kind() {
        io::ErrorKind::NotFound => DiskError::FileNotFound,
        io::ErrorKind::PermissionDenied => DiskError::FileAccessDenied,
        io::ErrorKind::IsADirectory => DiskError::IsNotRegular,
        io::ErrorKind::NotADirectory => DiskError::FileAccessDenied,
        io::ErrorKind::DirectoryNotEmpty => DiskError::FileAccessDenied,
        io::ErrorKind::UnexpectedEof => DiskError::FaultyDisk,
        io::ErrorKind::InvalidData => DiskError::FileCorrupt,
        io::ErrorKind::StorageFull => DiskError::DiskFull,
        _ => DiskError::from(err),
    }
}

/// Map an io error raised while touching a volume (bucket directory).
pub fn to_volume_error(err: io::Error) -> DiskError {
    match err.kind() {
        io::ErrorKind::NotFound => DiskError::VolumeNotFound,
        io::ErrorKind::PermissionDenied => DiskError::DiskAccessDenied,
        io::ErrorKind::DirectoryNotEmpty => DiskError::VolumeNotEmpty,
        io::ErrorKind::AlreadyExists => DiskError::VolumeExists,
        io::ErrorKind::NotADirectory => DiskError::IsNotRegular,
        _ => to_file_error(err),
    }
}

/// Map an io error raised while touching the drive root.
pub fn to_disk_error(err: io::Error) -> DiskError {
    match err.kind() {
        io::ErrorKind::NotFound => DiskError::DiskNotFound,
        io::ErrorKind::PermissionDenied => DiskError::DiskAccessDenied,
        io::ErrorKind::NotADirectory => DiskError::DiskNotDir,
        _ => to_volume_error(err),
    }
}

impl From<io::Error> for DiskError {
    fn from(e: io::Error) -> Self {
        e.downcast::<DiskError>().unwrap_or_else(DiskError::Io)
    }
}

impl From<DiskError> for io::Error {
    fn from(e: DiskError) -> Self {
        match e {
            DiskError::Io(io_error) => io_error,
            e => io::Error::other(e),
        }
    }
}

impl From<serde_json::Error> for DiskError {
    fn from(e: serde_json::Error) -> Self {
        DiskError::other(e)
    }
}

impl From<tokio::task::JoinError> for DiskError {
    fn from(e: tokio::task::JoinError) -> Self {
        DiskError::other(e)
    }
}

impl Clone for DiskError {
    fn clone(&self) -> Self {
        match self {
            DiskError::Io(io_error) => DiskError::Io(io::Error::new(io_error.kind(), io_error.to_string())),
            DiskError::Unexpected => DiskError::Unexpected,
            DiskError::CorruptedFormat => DiskError::CorruptedFormat,
            DiskError::CorruptedBackend => DiskError::CorruptedBackend,
            DiskError::UnformattedDisk => DiskError::UnformattedDisk,
            DiskError::InconsistentDisk => DiskError::InconsistentDisk,
            DiskError::DiskIdMismatch => DiskError::DiskIdMismatch,
            DiskError::DiskFull => DiskError::DiskFull,
            DiskError::DiskNotDir => DiskError::DiskNotDir,
            DiskError::DiskNotFound => DiskError::DiskNotFound,
            DiskError::DriveIsRoot => DiskError::DriveIsRoot,
            DiskError::FaultyDisk => DiskError::FaultyDisk,
            DiskError::DiskAccessDenied => DiskError::DiskAccessDenied,
            DiskError::FileNotFound => DiskError::FileNotFound,
            DiskError::FileVersionNotFound => DiskError::FileVersionNotFound,
            DiskError::FileNameTooLong => DiskError::FileNameTooLong,
            DiskError::VolumeExists => DiskError::VolumeExists,
            DiskError::IsNotRegular => DiskError::IsNotRegular,
            DiskError::PathNotFound => DiskError::PathNotFound,
            DiskError::VolumeNotFound => DiskError::VolumeNotFound,
            DiskError::VolumeNotEmpty => DiskError::VolumeNotEmpty,
            DiskError::VolumeAccessDenied => DiskError::VolumeAccessDenied,
            DiskError::FileAccessDenied => DiskError::FileAccessDenied,
            DiskError::FileCorrupt => DiskError::FileCorrupt,
            DiskError::LessData => DiskError::LessData,
            DiskError::PartMissingOrCorrupt => DiskError::PartMissingOrCorrupt,
            DiskError::NoHealRequired => DiskError::NoHealRequired,
            DiskError::ErasureWriteQuorum => DiskError::ErasureWriteQuorum,
            DiskError::ErasureReadQuorum => DiskError::ErasureReadQuorum,
            DiskError::Timeout => DiskError::Timeout,
            DiskError::InvalidPath => DiskError::InvalidPath,
        }
    }
}

impl PartialEq for DiskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DiskError::Io(e1), DiskError::Io(e2)) => e1.kind() == e2.kind() && e1.to_string() == e2.to_string(),
            _ => self.to_u32() == other.to_u32(),
        }
    }
}

impl Eq for DiskError {}

impl Hash for DiskError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DiskError::Io(e) => e.to_string().hash(state),
            e => e.to_u32().hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_error_other() {
        let custom_error = DiskError::other("custom error message");
        assert!(matches!(custom_error, DiskError::Io(_)));
        assert!(custom_error.to_string().contains("custom error message"));
    }

    #[test]
    fn test_disk_error_survives_io_round_trip() {
        let io_err: io::Error = DiskError::UnformattedDisk.into();
        assert_eq!(DiskError::from(io_err), DiskError::UnformattedDisk);

        let plain = io::Error::new(io::ErrorKind::NotFound, "file not found");
        assert!(matches!(DiskError::from(plain), DiskError::Io(_)));
    }

    #[test]
    fn test_is_all_not_found() {
        assert!(!DiskError::is_all_not_found(&[]));

        let all_not_found = vec![
            Some(DiskError::FileNotFound),
            Some(DiskError::FileVersionNotFound),
            Some(DiskError::FileNotFound),
        ];
        assert!(DiskError::is_all_not_found(&all_not_found));

        let mixed = vec![Some(DiskError::FileNotFound), Some(DiskError::DiskNotFound)];
        assert!(!DiskError::is_all_not_found(&mixed));

        let with_success = vec![Some(DiskError::FileNotFound), None];
        assert!(!DiskError::is_all_not_found(&with_success));
    }

    #[test]
    fn test_error_mapping_by_context() {
        let nf = || io::Error::new(io::ErrorKind::NotFound, "nope");
        assert_eq!(to_file_error(nf()), DiskError::FileNotFound);
        assert_eq!(to_volume_error(nf()), DiskError::VolumeNotFound);
        assert_eq!(to_disk_error(nf()), DiskError::DiskNotFound);

        let exists = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        assert_eq!(to_volume_error(exists), DiskError::VolumeExists);

        let not_empty = io::Error::new(io::ErrorKind::DirectoryNotEmpty, "busy");
        assert_eq!(to_volume_error(not_empty), DiskError::VolumeNotEmpty);
    }

    #[test]
    fn test_clone_eq_hash_consistency() {
        use std::collections::HashSet;

        let errs = [
            DiskError::DiskNotFound,
            DiskError::DiskNotFound.clone(),
            DiskError::other("x"),
            DiskError::other("x").clone(),
            DiskError::other("y"),
        ];
        let set: HashSet<_> = errs.iter().cloned().collect();
        assert_eq!(set.len(), 3);
        assert!(DiskError::DiskNotFound.is_offline());
        assert!(!DiskError::FileNotFound.is_offline());
    }
}
