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

use crate::disk::error::DiskError;

pub type Error = StorageError;
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the object layer.
///
/// Disk-level failures are translated at the set boundary through
/// [`to_object_err`], which attaches the bucket/object the caller asked for.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Faulty disk")]
    FaultyDisk,

    #[error("Disk full")]
    DiskFull,

    #[error("Storage reached its minimum free drive threshold")]
    StorageFull,

    #[error("Please reduce your request rate")]
    SlowDown,

    #[error("Volume not found")]
    VolumeNotFound,

    #[error("Volume exists")]
    VolumeExists,

    #[error("Volume not empty")]
    VolumeNotEmpty,

    #[error("File not found")]
    FileNotFound,

    #[error("File version not found")]
    FileVersionNotFound,

    #[error("File name too long")]
    FileNameTooLong,

    #[error("File access denied")]
    FileAccessDenied,

    #[error("File is corrupted")]
    FileCorrupt,

    #[error("Not a regular file")]
    IsNotRegular,

    #[error("Disk not found")]
    DiskNotFound,

    #[error("Disk access denied")]
    DiskAccessDenied,

    #[error("Drive is part of root drive, will not be used")]
    DriveIsRoot,

    #[error("Unformatted disk")]
    UnformattedDisk,

    #[error("Inconsistent drive found")]
    InconsistentDisk,

    #[error("Drive id does not match the assigned slot")]
    DiskIdMismatch,

    #[error("Corrupted format")]
    CorruptedFormat,

    #[error("Corrupted backend")]
    CorruptedBackend,

    #[error("Unexpected error")]
    Unexpected,

    #[error("No healing is required")]
    NoHealRequired,

    #[error("Erasure read quorum")]
    ErasureReadQuorum,

    #[error("Erasure write quorum")]
    ErasureWriteQuorum,

    #[error("Not first disk")]
    NotFirstDisk,

    #[error("First disk wait")]
    FirstDiskWait,

    #[error("Not implemented")]
    NotImplemented,

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket exists: {0}")]
    BucketExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Bucket name invalid: {0}")]
    BucketNameInvalid(String),

    #[error("Object name invalid: {0}/{1}")]
    ObjectNameInvalid(String, String),

    #[error("Object not found: {0}/{1}")]
    ObjectNotFound(String, String),

    #[error("Object exists on :{0} as directory {1}")]
    ObjectExistsAsDirectory(String, String),

    #[error("Prefix access is denied:{0}/{1}")]
    PrefixAccessDenied(String, String),

    #[error("Storage resources are insufficient for the read operation: {0}/{1}")]
    InsufficientReadQuorum(String, String),

    #[error("Storage resources are insufficient for the write operation: {0}/{1}")]
    InsufficientWriteQuorum(String, String),

    #[error("Invalid upload id: {0}/{1}-{2}")]
    InvalidUploadID(String, String, String),

    #[error("Specified part could not be found. PartNumber {0}, Expected {1}, got {2}")]
    InvalidPart(usize, String, String),

    #[error("Your proposed upload is smaller than the minimum allowed size. Part {0} size {1} is less than minimum {2}")]
    EntityTooSmall(usize, i64, i64),

    #[error("Invalid arguments provided for {0}/{1}-{2}")]
    InvalidArgument(String, String, String),

    #[error("No erasure set routes object {0}")]
    SetNotFound(String),

    #[error("Io error: {0}")]
    Io(std::io::Error),
}

impl StorageError {
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StorageError::Io(std::io::Error::other(error))
    }

    /// Quorum failures of either kind, at disk or object granularity.
    pub fn is_quorum_err(&self) -> bool {
        matches!(
            self,
            StorageError::ErasureReadQuorum
                | StorageError::ErasureWriteQuorum
                | StorageError::InsufficientReadQuorum(..)
                | StorageError::InsufficientWriteQuorum(..)
        )
    }

    pub fn is_write_quorum_err(&self) -> bool {
        matches!(self, StorageError::ErasureWriteQuorum | StorageError::InsufficientWriteQuorum(..))
    }
}

impl From<DiskError> for StorageError {
    fn from(e: DiskError) -> Self {
        match e {
            DiskError::Io(io_error) => StorageError::Io(io_error),
            DiskError::Unexpected => StorageError::Unexpected,
            DiskError::CorruptedFormat => StorageError::CorruptedFormat,
            DiskError::CorruptedBackend => StorageError::CorruptedBackend,
            DiskError::UnformattedDisk => StorageError::UnformattedDisk,
            DiskError::InconsistentDisk => StorageError::InconsistentDisk,
            DiskError::DiskIdMismatch => StorageError::DiskIdMismatch,
            DiskError::DiskFull => StorageError::DiskFull,
            DiskError::DiskNotFound => StorageError::DiskNotFound,
            DiskError::DriveIsRoot => StorageError::DriveIsRoot,
            DiskError::FaultyDisk => StorageError::FaultyDisk,
            DiskError::DiskAccessDenied => StorageError::DiskAccessDenied,
            DiskError::FileNotFound => StorageError::FileNotFound,
            DiskError::FileVersionNotFound => StorageError::FileVersionNotFound,
            DiskError::FileNameTooLong => StorageError::FileNameTooLong,
            DiskError::VolumeExists => StorageError::VolumeExists,
            DiskError::IsNotRegular => StorageError::IsNotRegular,
            DiskError::VolumeNotFound => StorageError::VolumeNotFound,
            DiskError::VolumeNotEmpty => StorageError::VolumeNotEmpty,
            DiskError::FileAccessDenied => StorageError::FileAccessDenied,
            DiskError::FileCorrupt => StorageError::FileCorrupt,
            DiskError::NoHealRequired => StorageError::NoHealRequired,
            DiskError::ErasureReadQuorum => StorageError::ErasureReadQuorum,
            DiskError::ErasureWriteQuorum => StorageError::ErasureWriteQuorum,
            e => StorageError::Io(std::io::Error::other(e)),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.downcast::<DiskError>() {
            Ok(disk_err) => disk_err.into(),
            Err(e) => StorageError::Io(e),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::other(e)
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::other(e)
    }
}

/// Attach `params` (bucket, object, upload id...) to a low-level error.
pub fn to_object_err(err: Error, params: Vec<&str>) -> Error {
    let bucket = params.first().copied().unwrap_or_default().to_owned();
    let object = params.get(1).copied().unwrap_or_default().to_owned();

    match err {
        StorageError::DiskFull => StorageError::StorageFull,
        StorageError::FileNotFound | StorageError::FileVersionNotFound => StorageError::ObjectNotFound(bucket, object),
        StorageError::FileNameTooLong => StorageError::ObjectNameInvalid(bucket, object),
        StorageError::VolumeExists => StorageError::BucketExists(bucket),
        StorageError::IsNotRegular => StorageError::ObjectExistsAsDirectory(bucket, object),
        StorageError::VolumeNotFound => StorageError::BucketNotFound(bucket),
        StorageError::VolumeNotEmpty => StorageError::BucketNotEmpty(bucket),
        StorageError::FileAccessDenied => StorageError::PrefixAccessDenied(bucket, object),
        StorageError::ErasureReadQuorum => StorageError::InsufficientReadQuorum(bucket, object),
        StorageError::ErasureWriteQuorum => StorageError::InsufficientWriteQuorum(bucket, object),
        _ => err,
    }
}

pub fn is_err_bucket_not_found(err: &Error) -> bool {
    matches!(err, StorageError::VolumeNotFound | StorageError::BucketNotFound(_))
}

pub fn is_err_object_not_found(err: &Error) -> bool {
    matches!(err, StorageError::FileNotFound | StorageError::ObjectNotFound(..))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_disk_error() {
        assert!(matches!(StorageError::from(DiskError::DiskNotFound), StorageError::DiskNotFound));
        assert!(matches!(
            StorageError::from(DiskError::ErasureWriteQuorum),
            StorageError::ErasureWriteQuorum
        ));
        assert!(matches!(StorageError::from(DiskError::other("boom")), StorageError::Io(_)));
    }

    #[test]
    fn test_io_error_carrying_disk_error_is_unwrapped() {
        let io_err: std::io::Error = DiskError::VolumeNotFound.into();
        assert!(matches!(StorageError::from(io_err), StorageError::VolumeNotFound));
    }

    #[test]
    fn test_to_object_err() {
        let err = to_object_err(StorageError::ErasureWriteQuorum, vec!["bucket", "obj"]);
        assert!(matches!(err, StorageError::InsufficientWriteQuorum(ref b, ref o) if b == "bucket" && o == "obj"));
        assert!(err.is_write_quorum_err());
        assert!(err.is_quorum_err());

        let err = to_object_err(StorageError::VolumeNotFound, vec!["bucket"]);
        assert!(is_err_bucket_not_found(&err));

        let err = to_object_err(StorageError::FileNotFound, vec!["bucket", "a/b"]);
        assert!(is_err_object_not_found(&err));

        let err = to_object_err(StorageError::NotImplemented, vec![]);
        assert!(matches!(err, StorageError::NotImplemented));
    }
}
