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

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{get_info, same_disk};

#[cfg(not(unix))]
pub fn get_info(_p: impl AsRef<std::path::Path>) -> std::io::Result<DiskInfo> {
    Err(std::io::Error::other("disk statistics are only supported on unix"))
}

#[cfg(not(unix))]
pub fn same_disk(disk1: &str, disk2: &str) -> std::io::Result<bool> {
    Ok(std::fs::canonicalize(disk1)? == std::fs::canonicalize(disk2)?)
}

/// Capacity figures of the filesystem backing a drive.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct DiskInfo {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub files: u64,
    pub ffree: u64,
    pub major: u64,
    pub minor: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_get_info_valid_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let info = get_info(temp_dir.path()).unwrap();

        assert!(info.total > 0);
        assert!(info.used <= info.total);
        assert_eq!(info.total - info.used, info.free);
    }

    #[test]
    fn test_get_info_invalid_path() {
        let invalid_path = PathBuf::from("/invalid/path/for/rustfs");
        assert!(get_info(&invalid_path).is_err());
    }

    #[test]
    fn test_same_disk_same_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().to_str().unwrap();

        assert!(same_disk(path, path).unwrap());
    }

    #[test]
    fn test_same_disk_missing_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("gone");
        assert!(same_disk(temp_dir.path().to_str().unwrap(), missing.to_str().unwrap()).is_err());
    }
}
