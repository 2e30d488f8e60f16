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

use crate::disk::error::{to_file_error, DiskError, Result};
use rustfs_utils::path::SLASH_SEPARATOR;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Check path length according to OS limits.
pub fn check_path_length(path_name: &str) -> Result<()> {
    // Apple OS X path length is limited to 1016
    if cfg!(target_os = "macos") && path_name.len() > 1016 {
        return Err(DiskError::FileNameTooLong);
    }

    // On Unix we reject paths if they are just '.', '..' or '/'
    let invalid_paths = [".", "..", "/"];
    if invalid_paths.contains(&path_name) {
        return Err(DiskError::FileAccessDenied);
    }

    // Each path segment is limited to NAME_MAX (255).
    let mut count = 0usize;
    for c in path_name.chars() {
        match c {
            '/' => count = 0,
            _ => {
                count += 1;
                if count > 255 {
                    return Err(DiskError::FileNameTooLong);
                }
            }
        }
    }

    Ok(())
}

/// Check if the given disk path lives on the same device as `root_disk`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn is_root_disk(disk_path: &str, root_disk: &str) -> Result<bool> {
    if cfg!(target_os = "windows") {
        return Ok(false);
    }

    rustfs_utils::os::same_disk(disk_path, root_disk).map_err(to_file_error)
}

/// Create a directory and all its parent components if they are missing.
pub async fn make_dir_all(path: impl AsRef<Path>) -> Result<()> {
    check_path_length(path.as_ref().to_string_lossy().as_ref())?;

    match fs::create_dir_all(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(to_file_error(e)),
    }
}

/// Check if a directory is empty.
/// Only reads one entry to determine if the directory is empty.
pub async fn is_empty_dir(path: impl AsRef<Path>) -> bool {
    read_dir(path.as_ref(), 1).await.is_ok_and(|v| v.is_empty())
}

/// Return entry names in the directory; directories carry a trailing slash.
/// `count` <= 0 reads everything.
pub async fn read_dir(path: impl AsRef<Path>, count: i32) -> io::Result<Vec<String>> {
    let mut entries = fs::read_dir(path.as_ref()).await?;

    let mut names = Vec::new();
    let mut count = count;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();

        if name.is_empty() || name == "." || name == ".." {
            continue;
        }

        let file_type = entry.file_type().await?;

        if file_type.is_file() {
            names.push(name);
        } else if file_type.is_dir() {
            names.push(format!("{name}{SLASH_SEPARATOR}"));
        }
        count -= 1;
        if count == 0 {
            break;
        }
    }

    Ok(names)
}

/// Rename `src` to `dst`, creating the destination's parent first.
pub async fn rename_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = dst.as_ref().parent() {
        if !file_exists(parent).await {
            make_dir_all(parent).await?;
        }
    }

    if let Err(e) = fs::rename(src.as_ref(), dst.as_ref()).await {
        warn!("rename_all failed. src: {:?}, dst: {:?}, err: {:?}", src.as_ref(), dst.as_ref(), e);
        return Err(to_file_error(e));
    }

    Ok(())
}

/// Remove empty directories from `path` up to, but not including, `base_dir`.
pub async fn remove_empty_parents(path: impl AsRef<Path>, base_dir: impl AsRef<Path>) {
    let base_dir = base_dir.as_ref();
    let mut current = path.as_ref().to_path_buf();

    while current.starts_with(base_dir) && current != base_dir {
        if fs::remove_dir(&current).await.is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

pub async fn file_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path.as_ref()).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path_length() {
        assert!(check_path_length("bucket/object").is_ok());
        assert_eq!(check_path_length("."), Err(DiskError::FileAccessDenied));
        assert_eq!(check_path_length(&"a".repeat(256)), Err(DiskError::FileNameTooLong));
        assert!(check_path_length(&format!("{}/{}", "a".repeat(255), "b".repeat(255))).is_ok());
    }

    #[tokio::test]
    async fn test_read_dir_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();
        fs::write(dir.path().join("file"), b"x").await.unwrap();

        let mut names = read_dir(dir.path(), -1).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["file".to_string(), "sub/".to_string()]);
        assert!(!is_empty_dir(dir.path()).await);
        assert!(is_empty_dir(dir.path().join("sub")).await);
    }

    #[tokio::test]
    async fn test_rename_all_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"data").await.unwrap();

        let dst = dir.path().join("a/b/c/dst");
        rename_all(&src, &dst).await.unwrap();
        assert!(file_exists(&dst).await);
        assert!(!file_exists(&src).await);

        fs::remove_file(&dst).await.unwrap();
        remove_empty_parents(dir.path().join("a/b/c"), dir.path()).await;
        assert!(!file_exists(dir.path().join("a")).await);
        assert!(file_exists(dir.path()).await);
    }
}
