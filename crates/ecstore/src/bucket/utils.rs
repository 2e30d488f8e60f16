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

use crate::disk::RUSTFS_META_BUCKET;
use crate::error::{Error, Result, StorageError};
use regex::Regex;
use rustfs_utils::path::SLASH_SEPARATOR;
use uuid::Uuid;

pub fn is_meta_bucketname(name: &str) -> bool {
    name.starts_with(RUSTFS_META_BUCKET)
}

lazy_static::lazy_static! {
    static ref VALID_BUCKET_NAME_STRICT: Regex = Regex::new(r"^[a-z0-9][a-z0-9\.\-]{1,61}[a-z0-9]$").unwrap();
    static ref IP_ADDRESS: Regex = Regex::new(r"^(\d+\.){3}\d+$").unwrap();
}

pub fn check_valid_bucket_name_strict(bucket_name: &str) -> Result<()> {
    let bucket_name_trimmed = bucket_name.trim();

    if bucket_name_trimmed.is_empty() {
        return Err(Error::other("Bucket name cannot be empty"));
    }
    if bucket_name_trimmed.len() < 3 {
        return Err(Error::other("Bucket name cannot be shorter than 3 characters"));
    }
    if bucket_name_trimmed.len() > 63 {
        return Err(Error::other("Bucket name cannot be longer than 63 characters"));
    }

    if IP_ADDRESS.is_match(bucket_name_trimmed) {
        return Err(Error::other("Bucket name cannot be an IP address"));
    }
    if bucket_name_trimmed.contains("..") || bucket_name_trimmed.contains(".-") || bucket_name_trimmed.contains("-.") {
        return Err(Error::other("Bucket name contains invalid characters"));
    }
    if !VALID_BUCKET_NAME_STRICT.is_match(bucket_name_trimmed) {
        return Err(Error::other("Bucket name contains invalid characters"));
    }
    Ok(())
}

/// Bucket names accepted by make/delete bucket. The meta bucket is reserved.
pub fn check_bucket_name(bucket: &str) -> Result<()> {
    if is_meta_bucketname(bucket) || check_valid_bucket_name_strict(bucket).is_err() {
        return Err(StorageError::BucketNameInvalid(bucket.to_string()));
    }
    Ok(())
}

pub fn has_bad_path_component(path: &str) -> bool {
    let n = path.len();
    if n > 32 << 10 {
        // At 32K we are beyond reasonable.
        return true;
    }

    let bytes = path.as_bytes();
    let mut i = 0;

    // Skip leading slashes (for sake of Windows \ is included as well)
    while i < n && (bytes[i] == b'/' || bytes[i] == b'\\') {
        i += 1;
    }

    while i < n {
        let start = i;
        while i < n && bytes[i] != b'/' && bytes[i] != b'\\' {
            i += 1;
        }

        // Trim whitespace of segment
        let mut segment_start = start;
        let mut segment_end = i;

        while segment_start < segment_end && bytes[segment_start].is_ascii_whitespace() {
            segment_start += 1;
        }
        while segment_end > segment_start && bytes[segment_end - 1].is_ascii_whitespace() {
            segment_end -= 1;
        }

        match segment_end - segment_start {
            2 if bytes[segment_start] == b'.' && bytes[segment_start + 1] == b'.' => {
                return true;
            }
            1 if bytes[segment_start] == b'.' => {
                return true;
            }
            _ => {}
        }

        if i < n {
            i += 1;
        }
    }

    false
}

pub fn is_valid_object_prefix(object: &str) -> bool {
    if has_bad_path_component(object) {
        return false;
    }

    if object.contains("//") {
        return false;
    }

    // Valid for S3 but never works on a filesystem.
    !object.contains('\0')
}

pub fn is_valid_object_name(object: &str) -> bool {
    if object.is_empty() {
        return false;
    }

    if object.ends_with(SLASH_SEPARATOR) {
        return false;
    }

    is_valid_object_prefix(object)
}

fn check_bucket_arg(bucket: &str) -> Result<()> {
    if !is_meta_bucketname(bucket) && check_valid_bucket_name_strict(bucket).is_err() {
        return Err(StorageError::BucketNameInvalid(bucket.to_string()));
    }
    Ok(())
}

pub fn check_object_args(bucket: &str, object: &str) -> Result<()> {
    check_bucket_arg(bucket)?;

    if object.len() > 1024 || object.starts_with(SLASH_SEPARATOR) || !is_valid_object_name(object) {
        return Err(StorageError::ObjectNameInvalid(bucket.to_string(), object.to_string()));
    }

    Ok(())
}

pub fn check_list_objs_args(bucket: &str, prefix: &str) -> Result<()> {
    check_bucket_arg(bucket)?;

    if !is_valid_object_prefix(prefix) {
        return Err(StorageError::ObjectNameInvalid(bucket.to_string(), prefix.to_string()));
    }

    Ok(())
}

/// Upload ids are UUIDs; anything else cannot name an upload directory.
pub fn check_multipart_object_args(bucket: &str, object: &str, upload_id: &str) -> Result<()> {
    if Uuid::parse_str(upload_id).is_err() {
        return Err(StorageError::InvalidUploadID(
            bucket.to_owned(),
            object.to_owned(),
            upload_id.to_owned(),
        ));
    }
    check_object_args(bucket, object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_object_name() {
        assert!(is_valid_object_name("valid-object-name"));
        assert!(is_valid_object_name("object/with/slashes"));
        assert!(is_valid_object_name("object with spaces"));
        assert!(is_valid_object_name("path/to/file.txt"));

        assert!(!is_valid_object_name(""));
        assert!(!is_valid_object_name("object/"));
        assert!(!is_valid_object_name("."));
        assert!(!is_valid_object_name(".."));
        assert!(!is_valid_object_name("object/.."));
        assert!(!is_valid_object_name("../object"));
        assert!(!is_valid_object_name("path/./other"));
        assert!(!is_valid_object_name("object//with//double//slashes"));
        assert!(!is_valid_object_name("object\x00"));

        let long_path = "a/".repeat(16385);
        assert!(!is_valid_object_name(&long_path));
    }

    #[test]
    fn test_is_valid_object_prefix() {
        assert!(is_valid_object_prefix(""));
        assert!(is_valid_object_prefix("prefix/"));
        assert!(is_valid_object_prefix("deep/nested/prefix/"));
        assert!(!is_valid_object_prefix("prefix/.."));
        assert!(!is_valid_object_prefix("trailing/double/slash//"));
    }

    #[test]
    fn test_bucket_names() {
        assert!(check_bucket_name("valid-bucket").is_ok());
        assert!(check_bucket_name("a.b.c").is_ok());

        for bad in ["", "ab", "INVALID", "192.168.1.1", "bad..name", "-lead", ".rustfs.sys", "under_score"] {
            assert!(
                matches!(check_bucket_name(bad), Err(StorageError::BucketNameInvalid(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_object_args() {
        assert!(check_object_args("test-bucket", "folder/test-object").is_ok());
        assert!(check_object_args(RUSTFS_META_BUCKET, "format.json").is_ok());
        assert!(matches!(
            check_object_args("test-bucket", "/lead"),
            Err(StorageError::ObjectNameInvalid(..))
        ));
        assert!(check_object_args("INVALID", "obj").is_err());

        assert!(check_list_objs_args("test-bucket", "").is_ok());
        assert!(check_list_objs_args("test-bucket", "a/../b").is_err());
    }

    #[test]
    fn test_multipart_args() {
        let id = Uuid::new_v4().to_string();
        assert!(check_multipart_object_args("test-bucket", "obj", &id).is_ok());
        assert!(matches!(
            check_multipart_object_args("test-bucket", "obj", "../../etc"),
            Err(StorageError::InvalidUploadID(..))
        ));
    }
}
