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

use super::*;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MakeBucketOptions {
    pub force_create: bool, // Create buckets even if they are already created.
    pub no_lock: bool,
}

#[derive(Debug, Default, Clone)]
pub struct DeleteBucketOptions {
    pub no_recreate: bool,
    pub force: bool, // Force deletion
}

#[derive(Debug, Default, Clone)]
pub struct ObjectOptions {
    pub user_defined: HashMap<String, String>,
    pub no_lock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BucketInfo {
    pub name: String,
    pub created: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Clone)]
pub struct MultipartUploadResult {
    pub upload_id: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartInfo {
    pub part_num: usize,
    pub last_mod: Option<OffsetDateTime>,
    pub size: usize,
    pub etag: Option<String>,
    pub actual_size: i64,
}

impl From<&ObjectPartInfo> for PartInfo {
    fn from(p: &ObjectPartInfo) -> Self {
        Self {
            part_num: p.number,
            last_mod: p.mod_time,
            size: p.size,
            etag: Some(p.etag.clone()),
            actual_size: p.actual_size,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletePart {
    pub part_num: usize,
    pub etag: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub mod_time: Option<OffsetDateTime>,
    pub size: i64,
    pub is_dir: bool,
    pub user_defined: HashMap<String, String>,
    pub parity_blocks: usize,
    pub data_blocks: usize,
    pub parts: Vec<ObjectPartInfo>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl ObjectInfo {
    pub fn from_file_info(fi: &FileInfo, bucket: &str, object: &str) -> ObjectInfo {
        let content_type = fi.metadata.get(CONTENT_TYPE_KEY).cloned();
        let etag = fi.metadata.get(ETAG_KEY).cloned();

        let user_defined = fi
            .metadata
            .iter()
            .filter(|(k, _)| k.as_str() != ETAG_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        ObjectInfo {
            bucket: bucket.to_owned(),
            name: object.to_owned(),
            mod_time: fi.mod_time,
            size: fi.size,
            is_dir: fi.is_dir,
            user_defined,
            parity_blocks: fi.erasure.parity_blocks,
            data_blocks: fi.erasure.data_blocks,
            parts: fi.parts.clone(),
            content_type,
            etag,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.etag.as_ref().is_some_and(|v| v.len() != 32)
    }
}

#[derive(Debug, Default)]
pub struct ListObjectsInfo {
    // Indicates whether the returned list objects response is truncated.
    pub is_truncated: bool,

    // When the response is truncated, use this key as marker in the subsequent request.
    pub next_marker: Option<String>,

    pub objects: Vec<ObjectInfo>,

    pub prefixes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ListObjectsV2Info {
    pub is_truncated: bool,

    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,

    pub objects: Vec<ObjectInfo>,

    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartInfo {
    pub bucket: String,

    pub object: String,

    pub upload_id: String,

    // Date and time at which the multipart upload was initiated.
    pub initiated: Option<OffsetDateTime>,

    // Metadata set during new_multipart_upload.
    pub user_defined: HashMap<String, String>,
}

/// Pending uploads of a bucket.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartsInfo {
    pub key_marker: Option<String>,

    pub upload_id_marker: Option<String>,

    pub next_key_marker: Option<String>,

    pub next_upload_id_marker: Option<String>,

    pub max_uploads: usize,

    pub is_truncated: bool,

    pub uploads: Vec<MultipartInfo>,

    pub prefix: String,

    // Only `/` is supported.
    pub delimiter: Option<String>,

    pub common_prefixes: Vec<String>,
}

/// ListPartsInfo - represents list of all parts.
#[derive(Debug, Clone, Default)]
pub struct ListPartsInfo {
    pub bucket: String,

    pub object: String,

    pub upload_id: String,

    /// Part number after which listing begins.
    pub part_number_marker: usize,

    /// Last part in the list when truncated.
    pub next_part_number_marker: usize,

    pub max_parts: usize,

    pub is_truncated: bool,

    pub parts: Vec<PartInfo>,

    pub user_defined: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_info_from_file_info() {
        let mut fi = FileInfo::new("photos/a.png", 2, 2);
        fi.size = 42;
        fi.metadata.insert(ETAG_KEY.to_owned(), "0123456789abcdef0123456789abcdef".to_owned());
        fi.metadata.insert(CONTENT_TYPE_KEY.to_owned(), "image/png".to_owned());
        fi.metadata.insert("x-amz-meta-owner".to_owned(), "ops".to_owned());

        let oi = ObjectInfo::from_file_info(&fi, "bucket", "photos/a.png");
        assert_eq!(oi.bucket, "bucket");
        assert_eq!(oi.size, 42);
        assert_eq!(oi.data_blocks, 2);
        assert_eq!(oi.content_type.as_deref(), Some("image/png"));
        assert!(!oi.user_defined.contains_key(ETAG_KEY));
        assert_eq!(oi.user_defined.get("x-amz-meta-owner").map(String::as_str), Some("ops"));
        assert!(!oi.is_multipart());

        let mut oi = oi;
        oi.etag = Some("0123456789abcdef0123456789abcdef-3".to_owned());
        assert!(oi.is_multipart());
    }
}
