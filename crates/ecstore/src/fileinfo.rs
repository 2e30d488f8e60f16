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

use crate::erasure_coding::calc_shard_size;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

pub const ERASURE_ALGORITHM: &str = "rs-vandermonde";
pub const BLOCK_SIZE_V2: usize = 1024 * 1024; // 1M

/// Metadata key holding the object etag.
pub const ETAG_KEY: &str = "etag";
pub const CONTENT_TYPE_KEY: &str = "content-type";

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct ObjectPartInfo {
    pub etag: String,
    pub number: usize,
    pub size: usize,
    pub actual_size: i64,
    pub mod_time: Option<OffsetDateTime>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct ErasureInfo {
    pub algorithm: String,
    pub data_blocks: usize,
    pub parity_blocks: usize,
    pub block_size: usize,
    /// 1-based shard index held by this disk. Zero when unknown.
    pub index: usize,
    /// `distribution[i]` is the 1-based shard index stored on the i-th disk of the set.
    pub distribution: Vec<usize>,
}

impl ErasureInfo {
    /// Size of one shard of a part of `part_size` bytes.
    pub fn shard_file_size(&self, part_size: usize) -> usize {
        if part_size == 0 || self.data_blocks == 0 {
            return 0;
        }
        calc_shard_size(part_size, self.data_blocks)
    }

    pub fn equals(&self, other: &ErasureInfo) -> bool {
        self.algorithm == other.algorithm
            && self.data_blocks == other.data_blocks
            && self.parity_blocks == other.parity_blocks
            && self.block_size == other.block_size
            && self.distribution == other.distribution
    }
}

/// One object as recorded in `xl.meta` on one disk, or one directory entry
/// produced by a walk.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct FileInfo {
    pub volume: String,
    pub name: String,
    pub mod_time: Option<OffsetDateTime>,
    pub size: i64,
    pub metadata: HashMap<String, String>,
    pub parts: Vec<ObjectPartInfo>,
    pub erasure: ErasureInfo,

    /// Set for common-prefix entries of a non-recursive walk.
    #[serde(skip)]
    pub is_dir: bool,

    /// Minimum number of identical disk entries needed to trust this entry.
    /// Zero for directories.
    #[serde(skip)]
    pub quorum: usize,
}

impl FileInfo {
    pub fn new(object: &str, data_blocks: usize, parity_blocks: usize) -> Self {
        Self {
            name: object.to_owned(),
            erasure: ErasureInfo {
                algorithm: String::from(ERASURE_ALGORITHM),
                data_blocks,
                parity_blocks,
                block_size: BLOCK_SIZE_V2,
                distribution: hash_order(object, data_blocks + parity_blocks),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A directory entry as emitted by a non-recursive walk.
    pub fn new_dir(volume: &str, name: &str) -> Self {
        Self {
            volume: volume.to_owned(),
            name: name.to_owned(),
            is_dir: true,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        let data = self.erasure.data_blocks;
        let parity = self.erasure.parity_blocks;
        data >= parity
            && data > 0
            && self.erasure.index > 0
            && self.erasure.index <= data + parity
            && self.erasure.distribution.len() == data + parity
    }

    pub fn write_quorum(&self) -> usize {
        object_write_quorum(self.erasure.data_blocks, self.erasure.parity_blocks)
    }

    pub fn read_quorum(&self) -> usize {
        self.erasure.data_blocks
    }

    pub fn etag(&self) -> Option<String> {
        self.metadata.get(ETAG_KEY).cloned()
    }

    pub fn add_object_part(&mut self, number: usize, etag: String, size: usize, mod_time: Option<OffsetDateTime>) {
        let part = ObjectPartInfo {
            etag,
            number,
            size,
            actual_size: size as i64,
            mod_time,
        };

        match self.parts.iter().position(|p| p.number == number) {
            Some(idx) => self.parts[idx] = part,
            None => {
                self.parts.push(part);
                self.parts.sort_by_key(|p| p.number);
            }
        }
    }

    /// Two disk copies describe the same version of an object.
    pub fn is_same_version(&self, other: &FileInfo) -> bool {
        self.mod_time == other.mod_time
            && self.size == other.size
            && self.etag() == other.etag()
            && self.parts.len() == other.parts.len()
            && self.erasure.equals(&other.erasure)
    }
}

/// Write quorum of an object with the given layout.
pub fn object_write_quorum(data_blocks: usize, parity_blocks: usize) -> usize {
    if data_blocks == parity_blocks {
        data_blocks + 1
    } else {
        data_blocks
    }
}

/// Rotation of shard indexes over the disks of a set, seeded by the object name.
pub fn hash_order(key: &str, cardinality: usize) -> Vec<usize> {
    if cardinality == 0 {
        return Vec::new();
    }

    let start = rustfs_utils::hash::crc32(key) as usize % cardinality;
    (1..=cardinality).map(|i| 1 + ((start + i) % cardinality)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_order_is_a_permutation() {
        let order = hash_order("object", 6);
        assert_eq!(order.len(), 6);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(order, hash_order("object", 6));
        assert!(hash_order("x", 0).is_empty());
    }

    #[test]
    fn test_quorums() {
        let fi = FileInfo::new("a", 2, 2);
        assert_eq!(fi.write_quorum(), 3);
        assert_eq!(fi.read_quorum(), 2);

        let fi = FileInfo::new("a", 12, 4);
        assert_eq!(fi.write_quorum(), 12);
        assert_eq!(fi.erasure.distribution.len(), 16);
    }

    #[test]
    fn test_is_valid() {
        let mut fi = FileInfo::new("a", 2, 2);
        assert!(!fi.is_valid());
        fi.erasure.index = 1;
        assert!(fi.is_valid());
        fi.erasure.index = 5;
        assert!(!fi.is_valid());
    }

    #[test]
    fn test_add_object_part_keeps_order() {
        let mut fi = FileInfo::new("a", 2, 2);
        fi.add_object_part(3, "c".into(), 10, None);
        fi.add_object_part(1, "a".into(), 10, None);
        fi.add_object_part(3, "d".into(), 12, None);
        let numbers: Vec<_> = fi.parts.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(fi.parts[1].etag, "d");
        assert_eq!(fi.parts[1].size, 12);
    }

    #[test]
    fn test_skipped_fields_do_not_persist() {
        let mut fi = FileInfo::new_dir("bucket", "dir/");
        fi.quorum = 3;
        let json = serde_json::to_string(&fi).unwrap();
        let back: FileInfo = serde_json::from_str(&json).unwrap();
        assert!(!back.is_dir);
        assert_eq!(back.quorum, 0);
        assert_eq!(back.name, "dir/");
    }
}
