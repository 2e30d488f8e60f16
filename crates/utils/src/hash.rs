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

/// IEEE CRC32 checksum of the key bytes.
pub fn crc32(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// CRC32 hash function to hash a string key into a bucket index.
///
/// # Arguments
/// * `key` - The input string to be hashed
/// * `cardinality` - The number of buckets
///
/// # Returns
/// A usize representing the bucket index, or `None` when `cardinality` is zero
///
pub fn crc_hash(key: &str, cardinality: usize) -> Option<usize> {
    if cardinality == 0 {
        return None;
    }

    Some(crc32(key) as usize % cardinality)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        // IEEE polynomial check value
        assert_eq!(crc32("123456789"), 0xCBF4_3926);
        assert_eq!(crc32(""), 0);
    }

    #[test]
    fn test_crc_hash_is_stable() {
        for key in ["object", "a/b/c.txt", "photos/2024/01/01.jpg", ""] {
            let first = crc_hash(key, 16);
            for _ in 0..8 {
                assert_eq!(crc_hash(key, 16), first);
            }
            assert!(first.unwrap() < 16);
        }
    }

    #[test]
    fn test_crc_hash_zero_cardinality() {
        assert_eq!(crc_hash("object", 0), None);
    }

    #[test]
    fn test_crc_hash_matches_modulo() {
        let key = "123456789";
        assert_eq!(crc_hash(key, 7), Some(0xCBF4_3926usize % 7));
        assert_eq!(crc_hash(key, 1), Some(0));
    }
}
