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

use crate::disk::DiskInfo;
use crate::disk::error::{DiskError, Result};
use crate::topology::DiskCoord;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use tracing::debug;
use uuid::Uuid;

/// Identity recorded for a slot whose drive was missing when the format was written.
pub const OFFLINE_DISK_UUID: Uuid = Uuid::max();

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum FormatMetaVersion {
    #[serde(rename = "1")]
    V1,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum FormatBackend {
    #[serde(rename = "xl")]
    Erasure,
    #[serde(rename = "xl-single")]
    ErasureSingle,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum FormatErasureVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,

    #[serde(other)]
    Unknown,
}

/// Hash function used to map object names to sets.
///
/// Only `CRCMOD` routes. Any tag this build does not know deserializes as
/// `Unknown`, which routes nothing.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DistributionAlgo {
    #[serde(rename = "CRCMOD")]
    CrcMod,

    #[serde(other)]
    Unknown,
}

/// FormatErasureV3 carries the set layout generated the first time fresh
/// disks were supplied. `sets[i][j]` is the identity of the drive in slot `j`
/// of set `i`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FormatErasureV3 {
    /// Version of 'xl' format.
    pub version: FormatErasureVersion,

    /// This field carries assigned disk uuid.
    pub this: Uuid,

    pub sets: Vec<Vec<Uuid>>,

    #[serde(rename = "distributionAlgo")]
    pub distribution_algo: DistributionAlgo,
}

/// format.json, stored under `.rustfs.sys` on every drive:
///
/// ```json
/// {
///   "version": "1",
///   "format": "xl",
///   "id": "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX",
///   "xl": { "version": "3", "this": "...", "sets": [[...]], "distributionAlgo": "CRCMOD" }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FormatV3 {
    /// Version of the format config.
    pub version: FormatMetaVersion,

    /// Format indicates the backend format type, supports two values 'xl' and 'xl-single'.
    pub format: FormatBackend,

    /// ID is the identifier for the rustfs deployment
    pub id: Uuid,

    #[serde(rename = "xl")]
    pub erasure: FormatErasureV3,

    /// Usage of the drive the format was read from. Only filled in heal mode.
    #[serde(skip)]
    pub disk_info: Option<DiskInfo>,
}

impl TryFrom<&[u8]> for FormatV3 {
    type Error = JsonError;

    fn try_from(data: &[u8]) -> std::result::Result<Self, Self::Error> {
        serde_json::from_slice(data)
    }
}

impl TryFrom<&str> for FormatV3 {
    type Error = JsonError;

    fn try_from(data: &str) -> std::result::Result<Self, Self::Error> {
        serde_json::from_str(data)
    }
}

impl FormatV3 {
    /// Create a new format config with fresh identities for every slot.
    pub fn new(num_sets: usize, set_len: usize) -> Self {
        let format = if set_len == 1 {
            FormatBackend::ErasureSingle
        } else {
            FormatBackend::Erasure
        };

        let erasure = FormatErasureV3 {
            version: FormatErasureVersion::V3,
            this: Uuid::nil(),
            sets: (0..num_sets)
                .map(|_| (0..set_len).map(|_| Uuid::new_v4()).collect())
                .collect(),
            distribution_algo: DistributionAlgo::CrcMod,
        };

        Self {
            version: FormatMetaVersion::V1,
            format,
            id: Uuid::new_v4(),
            erasure,
            disk_info: None,
        }
    }

    /// Total number of drives across all sets.
    pub fn drives(&self) -> usize {
        self.erasure.sets.iter().map(|v| v.len()).sum()
    }

    pub fn set_count(&self) -> usize {
        self.erasure.sets.len()
    }

    pub fn drives_per_set(&self) -> usize {
        self.erasure.sets.first().map(|s| s.len()).unwrap_or_default()
    }

    pub fn to_json(&self) -> std::result::Result<String, JsonError> {
        serde_json::to_string(self)
    }

    /// A copy of this format that claims the given identity.
    pub fn with_this(&self, this: Uuid) -> Self {
        let mut fm = self.clone();
        fm.erasure.this = this;
        fm.disk_info = None;
        fm
    }

    pub fn uuid_at(&self, coord: DiskCoord) -> Option<Uuid> {
        self.erasure
            .sets
            .get(coord.set.0)
            .and_then(|set| set.get(coord.slot.0))
            .copied()
    }

    pub fn is_offline_at(&self, coord: DiskCoord) -> bool {
        self.uuid_at(coord) == Some(OFFLINE_DISK_UUID)
    }

    /// Locate `disk_id` in the `sets` matrix. Matching is exact.
    pub fn find_disk_index_by_disk_id(&self, disk_id: Uuid) -> Result<DiskCoord> {
        if disk_id.is_nil() || disk_id == OFFLINE_DISK_UUID {
            return Err(DiskError::DiskNotFound);
        }

        for (i, set) in self.erasure.sets.iter().enumerate() {
            for (j, d) in set.iter().enumerate() {
                if disk_id.eq(d) {
                    return Ok(DiskCoord::new(i, j));
                }
            }
        }

        debug!("disk id {disk_id} not found in reference format");
        Err(DiskError::DiskIdMismatch)
    }

    /// Same set count, same set sizes and same distribution algorithm.
    pub fn check_structure(&self, other: &FormatV3) -> Result<()> {
        if self.erasure.sets.len() != other.erasure.sets.len() {
            debug!(
                "expected number of sets {}, got {}",
                self.erasure.sets.len(),
                other.erasure.sets.len()
            );
            return Err(DiskError::InconsistentDisk);
        }

        for (i, (ours, theirs)) in self.erasure.sets.iter().zip(other.erasure.sets.iter()).enumerate() {
            if ours.len() != theirs.len() {
                debug!("set {i} should be of size {}, got {}", ours.len(), theirs.len());
                return Err(DiskError::InconsistentDisk);
            }
        }

        if self.erasure.distribution_algo != other.erasure.distribution_algo {
            debug!(
                "expected distribution algo {:?}, got {:?}",
                self.erasure.distribution_algo, other.erasure.distribution_algo
            );
            return Err(DiskError::InconsistentDisk);
        }

        Ok(())
    }

    /// Full compatibility check of a drive's format against this reference:
    /// structure, every slot identity, and `other.this` present in the matrix.
    pub fn check_other(&self, other: &FormatV3) -> Result<()> {
        self.check_structure(other)?;

        for (i, (ours, theirs)) in self.erasure.sets.iter().zip(other.erasure.sets.iter()).enumerate() {
            for (j, (a, b)) in ours.iter().zip(theirs.iter()).enumerate() {
                if a != b {
                    debug!("UUID on position {i}:{j} do not match, expected {a} got {b}");
                    return Err(DiskError::InconsistentDisk);
                }
            }
        }

        let this = other.erasure.this;
        if other.erasure.sets.iter().flatten().any(|id| *id == this) {
            return Ok(());
        }

        debug!("drive id {this} not found in any drive sets");
        Err(DiskError::DiskIdMismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
        {
            "version": "1",
            "format": "xl",
            "id": "321b3874-987d-4c15-8fa5-757c956b1243",
            "xl": {
                "version": "3",
                "this": "c26315da-05cf-4778-a9ea-b44ea09f58c5",
                "sets": [
                    [
                        "8ab9a908-f869-4f1f-8e42-eb067ffa7eb5",
                        "c26315da-05cf-4778-a9ea-b44ea09f58c5",
                        "fb87a891-18d3-44cf-a46f-bcc15093a038",
                        "356a925c-57b9-4313-88b3-053edf1104dc"
                    ]
                ],
                "distributionAlgo": "CRCMOD"
            }
        }"#;

    #[test]
    fn test_parse_format_json() {
        let fm = FormatV3::try_from(SAMPLE).unwrap();
        assert_eq!(fm.version, FormatMetaVersion::V1);
        assert_eq!(fm.format, FormatBackend::Erasure);
        assert_eq!(fm.erasure.version, FormatErasureVersion::V3);
        assert_eq!(fm.erasure.distribution_algo, DistributionAlgo::CrcMod);
        assert_eq!(fm.set_count(), 1);
        assert_eq!(fm.drives_per_set(), 4);
        assert_eq!(
            fm.find_disk_index_by_disk_id(fm.erasure.this).unwrap(),
            DiskCoord::new(0, 1)
        );
    }

    #[test]
    fn test_unknown_algo_parses_as_unknown() {
        let data = SAMPLE.replace("CRCMOD", "SIPMOD+PARITY");
        let fm = FormatV3::try_from(data.as_str()).unwrap();
        assert_eq!(fm.erasure.distribution_algo, DistributionAlgo::Unknown);
    }

    #[test]
    fn test_format_v3_new() {
        let format = FormatV3::new(2, 4);
        assert_eq!(format.format, FormatBackend::Erasure);
        assert_eq!(format.erasure.sets.len(), 2);
        assert_eq!(format.drives(), 8);
        assert_eq!(format.erasure.this, Uuid::nil());

        let single = FormatV3::new(1, 1);
        assert_eq!(single.format, FormatBackend::ErasureSingle);
    }

    #[test]
    fn test_to_json_round_trip() {
        let format = FormatV3::new(2, 2).with_this(Uuid::new_v4());
        let json = format.to_json().unwrap();
        assert!(json.contains("\"format\":\"xl\""));
        assert!(json.contains("\"distributionAlgo\":\"CRCMOD\""));
        let parsed = FormatV3::try_from(json.as_bytes()).unwrap();
        assert_eq!(parsed, format);
    }

    #[test]
    fn test_find_disk_index_rejects_sentinels() {
        let format = FormatV3::new(2, 4);
        assert_eq!(format.find_disk_index_by_disk_id(Uuid::nil()), Err(DiskError::DiskNotFound));
        assert_eq!(format.find_disk_index_by_disk_id(OFFLINE_DISK_UUID), Err(DiskError::DiskNotFound));
        assert_eq!(format.find_disk_index_by_disk_id(Uuid::new_v4()), Err(DiskError::DiskIdMismatch));

        let id = format.erasure.sets[1][3];
        assert_eq!(format.find_disk_index_by_disk_id(id).unwrap(), DiskCoord::new(1, 3));
    }

    #[test]
    fn test_check_other() {
        let reference = FormatV3::new(2, 4);
        let good = reference.with_this(reference.erasure.sets[0][2]);
        assert!(reference.check_other(&good).is_ok());

        let stranger = reference.with_this(Uuid::new_v4());
        assert_eq!(reference.check_other(&stranger), Err(DiskError::DiskIdMismatch));

        let mut swapped = good.clone();
        swapped.erasure.sets[1][0] = Uuid::new_v4();
        assert_eq!(reference.check_other(&swapped), Err(DiskError::InconsistentDisk));

        let other_layout = FormatV3::new(4, 2);
        assert_eq!(reference.check_structure(&other_layout), Err(DiskError::InconsistentDisk));

        let mut other_algo = good.clone();
        other_algo.erasure.distribution_algo = DistributionAlgo::Unknown;
        assert_eq!(reference.check_structure(&other_algo), Err(DiskError::InconsistentDisk));
    }

    #[test]
    fn test_offline_slot() {
        let mut format = FormatV3::new(1, 4);
        format.erasure.sets[0][2] = OFFLINE_DISK_UUID;
        assert!(format.is_offline_at(DiskCoord::new(0, 2)));
        assert!(!format.is_offline_at(DiskCoord::new(0, 1)));
        assert_eq!(format.uuid_at(DiskCoord::new(3, 0)), None);
    }
}
