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

use serde::{Deserialize, Serialize};

pub type HealItemType = String;

pub const HEAL_ITEM_METADATA: &str = "metadata";
pub const HEAL_ITEM_BUCKET: &str = "bucket";
pub const HEAL_ITEM_OBJECT: &str = "object";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealDriveInfo {
    pub uuid: String,
    pub endpoint: String,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infos {
    #[serde(rename = "drives")]
    pub drives: Vec<HealDriveInfo>,
}

/// Outcome of one heal operation, with per-drive state before and after.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealResultItem {
    #[serde(rename = "resultId")]
    pub result_index: usize,
    #[serde(rename = "type")]
    pub heal_item_type: HealItemType,
    #[serde(rename = "bucket")]
    pub bucket: String,
    #[serde(rename = "object")]
    pub object: String,
    #[serde(rename = "detail")]
    pub detail: String,
    #[serde(rename = "parityBlocks")]
    pub parity_blocks: usize,
    #[serde(rename = "dataBlocks")]
    pub data_blocks: usize,
    #[serde(rename = "diskCount")]
    pub disk_count: usize,
    #[serde(rename = "setCount")]
    pub set_count: usize,
    #[serde(rename = "before")]
    pub before: Infos,
    #[serde(rename = "after")]
    pub after: Infos,
    #[serde(rename = "objectSize")]
    pub object_size: usize,
}

impl HealResultItem {
    /// Drives whose state changed between the before and after snapshots.
    pub fn changed_drives(&self) -> Vec<(&HealDriveInfo, &HealDriveInfo)> {
        self.before
            .drives
            .iter()
            .zip(self.after.drives.iter())
            .filter(|(b, a)| b != a)
            .collect()
    }

    /// Count of drives in the given state, before and after.
    pub fn get_missing_counts(&self, state: &str) -> (usize, usize) {
        let count = |infos: &Infos| infos.drives.iter().filter(|d| d.state == state).count();
        (count(&self.before), count(&self.after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(uuid: &str, state: &str) -> HealDriveInfo {
        HealDriveInfo {
            uuid: uuid.to_string(),
            endpoint: format!("/mnt/{uuid}"),
            state: state.to_string(),
        }
    }

    #[test]
    fn heal_result_json_uses_admin_field_names() {
        let item = HealResultItem {
            heal_item_type: HEAL_ITEM_METADATA.to_string(),
            detail: "disk-format".to_string(),
            disk_count: 4,
            set_count: 1,
            ..Default::default()
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["type"], "metadata");
        assert_eq!(v["diskCount"], 4);
        assert_eq!(v["setCount"], 1);
        assert!(v["before"]["drives"].is_array());
    }

    #[test]
    fn changed_drives_and_counts() {
        let item = HealResultItem {
            before: Infos {
                drives: vec![drive("a", "ok"), drive("", "missing")],
            },
            after: Infos {
                drives: vec![drive("a", "ok"), drive("b", "ok")],
            },
            ..Default::default()
        };
        let changed = item.changed_drives();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].1.uuid, "b");
        assert_eq!(item.get_missing_counts("missing"), (1, 0));
        assert_eq!(item.get_missing_counts("ok"), (1, 2));
    }
}
