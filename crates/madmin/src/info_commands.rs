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
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Disk {
    pub endpoint: String,
    pub root_disk: bool,
    pub drive_path: String,
    pub healing: bool,
    pub state: String,
    pub uuid: String,
    pub major: u32,
    pub minor: u32,
    pub total_space: u64,
    pub used_space: u64,
    pub available_space: u64,
    pub used_inodes: u64,
    pub free_inodes: u64,
    pub local: bool,
    pub pool_index: i32,
    pub set_index: i32,
    pub disk_index: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendByte {
    #[default]
    Unknown,
    FS,
    Erasure,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub disks: Vec<Disk>,
    pub backend: BackendInfo,
}

impl StorageInfo {
    /// Sum online and offline disk counts across endpoints.
    pub fn disk_counts(&self) -> (usize, usize) {
        (self.backend.online_disks.sum(), self.backend.offline_disks.sum())
    }
}

/// Disk counts keyed by endpoint host (or path for local drives).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDisks(HashMap<String, usize>);

impl BackendDisks {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn sum(&self) -> usize {
        self.0.values().sum()
    }

    pub fn add(&mut self, endpoint: &str, n: usize) {
        *self.0.entry(endpoint.to_string()).or_default() += n;
    }

    pub fn merge(&mut self, other: &BackendDisks) {
        for (k, v) in other.0.iter() {
            self.add(k, *v);
        }
    }

    pub fn get(&self, endpoint: &str) -> usize {
        self.0.get(endpoint).copied().unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackendInfo {
    pub backend_type: BackendByte,
    pub online_disks: BackendDisks,
    pub offline_disks: BackendDisks,
    #[serde(rename = "StandardSCData")]
    pub standard_sc_data: Vec<usize>,
    #[serde(rename = "StandardSCParity")]
    pub standard_sc_parity: Option<usize>,
    pub total_sets: Vec<usize>,
    pub drives_per_set: Vec<usize>,
}
