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

//! The disk table: which live handle sits at which `(set, slot)`.
//!
//! A [`Topology`] is created once per server and shared by every erasure set,
//! the connection monitor and format healing. The table lock is only ever held
//! to copy or replace entries, never across disk I/O.

use crate::disk::endpoint::Endpoint;
use crate::disk::format::FormatV3;
use crate::disk::{DiskAPI, DiskStore};
use crate::endpoints::PoolEndpoints;
use rustfs_common::heal_channel::HealTaskQueue;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub usize);

/// Position of a drive: slot `slot` of erasure set `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskCoord {
    pub set: SetIndex,
    pub slot: SlotIndex,
}

impl DiskCoord {
    pub fn new(set: usize, slot: usize) -> Self {
        Self {
            set: SetIndex(set),
            slot: SlotIndex(slot),
        }
    }

    /// Offset into the flat endpoint list.
    pub fn to_flat(self, drives_per_set: usize) -> usize {
        self.set.0 * drives_per_set + self.slot.0
    }

    pub fn from_flat(flat: usize, drives_per_set: usize) -> Self {
        if drives_per_set == 0 {
            return Self::new(0, flat);
        }
        Self::new(flat / drives_per_set, flat % drives_per_set)
    }
}

impl fmt::Display for DiskCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.set.0, self.slot.0)
    }
}

type DiskTable = Vec<Vec<Option<DiskStore>>>;

pub struct Topology {
    endpoints: PoolEndpoints,
    format: RwLock<FormatV3>,
    disks: RwLock<DiskTable>,
    heal_queue: Option<HealTaskQueue>,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("set_count", &self.endpoints.set_count)
            .field("drives_per_set", &self.endpoints.drives_per_set)
            .finish()
    }
}

impl Topology {
    /// An empty table for `endpoints`, governed by the reference `format`.
    pub fn new(endpoints: PoolEndpoints, format: FormatV3, heal_queue: Option<HealTaskQueue>) -> Self {
        let disks = (0..endpoints.set_count)
            .map(|_| vec![None; endpoints.drives_per_set])
            .collect();

        Self {
            endpoints,
            format: RwLock::new(format),
            disks: RwLock::new(disks),
            heal_queue,
        }
    }

    pub fn set_count(&self) -> usize {
        self.endpoints.set_count
    }

    pub fn drives_per_set(&self) -> usize {
        self.endpoints.drives_per_set
    }

    pub fn total_drives(&self) -> usize {
        self.endpoints.total_drives()
    }

    pub fn endpoints(&self) -> &PoolEndpoints {
        &self.endpoints
    }

    pub fn endpoint_at(&self, coord: DiskCoord) -> Option<&Endpoint> {
        self.endpoints.endpoint_at(coord)
    }

    pub fn heal_queue(&self) -> Option<&HealTaskQueue> {
        self.heal_queue.as_ref()
    }

    /// A copy of the reference format.
    pub async fn format(&self) -> FormatV3 {
        self.format.read().await.clone()
    }

    /// Copy of one set's row.
    pub async fn set_disks(&self, set: SetIndex) -> Vec<Option<DiskStore>> {
        let table = self.disks.read().await;
        table.get(set.0).cloned().unwrap_or_default()
    }

    /// Copy of the whole table in flat order.
    pub async fn all_disks(&self) -> Vec<Option<DiskStore>> {
        let table = self.disks.read().await;
        table.iter().flatten().cloned().collect()
    }

    pub async fn disk_at(&self, coord: DiskCoord) -> Option<DiskStore> {
        let table = self.disks.read().await;
        table.get(coord.set.0).and_then(|row| row.get(coord.slot.0)).cloned().flatten()
    }

    /// Put `disk` at `coord`, returning whatever was there before.
    pub async fn place_disk(&self, coord: DiskCoord, disk: Option<DiskStore>) -> Option<DiskStore> {
        let mut table = self.disks.write().await;
        match table.get_mut(coord.set.0).and_then(|row| row.get_mut(coord.slot.0)) {
            Some(entry) => std::mem::replace(entry, disk),
            None => {
                warn!("place_disk: coordinate {coord} is outside the table");
                disk
            }
        }
    }

    /// Number of online handles currently in the table.
    pub async fn online_count(&self) -> usize {
        let disks = self.all_disks().await;
        let mut count = 0;
        for disk in disks.iter().flatten() {
            if disk.is_online().await {
                count += 1;
            }
        }
        count
    }

    /// Replace the reference format and the whole table at once.
    ///
    /// The returned handles are the ones that were evicted; the caller closes
    /// them once the lock is released.
    pub async fn swap(&self, format: FormatV3, flat: Vec<Option<DiskStore>>) -> Vec<DiskStore> {
        let drives_per_set = self.drives_per_set();
        let mut next: DiskTable = (0..self.set_count()).map(|_| vec![None; drives_per_set]).collect();
        for (i, disk) in flat.into_iter().enumerate() {
            let coord = DiskCoord::from_flat(i, drives_per_set);
            if let Some(entry) = next.get_mut(coord.set.0).and_then(|row| row.get_mut(coord.slot.0)) {
                *entry = disk;
            }
        }

        let evicted = {
            let mut fm = self.format.write().await;
            let mut table = self.disks.write().await;
            *fm = format;
            std::mem::replace(&mut *table, next)
        };

        debug!("topology swapped");
        evicted.into_iter().flatten().flatten().collect()
    }
}
