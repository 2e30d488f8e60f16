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

//! Bringing drives into the [`Topology`]: open a handle, read its format and
//! place it at the coordinate its identity claims.

use crate::disk::endpoint::Endpoint;
use crate::disk::error::{DiskError, Result};
use crate::disk::format::FormatV3;
use crate::disk::{new_disk, DiskAPI, DiskOption, DiskStore, FORMAT_CONFIG_FILE, RUSTFS_META_BUCKET};
use crate::store_init::load_format_erasure;
use crate::topology::{DiskCoord, Topology};
use futures::future::join_all;
use rustfs_common::heal_channel::{HealItemType, HealOpts, HealRequest};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Open `ep` and read its format.
pub async fn connect_endpoint(ep: &Endpoint) -> Result<(DiskStore, FormatV3)> {
    let disk = new_disk(ep, &DiskOption::default()).await?;

    let fm = match load_format_erasure(&disk, false).await {
        Ok(fm) => fm,
        Err(e) => {
            let _ = disk.close().await;
            return Err(e);
        }
    };

    Ok((disk, fm))
}

/// Where a drive carrying `fm` belongs under `reference`.
pub fn find_disk_index(reference: &FormatV3, fm: &FormatV3) -> Result<DiskCoord> {
    reference.check_structure(fm)?;
    reference.find_disk_index_by_disk_id(fm.erasure.this)
}

impl Topology {
    /// One pass over the endpoints that have no online handle. Returns how many were placed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn connect_disks(&self) -> usize {
        let mut connected = HashSet::new();
        for disk in self.all_disks().await.into_iter().flatten() {
            if disk.is_online().await {
                connected.insert(disk.endpoint().to_string());
            }
        }

        let pending: Vec<Endpoint> = self
            .endpoints()
            .endpoints
            .iter()
            .filter(|ep| !connected.contains(&ep.to_string()))
            .cloned()
            .collect();

        if pending.is_empty() {
            return 0;
        }

        let results = join_all(pending.iter().map(connect_endpoint)).await;

        let reference = self.format().await;
        let mut placed = 0;
        for (ep, res) in pending.iter().zip(results) {
            let (disk, fm) = match res {
                Ok(r) => r,
                Err(DiskError::UnformattedDisk) => {
                    info!("drive {ep} is unformatted, requesting format heal");
                    self.request_format_heal(ep);
                    continue;
                }
                Err(e) => {
                    debug!("drive {ep} still unavailable: {e}");
                    continue;
                }
            };

            if self.place_connected(&reference, ep, disk, &fm).await {
                placed += 1;
            }
        }

        if placed > 0 {
            info!("connected {placed} drive(s)");
        }
        placed
    }

    async fn place_connected(&self, reference: &FormatV3, ep: &Endpoint, disk: DiskStore, fm: &FormatV3) -> bool {
        let coord = match find_disk_index(reference, fm) {
            Ok(coord) => coord,
            Err(e) => {
                error!("drive {ep} does not fit the reference format: {e}");
                let _ = disk.close().await;
                return false;
            }
        };

        if let Some(current) = self.disk_at(coord).await {
            if current.is_online().await && current.endpoint().to_string() != ep.to_string() {
                error!(
                    "drive {ep} claims slot {coord} which is held by {}, leaving it out",
                    current.endpoint()
                );
                let _ = disk.close().await;
                return false;
            }
        }

        let _ = disk.set_disk_id(Some(fm.erasure.this)).await;

        if let Some(old) = self.place_disk(coord, Some(disk)).await {
            let _ = old.close().await;
        }

        debug!("drive {ep} placed at {coord}");
        true
    }

    fn request_format_heal(&self, ep: &Endpoint) {
        let Some(queue) = self.heal_queue() else {
            return;
        };

        let opts = HealOpts {
            set: usize::try_from(ep.set_idx).ok(),
            ..Default::default()
        };
        let req = HealRequest::new(RUSTFS_META_BUCKET, FORMAT_CONFIG_FILE, HealItemType::Metadata, opts);
        if let Err(e) = queue.try_enqueue(req) {
            warn!("format heal request for {ep} dropped: {e}");
        }
    }

    /// Block until strictly more than half of all drives are online.
    pub async fn connect_disks_with_quorum(&self, retry_interval: Duration) {
        let total = self.total_drives();
        loop {
            self.connect_disks().await;

            let online = self.online_count().await;
            if online > total / 2 {
                info!("{online}/{total} drive(s) online");
                return;
            }

            warn!("waiting for drive quorum: {online}/{total} online");
            tokio::time::sleep(retry_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::PoolEndpoints;
    use crate::store_init::{connect_load_init_formats, init_disks};
    use crate::topology::SetIndex;
    use rustfs_common::heal_channel::HealTaskQueue;
    use std::path::PathBuf;
    use std::sync::Arc;

    async fn formatted_pool(n: usize, per_set: usize) -> (tempfile::TempDir, Vec<PathBuf>, PoolEndpoints, FormatV3) {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..n).map(|i| dir.path().join(format!("d{i}"))).collect();
        for p in &paths {
            std::fs::create_dir_all(p).unwrap();
        }
        let vols: Vec<String> = paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
        let pool = PoolEndpoints::from_volumes(&vols, per_set).unwrap();
        let (disks, _) = init_disks(pool.endpoints.as_ref(), &DiskOption::default()).await;
        let fm = connect_load_init_formats(true, &disks, pool.set_count, pool.drives_per_set, None)
            .await
            .unwrap();
        (dir, paths, pool, fm)
    }

    #[tokio::test]
    async fn test_connect_disks_places_by_identity() {
        let (_dir, _paths, pool, fm) = formatted_pool(4, 2).await;
        let topo = Topology::new(pool, fm.clone(), None);

        assert_eq!(topo.connect_disks().await, 4);
        assert_eq!(topo.online_count().await, 4);
        assert_eq!(topo.connect_disks().await, 0);

        for set in 0..2 {
            for (slot, disk) in topo.set_disks(SetIndex(set)).await.iter().enumerate() {
                let id = disk.as_ref().unwrap().get_disk_id().await.unwrap();
                assert_eq!(id, fm.uuid_at(DiskCoord::new(set, slot)));
            }
        }
    }

    #[test]
    fn test_find_disk_index_rejects_foreign_drive() {
        let reference = FormatV3::new(1, 4);
        let foreign = FormatV3::new(1, 4);
        let this = foreign.erasure.sets[0][0];
        assert_eq!(
            find_disk_index(&reference, &foreign.with_this(this)).unwrap_err(),
            DiskError::DiskIdMismatch
        );

        let wrong_shape = FormatV3::new(2, 2);
        assert_eq!(
            find_disk_index(&reference, &wrong_shape.with_this(wrong_shape.erasure.sets[0][0])).unwrap_err(),
            DiskError::InconsistentDisk
        );

        let own = reference.with_this(reference.erasure.sets[0][3]);
        assert_eq!(find_disk_index(&reference, &own).unwrap(), DiskCoord::new(0, 3));
    }

    #[tokio::test]
    async fn test_unformatted_drive_requests_heal() {
        let (_dir, paths, pool, fm) = formatted_pool(4, 4).await;
        std::fs::remove_dir_all(&paths[2]).unwrap();
        std::fs::create_dir_all(&paths[2]).unwrap();

        let (queue, mut rx) = HealTaskQueue::new(4);
        let topo = Topology::new(pool, fm, Some(queue));
        assert_eq!(topo.connect_disks().await, 3);

        let req = rx.try_recv().unwrap();
        assert_eq!(req.item_type, HealItemType::Metadata);
        assert!(topo.disk_at(DiskCoord::new(0, 2)).await.is_none());
    }

    #[tokio::test]
    async fn test_connect_with_quorum_waits_for_majority() {
        let (_dir, paths, pool, fm) = formatted_pool(4, 4).await;
        let moved: Vec<PathBuf> = paths[..2].iter().map(|p| p.with_extension("away")).collect();
        for (p, m) in paths[..2].iter().zip(&moved) {
            std::fs::rename(p, m).unwrap();
        }

        let topo = Arc::new(Topology::new(pool, fm, None));
        let waiting = tokio::time::timeout(
            Duration::from_millis(300),
            topo.connect_disks_with_quorum(Duration::from_millis(20)),
        )
        .await;
        assert!(waiting.is_err());

        std::fs::rename(&moved[0], &paths[0]).unwrap();
        tokio::time::timeout(Duration::from_secs(5), topo.connect_disks_with_quorum(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(topo.online_count().await, 3);
    }
}
