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

//! The set router: every erasure set of a pool behind one [`ObjectLayer`].

use std::sync::{Arc, Mutex};

use crate::bucket::utils::{check_bucket_name, check_list_objs_args, check_multipart_object_args, check_object_args};
use crate::config::storageclass::lookup_standard_parity;
use crate::config::EcConfig;
use crate::disk::format::DistributionAlgo;
use crate::disk::{DiskAPI, DiskOption, DiskStore};
use crate::endpoints::PoolEndpoints;
use crate::error::{Error, Result, StorageError};
use crate::heal::format::{reload_format, FormatHealer};
use crate::heal::worker::spawn_heal_worker;
use crate::list::WalkPool;
use crate::monitor::ConnectionMonitor;
use crate::set_disk::SetDisks;
use crate::store_api::{
    BucketInfo, BucketOperations, CompletePart, DeleteBucketOptions, GetObjectReader, HealOperations, ListMultipartsInfo,
    ListObjectsInfo, ListObjectsV2Info, ListOperations, ListPartsInfo, MakeBucketOptions, MultipartOperations,
    MultipartUploadResult, ObjectIO, ObjectInfo, ObjectLayer, ObjectOperations, ObjectOptions, PartInfo, PutObjReader,
};
use crate::store_init::{connect_load_init_formats, drive_state_from, init_disks, load_format_erasure_all};
use crate::topology::{SetIndex, Topology};
use futures::future::join_all;
use rustfs_common::heal_channel::{DriveState, HealOpts, HealTaskQueue};
use rustfs_madmin::heal_commands::{HealResultItem, HEAL_ITEM_BUCKET};
use rustfs_madmin::{BackendByte, BackendDisks, BackendInfo, StorageInfo};
use rustfs_utils::hash::crc_hash;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Index of the set `key` belongs to, or -1 when `algo` cannot route.
pub fn hash_key(algo: DistributionAlgo, key: &str, cardinality: usize) -> isize {
    match algo {
        DistributionAlgo::CrcMod => crc_hash(key, cardinality).map_or(-1, |idx| idx as isize),
        DistributionAlgo::Unknown => -1,
    }
}

#[derive(Debug)]
pub struct Sets {
    topology: Arc<Topology>,
    pub disk_set: Vec<Arc<SetDisks>>,
    pub set_count: usize,
    pub set_drive_count: usize,
    pub default_parity_count: usize,
    pub distribution_algo: DistributionAlgo,
    pub deployment_id: Uuid,
    config: EcConfig,
    monitor: ConnectionMonitor,
    pub(crate) walk_pool: Arc<WalkPool>,
    heal_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Sets {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Sets {
    /// Bring up the pool: wait for a quorum format, connect a majority of
    /// drives and start the background tasks.
    #[tracing::instrument(level = "debug", skip(pool, config), fields(drives = pool.total_drives()))]
    pub async fn new(pool: PoolEndpoints, config: EcConfig) -> Result<Arc<Self>> {
        let set_count = pool.set_count;
        let set_drive_count = pool.drives_per_set;
        let default_parity_count = lookup_standard_parity(config.parity, set_drive_count)?;

        let format = wait_for_format(&pool, &config).await?;
        let distribution_algo = format.erasure.distribution_algo;
        let deployment_id = format.id;

        let (heal_queue, heal_rx) = HealTaskQueue::new(config.heal_queue_size);
        let topology = Arc::new(Topology::new(pool, format, Some(heal_queue)));
        topology.connect_disks_with_quorum(config.quorum_retry_interval).await;

        let disk_set: Vec<Arc<SetDisks>> = (0..set_count)
            .map(|i| SetDisks::new(topology.clone(), SetIndex(i), default_parity_count))
            .collect();

        let cancel = CancellationToken::new();
        let monitor = ConnectionMonitor::spawn(topology.clone(), config.monitor_interval, cancel.child_token());

        let walk_pool = Arc::new(WalkPool::new(config.walk_pool_idle_timeout));

        let mut tasks = Vec::with_capacity(set_count + 2);
        for set in disk_set.iter() {
            tasks.push(spawn_upload_janitor(set.clone(), &config, cancel.child_token()));
        }
        tasks.push(walk_pool.spawn_sweeper(cancel.child_token()));

        let sets = Arc::new(Sets {
            topology,
            disk_set,
            set_count,
            set_drive_count,
            default_parity_count,
            distribution_algo,
            deployment_id,
            walk_pool,
            config,
            monitor,
            heal_lock: tokio::sync::Mutex::new(()),
            cancel,
            tasks: Mutex::new(tasks),
        });

        let worker = spawn_heal_worker(Arc::downgrade(&sets), heal_rx, sets.cancel.child_token());
        sets.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(worker);

        info!(
            "erasure sets ready: {set_count} set(s) of {set_drive_count} drive(s), parity {default_parity_count}, deployment {deployment_id}"
        );
        Ok(sets)
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn config(&self) -> &EcConfig {
        &self.config
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    /// The set that stores `key`.
    pub fn get_hashed_set(&self, key: &str) -> Result<&Arc<SetDisks>> {
        let idx = hash_key(self.distribution_algo, key, self.set_count);
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.disk_set.get(i))
            .ok_or_else(|| StorageError::SetNotFound(key.to_owned()))
    }

    async fn undo_make_bucket(&self, bucket: &str, created: &[bool]) {
        let futures = self
            .disk_set
            .iter()
            .zip(created)
            .filter(|(_, created)| **created)
            .map(|(set, _)| async move { (set.set_index, set.delete_bucket(bucket, false).await) });

        for (idx, res) in join_all(futures).await {
            if let Err(e) = res {
                warn!("undo make bucket {bucket} on set {}: {e}", idx.0);
            }
        }
    }

    async fn undo_delete_bucket(&self, bucket: &str, deleted: &[bool]) {
        let futures = self
            .disk_set
            .iter()
            .zip(deleted)
            .filter(|(_, deleted)| **deleted)
            .map(|(set, _)| async move { (set.set_index, set.make_bucket(bucket).await) });

        for (idx, res) in join_all(futures).await {
            match res {
                Ok(()) | Err(StorageError::BucketExists(_)) => {}
                Err(e) => warn!("undo delete bucket {bucket} on set {}: {e}", idx.0),
            }
        }
    }

    /// Per-drive state from a fresh read of every format.json, in flat order.
    async fn live_drive_states(&self) -> Vec<DriveState> {
        let eps = self.topology.endpoints().endpoints.as_ref();
        let (disks, open_errs) = init_disks(eps, &DiskOption::default()).await;
        let (_, format_errs) = load_format_erasure_all(&disks, false).await;
        close_disks(&disks).await;

        open_errs
            .iter()
            .zip(format_errs.iter())
            .map(|(open_err, format_err)| match open_err {
                // a drive that cannot even be opened is offline whatever the reason
                Some(_) => DriveState::Offline,
                None => drive_state_from(format_err.as_ref()),
            })
            .collect()
    }

    /// Stop background tasks and close every drive handle.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.monitor.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("background task ended abnormally: {e}");
                }
            }
        }

        close_disks(&self.topology.all_disks().await).await;
        info!("erasure sets shut down");
    }
}

async fn wait_for_format(pool: &PoolEndpoints, config: &EcConfig) -> Result<crate::disk::format::FormatV3> {
    let eps = pool.endpoints.as_ref();
    let first_disk = eps.first().is_some_and(|ep| ep.is_local);

    loop {
        let (disks, _) = init_disks(eps, &DiskOption { cleanup: true }).await;
        let res = connect_load_init_formats(first_disk, &disks, pool.set_count, pool.drives_per_set, None).await;
        close_disks(&disks).await;

        match res {
            Ok(fm) => return Ok(fm),
            Err(
                e @ (StorageError::FirstDiskWait
                | StorageError::NotFirstDisk
                | StorageError::ErasureReadQuorum
                | StorageError::ErasureWriteQuorum
                | StorageError::DiskNotFound),
            ) => {
                info!("waiting for a quorum of formatted drives: {e}");
                tokio::time::sleep(config.quorum_retry_interval).await;
            }
            Err(e) => {
                error!("unable to load the drive format: {e}");
                return Err(e);
            }
        }
    }
}

fn spawn_upload_janitor(set: Arc<SetDisks>, config: &EcConfig, cancel: CancellationToken) -> JoinHandle<()> {
    let interval = config.stale_uploads_cleanup_interval;
    let expiry = config.stale_uploads_expiry;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let removed = set.cleanup_stale_uploads(expiry).await;
                    if removed > 0 {
                        info!("removed {removed} stale upload(s) from set {}", set.set_index.0);
                    }
                }
            }
        }
        debug!("upload janitor for set {} stopped", set.set_index.0);
    })
}

async fn close_disks(disks: &[Option<DiskStore>]) {
    join_all(disks.iter().flatten().map(|disk| disk.close())).await;
}

#[async_trait::async_trait]
impl ObjectIO for Sets {
    #[tracing::instrument(level = "debug", skip(self, opts))]
    async fn get_object_reader(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<GetObjectReader> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.get_object_reader(bucket, object, opts).await
    }

    #[tracing::instrument(level = "debug", skip(self, data, opts))]
    async fn put_object(&self, bucket: &str, object: &str, data: &mut PutObjReader, opts: &ObjectOptions) -> Result<ObjectInfo> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.put_object(bucket, object, data, opts).await
    }
}

#[async_trait::async_trait]
impl BucketOperations for Sets {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn make_bucket(&self, bucket: &str, opts: &MakeBucketOptions) -> Result<()> {
        check_bucket_name(bucket)?;

        let results = join_all(self.disk_set.iter().map(|set| set.make_bucket(bucket))).await;

        let created: Vec<bool> = results.iter().map(|r| r.is_ok()).collect();
        let mut errs: Vec<Error> = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(()) => None,
                Err(StorageError::BucketExists(_)) if opts.force_create => None,
                Err(e) => Some(e),
            })
            .collect();

        if errs.is_empty() {
            return Ok(());
        }

        if let Some(pos) = errs.iter().position(|e| e.is_write_quorum_err()) {
            self.undo_make_bucket(bucket, &created).await;
            return Err(errs.swap_remove(pos));
        }

        Err(errs.swap_remove(0))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.get_hashed_set("")?.get_bucket_info(bucket).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_bucket(&self) -> Result<Vec<BucketInfo>> {
        self.get_hashed_set("")?.list_buckets().await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_bucket(&self, bucket: &str, opts: &DeleteBucketOptions) -> Result<()> {
        check_bucket_name(bucket)?;

        let results = join_all(self.disk_set.iter().map(|set| set.delete_bucket(bucket, opts.force))).await;

        let deleted: Vec<bool> = results.iter().map(|r| r.is_ok()).collect();
        let mut errs: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();

        if errs.is_empty() {
            return Ok(());
        }

        // A set that never had the bucket is no reason to bring it back elsewhere.
        match errs.iter().position(|e| !matches!(e, StorageError::BucketNotFound(_))) {
            Some(pos) => {
                if !opts.no_recreate {
                    self.undo_delete_bucket(bucket, &deleted).await;
                }
                Err(errs.swap_remove(pos))
            }
            None => Err(errs.swap_remove(0)),
        }
    }
}

#[async_trait::async_trait]
impl ObjectOperations for Sets {
    #[tracing::instrument(level = "debug", skip(self, opts))]
    async fn get_object_info(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.get_object_info(bucket, object, opts).await
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    async fn delete_object(&self, bucket: &str, object: &str, opts: ObjectOptions) -> Result<ObjectInfo> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.delete_object(bucket, object, &opts).await
    }
}

#[async_trait::async_trait]
impl ListOperations for Sets {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo> {
        self.list_objects_generic(bucket, prefix, marker, delimiter, max_keys, false)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        _fetch_owner: bool,
        start_after: Option<String>,
    ) -> Result<ListObjectsV2Info> {
        // The token is the last key of the previous page and wins over start_after.
        let marker = continuation_token.clone().filter(|t| !t.is_empty()).or(start_after);

        let loi = self
            .list_objects_generic(bucket, prefix, marker, delimiter, max_keys, false)
            .await?;

        Ok(ListObjectsV2Info {
            is_truncated: loi.is_truncated,
            continuation_token,
            next_continuation_token: loi.next_marker,
            objects: loi.objects,
            prefixes: loi.prefixes,
        })
    }
}

#[async_trait::async_trait]
impl MultipartOperations for Sets {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo> {
        check_list_objs_args(bucket, prefix)?;
        self.get_hashed_set(prefix)?
            .list_multipart_uploads(bucket, prefix, key_marker, upload_id_marker, delimiter, max_uploads)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<MultipartUploadResult> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.new_multipart_upload(bucket, object, opts).await
    }

    #[tracing::instrument(level = "debug", skip(self, data, opts))]
    async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
        opts: &ObjectOptions,
    ) -> Result<PartInfo> {
        check_multipart_object_args(bucket, object, upload_id)?;
        self.get_hashed_set(object)?
            .put_object_part(bucket, object, upload_id, part_id, data, opts)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: Option<usize>,
        max_parts: usize,
    ) -> Result<ListPartsInfo> {
        check_multipart_object_args(bucket, object, upload_id)?;
        self.get_hashed_set(object)?
            .list_object_parts(bucket, object, upload_id, part_number_marker, max_parts)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        check_multipart_object_args(bucket, object, upload_id)?;
        self.get_hashed_set(object)?
            .abort_multipart_upload(bucket, object, upload_id)
            .await
    }

    #[tracing::instrument(level = "debug", skip(self, uploaded_parts, opts))]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        check_multipart_object_args(bucket, object, upload_id)?;
        self.get_hashed_set(object)?
            .complete_multipart_upload(bucket, object, upload_id, uploaded_parts, opts)
            .await
    }
}

#[async_trait::async_trait]
impl HealOperations for Sets {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn reload_format(&self, dry_run: bool) -> Result<()> {
        let _guard = self.heal_lock.lock().await;
        reload_format(&self.topology, &self.monitor, dry_run).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn heal_format(&self, dry_run: bool) -> Result<(HealResultItem, Option<Error>)> {
        let _guard = self.heal_lock.lock().await;
        let mut healer = FormatHealer::new(&self.topology, &self.monitor, dry_run);
        healer.run().await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn heal_bucket(&self, bucket: &str, opts: &HealOpts) -> Result<HealResultItem> {
        let results = join_all(self.disk_set.iter().map(|set| set.heal_bucket(bucket, opts))).await;

        let mut item = HealResultItem {
            heal_item_type: HEAL_ITEM_BUCKET.to_owned(),
            bucket: bucket.to_owned(),
            disk_count: self.topology.total_drives(),
            set_count: self.set_count,
            ..Default::default()
        };

        let mut not_found = 0;
        for res in results {
            match res {
                Ok(set_item) => {
                    item.before.drives.extend(set_item.before.drives);
                    item.after.drives.extend(set_item.after.drives);
                }
                Err(StorageError::BucketNotFound(_)) => not_found += 1,
                Err(e) => return Err(e),
            }
        }

        if not_found == self.set_count {
            return Err(StorageError::BucketNotFound(bucket.to_owned()));
        }
        Ok(item)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn heal_object(&self, bucket: &str, object: &str, opts: &HealOpts) -> Result<HealResultItem> {
        check_object_args(bucket, object)?;
        self.get_hashed_set(object)?.heal_object(bucket, object, opts).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn heal_objects(&self, bucket: &str, prefix: &str, opts: &HealOpts) -> Result<Vec<HealResultItem>> {
        self.heal_objects_under(bucket, prefix, opts).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_buckets_heal(&self) -> Result<Vec<BucketInfo>> {
        let results = join_all(self.disk_set.iter().map(|set| set.list_buckets_heal())).await;

        let mut buckets: Vec<BucketInfo> = Vec::new();
        for res in results {
            for b in res? {
                if !buckets.iter().any(|have| have.name == b.name) {
                    buckets.push(b);
                }
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_objects_heal(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsInfo> {
        let loi = self
            .list_objects_generic(bucket, prefix, marker, delimiter, max_keys, true)
            .await?;
        self.queue_heal_listing(&loi);
        Ok(loi)
    }
}

#[async_trait::async_trait]
impl ObjectLayer for Sets {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn storage_info(&self) -> StorageInfo {
        let per_set = join_all(self.disk_set.iter().map(|set| set.storage_info())).await;
        let mut disks: Vec<rustfs_madmin::Disk> = per_set.into_iter().flatten().collect();

        let states = self.live_drive_states().await;

        let mut online_disks = BackendDisks::new();
        let mut offline_disks = BackendDisks::new();
        let eps = self.topology.endpoints().endpoints.as_ref();
        for ((disk, state), ep) in disks.iter_mut().zip(states).zip(eps) {
            disk.state = state.to_string();
            if state == DriveState::Ok {
                online_disks.add(&ep.node_name(), 1);
            } else {
                offline_disks.add(&ep.node_name(), 1);
            }
        }

        StorageInfo {
            disks,
            backend: BackendInfo {
                backend_type: BackendByte::Erasure,
                online_disks,
                offline_disks,
                standard_sc_data: vec![self.set_drive_count - self.default_parity_count],
                standard_sc_parity: Some(self.default_parity_count),
                total_sets: vec![self.set_count],
                drives_per_set: vec![self.set_drive_count],
            },
        }
    }

    fn set_drive_counts(&self) -> Vec<usize> {
        vec![self.set_drive_count; self.set_count]
    }

    async fn shutdown(&self) {
        Sets::shutdown(self).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn test_config() -> EcConfig {
        EcConfig {
            monitor_interval: Duration::from_secs(3600),
            quorum_retry_interval: Duration::from_millis(20),
            stale_uploads_cleanup_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    pub(crate) async fn test_sets(drives: usize, per_set: usize) -> (tempfile::TempDir, Vec<PathBuf>, Arc<Sets>) {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..drives).map(|i| dir.path().join(format!("d{i}"))).collect();
        for p in &paths {
            std::fs::create_dir_all(p).unwrap();
        }
        let vols: Vec<String> = paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
        let pool = PoolEndpoints::from_volumes(&vols, per_set).unwrap();
        let sets = Sets::new(pool, test_config()).await.unwrap();
        (dir, paths, sets)
    }

    #[test]
    fn test_hash_key() {
        assert_eq!(hash_key(DistributionAlgo::CrcMod, "object", 1), 0);
        let a = hash_key(DistributionAlgo::CrcMod, "photos/2024/a.png", 16);
        assert!((0..16).contains(&a));
        assert_eq!(a, hash_key(DistributionAlgo::CrcMod, "photos/2024/a.png", 16));
        assert_eq!(hash_key(DistributionAlgo::Unknown, "object", 16), -1);
    }

    #[tokio::test]
    async fn test_routing_uses_the_object_name_only() {
        let (_dir, _paths, sets) = test_sets(8, 4).await;
        let a = sets.get_hashed_set("dir/object").unwrap().set_index;
        let b = sets.get_hashed_set("dir/object").unwrap().set_index;
        assert_eq!(a, b);
        assert_eq!(
            a.0 as isize,
            hash_key(DistributionAlgo::CrcMod, "dir/object", sets.set_count)
        );
        sets.shutdown().await;
    }

    #[tokio::test]
    async fn test_bucket_fan_out() {
        let (_dir, paths, sets) = test_sets(8, 4).await;

        sets.make_bucket("photos", &MakeBucketOptions::default()).await.unwrap();
        for p in &paths {
            assert!(p.join("photos").is_dir());
        }
        assert!(matches!(
            sets.make_bucket("photos", &MakeBucketOptions::default()).await,
            Err(StorageError::BucketExists(_))
        ));
        sets.make_bucket(
            "photos",
            &MakeBucketOptions {
                force_create: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(sets.list_bucket().await.unwrap().len(), 1);
        assert_eq!(sets.get_bucket_info("photos").await.unwrap().name, "photos");

        sets.delete_bucket("photos", &DeleteBucketOptions::default()).await.unwrap();
        for p in &paths {
            assert!(!p.join("photos").exists());
        }
        assert!(matches!(
            sets.delete_bucket("photos", &DeleteBucketOptions::default()).await,
            Err(StorageError::BucketNotFound(_))
        ));
        assert!(matches!(
            sets.make_bucket(".rustfs.sys", &MakeBucketOptions::default()).await,
            Err(StorageError::BucketNameInvalid(_))
        ));
        sets.shutdown().await;
    }

    #[tokio::test]
    async fn test_make_bucket_rolls_back_every_set() {
        let (_dir, paths, sets) = test_sets(8, 4).await;
        // two drives of the second set gone: 2 < write quorum 3
        for p in &paths[4..6] {
            std::fs::remove_dir_all(p).unwrap();
        }

        let err = sets.make_bucket("photos", &MakeBucketOptions::default()).await.unwrap_err();
        assert!(err.is_write_quorum_err());
        for p in paths.iter().filter(|p| p.exists()) {
            assert!(!p.join("photos").exists(), "{} kept the bucket", p.display());
        }
        sets.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_bucket_not_empty_is_undone() {
        let (_dir, _paths, sets) = test_sets(8, 4).await;
        sets.make_bucket("photos", &MakeBucketOptions::default()).await.unwrap();
        sets.put_object("photos", "a.txt", &mut PutObjReader::from_vec(b"a".to_vec()), &ObjectOptions::default())
            .await
            .unwrap();

        let err = sets
            .delete_bucket("photos", &DeleteBucketOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BucketNotEmpty(_)));

        for set in sets.disk_set.iter() {
            set.get_bucket_info("photos").await.unwrap();
        }
        sets.shutdown().await;
    }

    #[tokio::test]
    async fn test_objects_across_sets() {
        let (_dir, _paths, sets) = test_sets(8, 4).await;
        sets.make_bucket("photos", &MakeBucketOptions::default()).await.unwrap();

        for i in 0..16 {
            let name = format!("obj-{i}");
            let body = format!("body of {name}").into_bytes();
            sets.put_object("photos", &name, &mut PutObjReader::from_vec(body.clone()), &ObjectOptions::default())
                .await
                .unwrap();
            let mut r = sets.get_object_reader("photos", &name, &ObjectOptions::default()).await.unwrap();
            assert_eq!(r.read_all().await.unwrap(), body);
        }

        sets.delete_object("photos", "obj-3", ObjectOptions::default()).await.unwrap();
        assert!(matches!(
            sets.get_object_info("photos", "obj-3", &ObjectOptions::default()).await,
            Err(StorageError::ObjectNotFound(..))
        ));
        assert!(matches!(
            sets.get_object_info("photos", "/bad", &ObjectOptions::default()).await,
            Err(StorageError::ObjectNameInvalid(..))
        ));
        sets.shutdown().await;
    }

    #[tokio::test]
    async fn test_storage_info_reports_offline_drive() {
        let (_dir, paths, sets) = test_sets(8, 4).await;
        std::fs::remove_dir_all(&paths[6]).unwrap();

        let info = sets.storage_info().await;
        assert_eq!(info.disks.len(), 8);
        assert_eq!(info.disk_counts(), (7, 1));
        assert_eq!(info.disks[6].state, DriveState::Offline.to_string());
        assert_eq!(info.disks[0].state, DriveState::Ok.to_string());
        assert_eq!(info.backend.total_sets, vec![2]);
        assert_eq!(info.backend.standard_sc_parity, Some(2));

        // a wiped drive is reachable but unformatted
        std::fs::create_dir_all(&paths[6]).unwrap();
        let info = sets.storage_info().await;
        assert_eq!(info.disks[6].state, DriveState::Missing.to_string());
        sets.shutdown().await;
    }
}
