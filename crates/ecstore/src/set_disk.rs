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

//! One erasure set: a fixed row of drives that stores whole objects.

mod heal;
mod multipart;

pub use multipart::MIN_PART_SIZE;

use crate::disk::endpoint::Endpoint;
use crate::disk::error::DiskError;
use crate::disk::error_reduce::{
    reduce_read_quorum_errs, reduce_write_quorum_errs, BUCKET_OP_IGNORED_ERRS, OBJECT_OP_IGNORED_ERRS,
};
use crate::disk::{self, DeleteOptions, DiskAPI, DiskStore, RUSTFS_META_TMP_BUCKET, STORAGE_FORMAT_FILE};
use crate::erasure_coding::Erasure;
use crate::error::{to_object_err, Result, StorageError};
use crate::fileinfo::{FileInfo, ObjectPartInfo, ETAG_KEY};
use crate::ns_lock::{NsLockGuard, NsLockMap};
use crate::store_api::{BucketInfo, GetObjectReader, ObjectInfo, ObjectOptions, PutObjReader};
use crate::topology::{SetIndex, Topology};
use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use rustfs_common::heal_channel::{HealItemType, HealOpts, HealRequest};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use multipart::{get_complete_multipart_md5, get_multipart_sha_dir, get_upload_id_dir};

#[derive(Debug)]
pub struct SetDisks {
    topology: Arc<Topology>,
    pub set_index: SetIndex,
    pub set_drive_count: usize,
    pub default_parity_count: usize,
    ns_mutex: NsLockMap,
}

impl SetDisks {
    pub fn new(topology: Arc<Topology>, set_index: SetIndex, default_parity_count: usize) -> Arc<Self> {
        let set_drive_count = topology.drives_per_set();
        Arc::new(SetDisks {
            topology,
            set_index,
            set_drive_count,
            default_parity_count,
            ns_mutex: NsLockMap::new(),
        })
    }

    /// Current row of drive handles. `None` marks an offline slot.
    pub async fn get_disks(&self) -> Vec<Option<DiskStore>> {
        self.topology.set_disks(self.set_index).await
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        self.topology.endpoints().set_endpoints(self.set_index.0)
    }

    fn default_read_quorum(&self) -> usize {
        self.set_drive_count - self.default_parity_count
    }

    fn bucket_read_quorum(&self) -> usize {
        (self.set_drive_count / 2).max(1)
    }

    fn bucket_write_quorum(&self) -> usize {
        self.set_drive_count / 2 + 1
    }

    async fn lock_write(&self, bucket: &str, object: &str, no_lock: bool) -> Option<NsLockGuard> {
        if no_lock {
            None
        } else {
            Some(self.ns_mutex.write(bucket, object).await)
        }
    }

    async fn lock_read(&self, bucket: &str, object: &str, no_lock: bool) -> Option<NsLockGuard> {
        if no_lock {
            None
        } else {
            Some(self.ns_mutex.read(bucket, object).await)
        }
    }

    fn queue_object_heal(&self, bucket: &str, object: &str) {
        let Some(queue) = self.topology.heal_queue() else {
            return;
        };

        let opts = HealOpts {
            set: Some(self.set_index.0),
            ..Default::default()
        };
        if let Err(e) = queue.try_enqueue(HealRequest::new(bucket, object, HealItemType::Object, opts)) {
            debug!("heal request for {bucket}/{object} dropped: {e}");
        }
    }

    // Buckets

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let disks = self.get_disks().await;

        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.make_volume(bucket).await.err(),
                None => Some(DiskError::DiskNotFound),
            }
        });
        let errs: Vec<Option<DiskError>> = join_all(futures).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, BUCKET_OP_IGNORED_ERRS, self.bucket_write_quorum()) {
            if err == DiskError::ErasureWriteQuorum {
                Self::undo_make_bucket(&disks, &errs, bucket).await;
            }
            return Err(to_object_err(err.into(), vec![bucket]));
        }

        Ok(())
    }

    async fn undo_make_bucket(disks: &[Option<DiskStore>], errs: &[Option<DiskError>], bucket: &str) {
        let futures = disks
            .iter()
            .zip(errs)
            .filter(|(_, err)| err.is_none())
            .filter_map(|(disk, _)| disk.as_ref())
            .map(|disk| async move { (disk.to_string(), disk.delete_volume(bucket, false).await) });

        for (disk, res) in join_all(futures).await {
            if let Err(e) = res {
                warn!("undo make bucket {bucket} on {disk} failed: {e}");
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_bucket(&self, bucket: &str, force: bool) -> Result<()> {
        let disks = self.get_disks().await;

        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.delete_volume(bucket, force).await.err(),
                None => Some(DiskError::DiskNotFound),
            }
        });
        let errs: Vec<Option<DiskError>> = join_all(futures).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, BUCKET_OP_IGNORED_ERRS, self.bucket_write_quorum()) {
            if err == DiskError::ErasureWriteQuorum {
                Self::undo_delete_bucket(&disks, &errs, bucket).await;
            }
            return Err(to_object_err(err.into(), vec![bucket]));
        }

        Ok(())
    }

    async fn undo_delete_bucket(disks: &[Option<DiskStore>], errs: &[Option<DiskError>], bucket: &str) {
        let futures = disks
            .iter()
            .zip(errs)
            .filter(|(_, err)| err.is_none())
            .filter_map(|(disk, _)| disk.as_ref())
            .map(|disk| async move { (disk.to_string(), disk.make_volume(bucket).await) });

        for (disk, res) in join_all(futures).await {
            if let Err(e) = res {
                warn!("undo delete bucket {bucket} on {disk} failed: {e}");
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        let disks = self.get_disks().await;

        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.stat_volume(bucket).await,
                None => Err(DiskError::DiskNotFound),
            }
        });
        let results = join_all(futures).await;

        let errs: Vec<Option<DiskError>> = results.iter().map(|r| r.as_ref().err().cloned()).collect();
        if let Some(err) = reduce_read_quorum_errs(&errs, BUCKET_OP_IGNORED_ERRS, self.bucket_read_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket]));
        }

        match results.into_iter().flatten().next() {
            Some(vol) => Ok(BucketInfo {
                name: vol.name,
                created: vol.created,
            }),
            None => Err(StorageError::BucketNotFound(bucket.to_owned())),
        }
    }

    /// Buckets present on at least a read quorum of this set's drives.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let quorum = self.bucket_read_quorum();
        let (lists, errs) = self.list_volumes_all().await;

        if lists.len() < quorum {
            let err = reduce_read_quorum_errs(&errs, BUCKET_OP_IGNORED_ERRS, quorum).unwrap_or(DiskError::ErasureReadQuorum);
            return Err(to_object_err(err.into(), vec![]));
        }

        let mut seen: HashMap<String, (usize, BucketInfo)> = HashMap::new();
        for vol in lists.into_iter().flatten() {
            let entry = seen.entry(vol.name.clone()).or_insert_with(|| {
                (
                    0,
                    BucketInfo {
                        name: vol.name.clone(),
                        created: vol.created,
                    },
                )
            });
            entry.0 += 1;
        }

        let mut buckets: Vec<BucketInfo> = seen
            .into_values()
            .filter(|(count, _)| *count >= quorum)
            .map(|(_, info)| info)
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Every bucket seen on any drive of this set.
    pub async fn list_buckets_heal(&self) -> Result<Vec<BucketInfo>> {
        let (lists, _) = self.list_volumes_all().await;

        let mut names = HashSet::new();
        let mut buckets = Vec::new();
        for vol in lists.into_iter().flatten() {
            if names.insert(vol.name.clone()) {
                buckets.push(BucketInfo {
                    name: vol.name,
                    created: vol.created,
                });
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn list_volumes_all(&self) -> (Vec<Vec<disk::VolumeInfo>>, Vec<Option<DiskError>>) {
        let disks = self.get_disks().await;
        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.list_volumes().await,
                None => Err(DiskError::DiskNotFound),
            }
        });

        let mut lists = Vec::new();
        let mut errs = Vec::new();
        for res in join_all(futures).await {
            match res {
                Ok(list) => {
                    lists.push(list);
                    errs.push(None);
                }
                Err(e) => errs.push(Some(e)),
            }
        }
        (lists, errs)
    }

    // Objects

    /// Read `xl.meta` of `path` from every drive. Failed slots hold a default `FileInfo`.
    #[tracing::instrument(level = "debug", skip(disks))]
    pub(crate) async fn read_all_fileinfo(
        disks: &[Option<DiskStore>],
        volume: &str,
        path: &str,
    ) -> (Vec<FileInfo>, Vec<Option<DiskError>>) {
        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.read_metadata(volume, path).await,
                None => Err(DiskError::DiskNotFound),
            }
        });

        let mut metas = Vec::with_capacity(disks.len());
        let mut errs = Vec::with_capacity(disks.len());
        for res in join_all(futures).await {
            match res {
                Ok(fi) => {
                    metas.push(fi);
                    errs.push(None);
                }
                Err(e) => {
                    metas.push(FileInfo::default());
                    errs.push(Some(e));
                }
            }
        }
        (metas, errs)
    }

    /// The version agreed on by the most drives, if at least its read quorum agrees.
    /// Ties go to the newest modification time.
    pub(crate) fn find_file_info_in_quorum(metas: &[FileInfo], errs: &[Option<DiskError>]) -> disk::error::Result<FileInfo> {
        let usable = |i: usize| errs.get(i).is_some_and(|e| e.is_none()) && metas[i].is_valid();

        let mut best: Option<(usize, usize)> = None;
        for (i, meta) in metas.iter().enumerate() {
            if !usable(i) {
                continue;
            }

            let count = (0..metas.len())
                .filter(|&j| usable(j) && metas[j].is_same_version(meta))
                .count();

            let better = match best {
                None => true,
                Some((b, c)) => count > c || (count == c && meta.mod_time > metas[b].mod_time),
            };
            if better {
                best = Some((i, count));
            }
        }

        match best {
            Some((idx, count)) if count >= metas[idx].read_quorum() => Ok(metas[idx].clone()),
            _ => {
                debug!("no object version in read quorum");
                Err(DiskError::ErasureReadQuorum)
            }
        }
    }

    async fn get_object_fileinfo(
        &self,
        bucket: &str,
        object: &str,
    ) -> Result<(FileInfo, Vec<FileInfo>, Vec<Option<DiskError>>, Vec<Option<DiskStore>>)> {
        let disks = self.get_disks().await;
        let (metas, errs) = Self::read_all_fileinfo(&disks, bucket, object).await;

        if let Some(err) = reduce_read_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, self.default_read_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        let fi = Self::find_file_info_in_quorum(&metas, &errs).map_err(|e| to_object_err(e.into(), vec![bucket, object]))?;
        Ok((fi, metas, errs, disks))
    }

    /// Shards of one part, indexed by shard number. Drives holding another
    /// version, or a shard of the wrong size, contribute nothing.
    pub(crate) async fn read_part_shards(
        disks: &[Option<DiskStore>],
        metas: &[FileInfo],
        errs: &[Option<DiskError>],
        fi: &FileInfo,
        bucket: &str,
        object: &str,
        part: &ObjectPartInfo,
    ) -> Vec<Option<Vec<u8>>> {
        let total = fi.erasure.data_blocks + fi.erasure.parity_blocks;
        let shard_size = fi.erasure.shard_file_size(part.size);
        let path = format!("{object}/part.{}", part.number);
        let path = path.as_str();

        let futures = disks.iter().enumerate().map(|(i, disk)| async move {
            let disk = disk.as_ref()?;
            if errs.get(i).is_none_or(|e| e.is_some()) || !metas[i].is_same_version(fi) {
                return None;
            }
            let index = fi.erasure.distribution.get(i).copied()?;

            match disk.read_all(bucket, path).await {
                Ok(data) if data.len() == shard_size => Some((index, data)),
                Ok(data) => {
                    warn!("{bucket}/{path} on {} has {} bytes, expected {shard_size}", disk.to_string(), data.len());
                    None
                }
                Err(e) => {
                    debug!("read {bucket}/{path} on {}: {e}", disk.to_string());
                    None
                }
            }
        });

        let mut shards = vec![None; total];
        for (index, data) in join_all(futures).await.into_iter().flatten() {
            if (1..=total).contains(&index) {
                shards[index - 1] = Some(data.to_vec());
            }
        }
        shards
    }

    /// Write each part's shard for every drive into `tmp`, then move the parts
    /// from `src_volume/src_dir` into the object and write its `xl.meta`.
    async fn commit_object_on_disk(
        disk: &DiskStore,
        src_volume: &str,
        src_dir: &str,
        bucket: &str,
        object: &str,
        fi: FileInfo,
    ) -> disk::error::Result<()> {
        let mut keep = HashSet::with_capacity(fi.parts.len());
        for part in fi.parts.iter() {
            let name = format!("part.{}", part.number);
            disk.rename_file(
                src_volume,
                &format!("{src_dir}/{name}"),
                bucket,
                &format!("{object}/{name}"),
            )
            .await?;
            keep.insert(name);
        }

        disk.write_metadata(bucket, object, fi).await?;

        // parts of a previous version with more parts
        let entries = disk.list_dir(bucket, object, -1).await?;
        let stale: Vec<String> = entries
            .into_iter()
            .filter(|e| e.starts_with("part.") && !keep.contains(e))
            .map(|e| format!("{object}/{e}"))
            .collect();
        if !stale.is_empty() {
            disk.delete_bulk(bucket, &stale).await?;
        }

        Ok(())
    }

    /// Stage `parts` (part number plus all shards) on every drive and commit them as `fi`.
    pub(crate) async fn write_object(
        disks: &[Option<DiskStore>],
        bucket: &str,
        object: &str,
        fi: &FileInfo,
        parts: &[(usize, Vec<Bytes>)],
    ) -> Vec<Option<DiskError>> {
        let tmp = Uuid::new_v4().to_string();
        let tmp = tmp.as_str();

        let futures = disks.iter().enumerate().map(|(i, disk)| async move {
            let Some(disk) = disk else {
                return Some(DiskError::DiskNotFound);
            };
            let Some(&index) = fi.erasure.distribution.get(i) else {
                return Some(DiskError::other("distribution shorter than the set"));
            };

            for (number, shards) in parts {
                let Some(shard) = shards.get(index - 1) else {
                    return Some(DiskError::other(format!("missing shard {index} of part {number}")));
                };
                if let Err(e) = disk
                    .write_all(RUSTFS_META_TMP_BUCKET, &format!("{tmp}/part.{number}"), shard.clone())
                    .await
                {
                    return Some(e);
                }
            }

            let mut fi = fi.clone();
            fi.erasure.index = index;
            Self::commit_object_on_disk(disk, RUSTFS_META_TMP_BUCKET, tmp, bucket, object, fi)
                .await
                .err()
        });
        let errs = join_all(futures).await;

        Self::cleanup_tmp(disks, tmp).await;
        errs
    }

    async fn cleanup_tmp(disks: &[Option<DiskStore>], tmp: &str) {
        let futures = disks.iter().flatten().map(|disk| async move {
            let _ = disk
                .delete(RUSTFS_META_TMP_BUCKET, tmp, DeleteOptions { recursive: true })
                .await;
        });
        join_all(futures).await;
    }

    #[tracing::instrument(level = "debug", skip(self, data, opts))]
    pub async fn put_object(&self, bucket: &str, object: &str, data: &mut PutObjReader, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let parity = self.default_parity_count;
        let data_blocks = self.set_drive_count - parity;

        let mut fi = FileInfo::new(object, data_blocks, parity);
        fi.volume = bucket.to_owned();
        fi.mod_time = Some(OffsetDateTime::now_utc());
        fi.size = data.size() as i64;
        fi.metadata = opts.user_defined.clone();

        let etag = data.md5_hex();
        fi.metadata.insert(ETAG_KEY.to_owned(), etag.clone());
        fi.add_object_part(1, etag, data.size(), fi.mod_time);

        let erasure = Erasure::new(data_blocks, parity)?;
        let shards = erasure.encode_data(data.data())?;

        let _guard = self.lock_write(bucket, object, opts.no_lock).await;

        let disks = self.get_disks().await;
        let errs = Self::write_object(&disks, bucket, object, &fi, &[(1, shards)]).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        Ok(ObjectInfo::from_file_info(&fi, bucket, object))
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    pub async fn get_object_reader(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<GetObjectReader> {
        let _guard = self.lock_read(bucket, object, opts.no_lock).await;

        let (fi, metas, errs, disks) = self.get_object_fileinfo(bucket, object).await?;
        let erasure = Erasure::new(fi.erasure.data_blocks, fi.erasure.parity_blocks)?;

        let mut out = BytesMut::with_capacity(fi.size.max(0) as usize);
        let mut degraded = false;
        for part in fi.parts.iter() {
            let mut shards = Self::read_part_shards(&disks, &metas, &errs, &fi, bucket, object, part).await;
            degraded |= shards.iter().any(Option::is_none);

            let data = erasure.join_data(&mut shards, part.size).map_err(|e| {
                warn!("decode {bucket}/{object} part {} failed: {e}", part.number);
                to_object_err(StorageError::ErasureReadQuorum, vec![bucket, object])
            })?;
            out.extend_from_slice(&data);
        }

        if degraded {
            info!("{bucket}/{object} read with missing shards, queueing heal");
            self.queue_object_heal(bucket, object);
        }

        Ok(GetObjectReader::new(out.freeze(), ObjectInfo::from_file_info(&fi, bucket, object)))
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    pub async fn get_object_info(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let _guard = self.lock_read(bucket, object, opts.no_lock).await;

        let (fi, ..) = self.get_object_fileinfo(bucket, object).await?;
        Ok(ObjectInfo::from_file_info(&fi, bucket, object))
    }

    async fn delete_object_on_disk(disk: &DiskStore, bucket: &str, object: &str) -> disk::error::Result<()> {
        let entries = match disk.list_dir(bucket, object, -1).await {
            Ok(entries) => entries,
            Err(DiskError::FileNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };

        // xl.meta goes first so a half-deleted object is simply absent
        let mut files: Vec<String> = entries
            .into_iter()
            .filter(|e| !e.ends_with('/'))
            .map(|e| format!("{object}/{e}"))
            .collect();
        let meta = format!("{object}/{STORAGE_FORMAT_FILE}");
        files.sort_by_key(|f| *f != meta);

        for err in disk.delete_bulk(bucket, &files).await?.into_iter().flatten() {
            if err != DiskError::FileNotFound {
                return Err(err);
            }
        }

        match disk.delete(bucket, object, DeleteOptions { recursive: false }).await {
            Ok(()) | Err(DiskError::FileNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    pub async fn delete_object(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        let _guard = self.lock_write(bucket, object, opts.no_lock).await;

        let (fi, ..) = self.get_object_fileinfo(bucket, object).await?;

        let disks = self.get_disks().await;
        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => Self::delete_object_on_disk(disk, bucket, object).await.err(),
                None => Some(DiskError::DiskNotFound),
            }
        });
        let errs = join_all(futures).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        Ok(ObjectInfo::from_file_info(&fi, bucket, object))
    }

    /// Per-drive usage of this set. `state` is "ok" or the error the drive returned.
    pub async fn storage_info(&self) -> Vec<rustfs_madmin::Disk> {
        let disks = self.get_disks().await;
        get_disks_info(&disks, self.endpoints()).await
    }
}

async fn get_disks_info(disks: &[Option<DiskStore>], eps: &[Endpoint]) -> Vec<rustfs_madmin::Disk> {
    let futures = disks.iter().map(|disk| async move {
        match disk {
            Some(disk) => Some(disk.disk_info().await),
            None => None,
        }
    });

    let mut ret = Vec::with_capacity(eps.len());
    for (ep, info) in eps.iter().zip(join_all(futures).await) {
        let mut d = rustfs_madmin::Disk {
            endpoint: ep.to_string(),
            local: ep.is_local,
            pool_index: ep.pool_idx,
            set_index: ep.set_idx,
            disk_index: ep.disk_idx,
            ..Default::default()
        };

        match info {
            Some(Ok(res)) => {
                d.state = "ok".to_owned();
                d.root_disk = res.root_disk;
                d.drive_path = res.mount_path;
                d.healing = res.healing;
                d.uuid = res.id.map_or(String::new(), |id| id.to_string());
                d.major = res.major as u32;
                d.minor = res.minor as u32;
                d.total_space = res.total;
                d.used_space = res.used;
                d.available_space = res.free;
                d.used_inodes = res.used_inodes;
                d.free_inodes = res.free_inodes;
            }
            Some(Err(err)) => d.state = err.to_string(),
            None => d.state = DiskError::DiskNotFound.to_string(),
        }
        ret.push(d);
    }
    ret
}
