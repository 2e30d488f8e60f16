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

use crate::bucket::utils::check_list_objs_args;
use crate::disk::error::DiskError;
use crate::disk::{DiskAPI, WalkDirOptions};
use crate::error::{is_err_object_not_found, Result, StorageError};
use crate::list::{FileInfoCh, MergeWalker, WalkParams};
use crate::sets::Sets;
use crate::store_api::{BucketOperations, HealOperations, ListObjectsInfo, ObjectInfo};
use futures::future::join_all;
use rustfs_common::heal_channel::{HealItemType, HealOpts, HealRequest};
use rustfs_madmin::heal_commands::HealResultItem;
use rustfs_utils::path::SLASH_SEPARATOR;
use tracing::{debug, info, warn};

const MAX_OBJECT_LIST: i32 = 1000;

/// Page size actually served for a requested `max_keys`.
pub fn clamp_max_keys(max_keys: i32) -> usize {
    if !(0..=MAX_OBJECT_LIST).contains(&max_keys) {
        MAX_OBJECT_LIST as usize
    } else {
        max_keys as usize
    }
}

impl Sets {
    /// One page of the merged listing of `bucket`.
    ///
    /// With `heal` the quorum filter is inverted and only entries that are
    /// not identical on every drive of their set come back.
    pub(crate) async fn list_objects_generic(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: i32,
        heal: bool,
    ) -> Result<ListObjectsInfo> {
        check_list_objs_args(bucket, prefix)?;

        let delimiter = delimiter.unwrap_or_default();
        if !delimiter.is_empty() && delimiter != SLASH_SEPARATOR {
            return Err(StorageError::NotImplemented);
        }

        let marker = marker.unwrap_or_default();
        // a marker outside the prefix can never match
        if !marker.is_empty() && !marker.starts_with(prefix) {
            return Ok(ListObjectsInfo::default());
        }

        if !heal {
            self.get_bucket_info(bucket).await?;
        }

        if max_keys == 0 {
            return Ok(ListObjectsInfo::default());
        }
        let max_keys = clamp_max_keys(max_keys);

        let params = WalkParams {
            bucket: bucket.to_owned(),
            recursive: delimiter.is_empty(),
            marker,
            prefix: prefix.to_owned(),
            heal,
        };

        let mut walker = match self.walk_pool.release(&params) {
            Some(walker) => {
                debug!("resuming listing of {bucket} after {:?}", params.marker);
                walker
            }
            None => self.start_merge_walk(&params).await?,
        };

        let mut loi = ListObjectsInfo::default();
        let mut last = None;
        let mut eof = false;
        while loi.objects.len() + loi.prefixes.len() < max_keys {
            let Some(fi) = walker.next().await else {
                eof = true;
                break;
            };

            last = Some(fi.name.clone());
            if fi.is_dir {
                loi.prefixes.push(fi.name);
            } else {
                loi.objects.push(ObjectInfo::from_file_info(&fi, bucket, &fi.name));
            }
        }

        if !eof {
            if let Some(fi) = walker.next().await {
                walker.push_back(fi);
                loi.is_truncated = true;
                loi.next_marker = last.clone();
                self.walk_pool.set(
                    WalkParams {
                        marker: last.unwrap_or_default(),
                        ..params
                    },
                    walker,
                );
            }
        }

        Ok(loi)
    }

    /// Start a walk on every connected drive of every set and merge them.
    async fn start_merge_walk(&self, params: &WalkParams) -> Result<MergeWalker> {
        let opts = WalkDirOptions {
            bucket: params.bucket.clone(),
            prefix: params.prefix.clone(),
            marker: params.marker.clone(),
            recursive: params.recursive,
            channel_size: self.config().list_channel_size,
        };

        let disks = self.topology().all_disks().await;
        let futures = disks.iter().flatten().map(|disk| disk.walk(opts.clone()));

        let mut chans = Vec::new();
        let mut errs = Vec::new();
        for res in join_all(futures).await {
            match res {
                Ok(rx) => chans.push(FileInfoCh::new(rx)),
                Err(e) => errs.push(e),
            }
        }

        if chans.is_empty() {
            if !errs.is_empty() && errs.iter().all(|e| *e == DiskError::VolumeNotFound) {
                return Err(StorageError::BucketNotFound(params.bucket.clone()));
            }
            return Err(StorageError::InsufficientReadQuorum(params.bucket.clone(), params.prefix.clone()));
        }

        if !errs.is_empty() {
            debug!("listing {} without {} drive(s)", params.bucket, errs.len());
        }

        Ok(MergeWalker::new(chans, self.set_drive_count, params.heal))
    }

    /// Hand every degraded object of a heal listing to the background healer.
    pub(crate) fn queue_heal_listing(&self, loi: &ListObjectsInfo) {
        let Some(queue) = self.topology().heal_queue() else {
            return;
        };

        for obj in loi.objects.iter() {
            let req = HealRequest::new(obj.bucket.as_str(), obj.name.as_str(), HealItemType::Object, HealOpts::default());
            if let Err(e) = queue.try_enqueue(req) {
                debug!("heal hint for {}/{} dropped: {e}", obj.bucket, obj.name);
                break;
            }
        }
    }

    /// Heal, inline, every object under `prefix` that a heal listing reports.
    pub(crate) async fn heal_objects_under(&self, bucket: &str, prefix: &str, opts: &HealOpts) -> Result<Vec<HealResultItem>> {
        self.heal_bucket(bucket, opts).await?;

        let mut healed = Vec::new();
        let mut marker = None;
        loop {
            let loi = self
                .list_objects_generic(bucket, prefix, marker.take(), None, MAX_OBJECT_LIST, true)
                .await?;

            for obj in loi.objects.iter() {
                match self.heal_object(bucket, &obj.name, opts).await {
                    Ok(item) => healed.push(item),
                    Err(e) if is_err_object_not_found(&e) => debug!("{bucket}/{} is gone, skipping", obj.name),
                    Err(e) => warn!("heal {bucket}/{}: {e}", obj.name),
                }
            }

            if !loi.is_truncated {
                break;
            }
            marker = loi.next_marker;
        }

        info!("healed {} object(s) under {bucket}/{prefix}", healed.len());
        Ok(healed)
    }
}
