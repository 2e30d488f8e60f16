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

use super::SetDisks;
use crate::disk::error::DiskError;
use crate::disk::error_reduce::{is_all_buckets_not_found, reduce_read_quorum_errs, OBJECT_OP_IGNORED_ERRS};
use crate::disk::{DiskAPI, DiskStore};
use crate::erasure_coding::Erasure;
use crate::error::{to_object_err, Result, StorageError};
use crate::fileinfo::FileInfo;
use crate::topology::DiskCoord;
use futures::future::join_all;
use rustfs_common::heal_channel::{DriveState, HealOpts};
use rustfs_madmin::heal_commands::{HealDriveInfo, HealResultItem, Infos, HEAL_ITEM_BUCKET, HEAL_ITEM_OBJECT};
use tracing::{info, warn};

impl SetDisks {
    async fn drive_infos(&self, states: &[DriveState]) -> Vec<HealDriveInfo> {
        let format = self.topology.format().await;
        self.endpoints()
            .iter()
            .zip(states)
            .enumerate()
            .map(|(slot, (ep, state))| HealDriveInfo {
                uuid: format
                    .uuid_at(DiskCoord::new(self.set_index.0, slot))
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                endpoint: ep.to_string(),
                state: state.to_string(),
            })
            .collect()
    }

    fn new_result_item(&self, item_type: &str, bucket: &str, object: &str) -> HealResultItem {
        HealResultItem {
            heal_item_type: item_type.to_owned(),
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            disk_count: self.set_drive_count,
            set_count: self.topology.set_count(),
            ..Default::default()
        }
    }

    /// Create `bucket` on drives of this set that lack it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn heal_bucket(&self, bucket: &str, opts: &HealOpts) -> Result<HealResultItem> {
        let disks = self.get_disks().await;

        let futures = disks.iter().map(|disk| async move {
            match disk {
                Some(disk) => disk.stat_volume(bucket).await.err(),
                None => Some(DiskError::DiskNotFound),
            }
        });
        let errs = join_all(futures).await;

        if is_all_buckets_not_found(&errs) {
            return Err(StorageError::BucketNotFound(bucket.to_owned()));
        }

        let before: Vec<DriveState> = errs.iter().map(volume_drive_state).collect();
        let mut after = before.clone();

        if !opts.dry_run {
            let futures = disks.iter().zip(&before).map(|(disk, state)| async move {
                match (disk, state) {
                    (Some(disk), DriveState::Missing) => Some(disk.make_volume(bucket).await),
                    _ => None,
                }
            });

            for (i, res) in join_all(futures).await.into_iter().enumerate() {
                match res {
                    Some(Ok(())) => after[i] = DriveState::Ok,
                    Some(Err(DiskError::VolumeExists)) => after[i] = DriveState::Ok,
                    Some(Err(e)) => warn!("heal bucket {bucket} on {}: {e}", self.endpoints()[i]),
                    None => {}
                }
            }
        }

        let mut item = self.new_result_item(HEAL_ITEM_BUCKET, bucket, "");
        item.before = Infos {
            drives: self.drive_infos(&before).await,
        };
        item.after = Infos {
            drives: self.drive_infos(&after).await,
        };
        Ok(item)
    }

    /// Rewrite the shards and metadata of `object` on drives that are missing
    /// them or hold another version.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn heal_object(&self, bucket: &str, object: &str, opts: &HealOpts) -> Result<HealResultItem> {
        let _guard = self.lock_write(bucket, object, opts.no_lock).await;

        let disks = self.get_disks().await;
        let (metas, errs) = Self::read_all_fileinfo(&disks, bucket, object).await;

        let latest = match Self::find_file_info_in_quorum(&metas, &errs) {
            Ok(fi) => fi,
            Err(_) => return Err(self.handle_unreadable(&disks, &metas, &errs, bucket, object, opts).await),
        };

        let mut item = self.new_result_item(HEAL_ITEM_OBJECT, bucket, object);
        item.data_blocks = latest.erasure.data_blocks;
        item.parity_blocks = latest.erasure.parity_blocks;
        item.object_size = latest.size.max(0) as usize;

        let mut before: Vec<DriveState> = disks
            .iter()
            .zip(metas.iter().zip(&errs))
            .map(|(disk, (meta, err))| match (disk, err) {
                (None, _) => DriveState::Offline,
                (Some(_), Some(DiskError::DiskNotFound)) => DriveState::Offline,
                (Some(_), Some(DiskError::FileNotFound)) => DriveState::Missing,
                (Some(_), Some(_)) => DriveState::Corrupt,
                (Some(_), None) if meta.is_same_version(&latest) => DriveState::Ok,
                (Some(_), None) => DriveState::Corrupt,
            })
            .collect();

        // a current xl.meta with a missing or short shard still needs healing
        let mut part_shards = Vec::with_capacity(latest.parts.len());
        for part in latest.parts.iter() {
            let shards = Self::read_part_shards(&disks, &metas, &errs, &latest, bucket, object, part).await;
            for (i, state) in before.iter_mut().enumerate() {
                if *state != DriveState::Ok {
                    continue;
                }
                let missing = latest
                    .erasure
                    .distribution
                    .get(i)
                    .is_none_or(|&idx| shards.get(idx - 1).is_none_or(Option::is_none));
                if missing {
                    *state = DriveState::Corrupt;
                }
            }
            part_shards.push((part, shards));
        }

        let mut after = before.clone();
        let lagging: Vec<Option<DiskStore>> = disks
            .iter()
            .zip(&before)
            .map(|(disk, state)| match state {
                DriveState::Missing | DriveState::Corrupt => disk.clone(),
                _ => None,
            })
            .collect();

        if !opts.dry_run && lagging.iter().any(Option::is_some) {
            let erasure = Erasure::new(latest.erasure.data_blocks, latest.erasure.parity_blocks)?;

            let mut parts = Vec::with_capacity(part_shards.len());
            for (part, mut shards) in part_shards {
                let rebuilt = erasure.reconstruct_all(&mut shards, part.size).map_err(|e| {
                    warn!("rebuild {bucket}/{object} part {} failed: {e}", part.number);
                    to_object_err(StorageError::ErasureReadQuorum, vec![bucket, object])
                })?;
                parts.push((part.number, rebuilt));
            }

            let errs = Self::write_object(&lagging, bucket, object, &latest, &parts).await;
            for (i, err) in errs.iter().enumerate() {
                if lagging[i].is_none() {
                    continue;
                }
                match err {
                    None => after[i] = DriveState::Ok,
                    Some(e) => warn!("heal {bucket}/{object} on {}: {e}", self.endpoints()[i]),
                }
            }

            let healed = after.iter().zip(&before).filter(|(a, b)| a != b).count();
            info!("healed {bucket}/{object} on {healed} drive(s)");
        }

        item.before = Infos {
            drives: self.drive_infos(&before).await,
        };
        item.after = Infos {
            drives: self.drive_infos(&after).await,
        };
        Ok(item)
    }

    /// Error for an object with no readable version. With `remove` set, a
    /// dangling object that can never reach read quorum is deleted.
    async fn handle_unreadable(
        &self,
        disks: &[Option<DiskStore>],
        metas: &[FileInfo],
        errs: &[Option<DiskError>],
        bucket: &str,
        object: &str,
        opts: &HealOpts,
    ) -> StorageError {
        let not_found = errs.iter().filter(|e| matches!(e, Some(DiskError::FileNotFound))).count();
        if not_found == errs.len() {
            return StorageError::ObjectNotFound(bucket.to_owned(), object.to_owned());
        }

        // more drives lack the object than parity can cover
        let dangling = metas
            .iter()
            .find(|m| m.is_valid())
            .is_some_and(|m| not_found > m.erasure.parity_blocks);

        if dangling && opts.remove && !opts.dry_run {
            info!("removing dangling object {bucket}/{object}");
            let futures = disks
                .iter()
                .zip(errs)
                .filter(|(_, err)| err.is_none())
                .filter_map(|(disk, _)| disk.as_ref())
                .map(|disk| Self::delete_object_on_disk(disk, bucket, object));
            for res in join_all(futures).await {
                if let Err(e) = res {
                    warn!("remove dangling {bucket}/{object}: {e}");
                }
            }
            return StorageError::ObjectNotFound(bucket.to_owned(), object.to_owned());
        }

        let err = reduce_read_quorum_errs(errs, OBJECT_OP_IGNORED_ERRS, self.default_read_quorum())
            .unwrap_or(DiskError::ErasureReadQuorum);
        to_object_err(err.into(), vec![bucket, object])
    }
}

fn volume_drive_state(err: &Option<DiskError>) -> DriveState {
    match err {
        None => DriveState::Ok,
        Some(DiskError::VolumeNotFound) => DriveState::Missing,
        Some(DiskError::DiskNotFound) => DriveState::Offline,
        Some(_) => DriveState::Corrupt,
    }
}
