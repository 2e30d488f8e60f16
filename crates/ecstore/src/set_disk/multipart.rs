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
use crate::disk::error_reduce::{reduce_read_quorum_errs, reduce_write_quorum_errs, OBJECT_OP_IGNORED_ERRS};
use crate::disk::{DeleteOptions, DiskAPI, DiskStore, RUSTFS_META_MULTIPART_BUCKET, RUSTFS_META_TMP_BUCKET};
use crate::erasure_coding::Erasure;
use crate::error::{to_object_err, Result, StorageError};
use crate::fileinfo::{FileInfo, ObjectPartInfo, ETAG_KEY};
use crate::store_api::{
    CompletePart, ListMultipartsInfo, ListPartsInfo, MultipartInfo, MultipartUploadResult, ObjectInfo, ObjectOptions, PartInfo,
    PutObjReader,
};
use bytes::Bytes;
use futures::future::join_all;
use md5::{Digest, Md5};
use rustfs_utils::path::{trim_etag, SLASH_SEPARATOR};
use sha2::Sha256;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum size of every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
pub const MAX_PART_ID: usize = 10000;

pub fn get_multipart_sha_dir(bucket: &str, object: &str) -> String {
    let path = format!("{bucket}/{object}");
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex_simd::encode_to_string(hasher.finalize(), hex_simd::AsciiCase::Lower)
}

pub fn get_upload_id_dir(bucket: &str, object: &str, upload_id: &str) -> String {
    format!("{}/{upload_id}", get_multipart_sha_dir(bucket, object))
}

/// ETag of a completed multipart object: md5 over the binary part md5s,
/// suffixed with the part count.
pub fn get_complete_multipart_md5(parts: &[ObjectPartInfo]) -> String {
    let mut buf = Vec::with_capacity(parts.len() * 16);

    for part in parts {
        let etag = trim_etag(&part.etag);
        match hex_simd::decode_to_vec(etag.as_bytes()) {
            Ok(decoded) => buf.extend_from_slice(&decoded),
            Err(_) => buf.extend_from_slice(etag.as_bytes()),
        }
    }

    let digest = hex_simd::encode_to_string(Md5::digest(&buf), hex_simd::AsciiCase::Lower);
    format!("{digest}-{}", parts.len())
}

fn part_meta_path(upload_dir: &str, number: usize) -> String {
    format!("{upload_dir}/part.{number}.meta")
}

fn parse_part_meta_name(name: &str) -> Option<usize> {
    name.strip_prefix("part.")?.strip_suffix(".meta")?.parse().ok()
}

impl SetDisks {
    async fn check_upload_id_exists(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Result<(FileInfo, Vec<Option<DiskStore>>)> {
        let upload_dir = get_upload_id_dir(bucket, object, upload_id);
        let disks = self.get_disks().await;
        let (metas, errs) = Self::read_all_fileinfo(&disks, RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;

        let invalid = || StorageError::InvalidUploadID(bucket.to_owned(), object.to_owned(), upload_id.to_owned());

        if let Some(err) = reduce_read_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, self.default_read_quorum()) {
            return Err(match err {
                DiskError::FileNotFound | DiskError::VolumeNotFound => invalid(),
                err => to_object_err(err.into(), vec![bucket, object]),
            });
        }

        let fi = Self::find_file_info_in_quorum(&metas, &errs).map_err(|e| to_object_err(e.into(), vec![bucket, object]))?;
        if fi.volume != bucket || fi.name != object {
            return Err(invalid());
        }

        Ok((fi, disks))
    }

    /// Part records agreed on by at least `quorum` drives, ordered by number.
    async fn read_upload_parts(disks: &[Option<DiskStore>], upload_dir: &str, quorum: usize) -> Vec<ObjectPartInfo> {
        let futures = disks.iter().map(|disk| async move {
            let disk = disk.as_ref()?;
            let entries = disk.list_dir(RUSTFS_META_MULTIPART_BUCKET, upload_dir, -1).await.ok()?;

            let mut parts = Vec::new();
            for number in entries.iter().filter_map(|e| parse_part_meta_name(e)) {
                let data = match disk.read_all(RUSTFS_META_MULTIPART_BUCKET, &part_meta_path(upload_dir, number)).await {
                    Ok(data) => data,
                    Err(e) => {
                        debug!("read part {number} of {upload_dir} on {}: {e}", disk.to_string());
                        continue;
                    }
                };
                match serde_json::from_slice::<ObjectPartInfo>(&data) {
                    Ok(part) => parts.push(part),
                    Err(e) => warn!("corrupt part record {number} of {upload_dir} on {}: {e}", disk.to_string()),
                }
            }
            Some(parts)
        });

        let mut votes: HashMap<(usize, String), (usize, ObjectPartInfo)> = HashMap::new();
        for part in join_all(futures).await.into_iter().flatten().flatten() {
            let entry = votes
                .entry((part.number, part.etag.clone()))
                .or_insert_with(|| (0, part.clone()));
            entry.0 += 1;
        }

        let mut best: HashMap<usize, (usize, ObjectPartInfo)> = HashMap::new();
        for (count, part) in votes.into_values().filter(|(count, _)| *count >= quorum) {
            let replace = match best.get(&part.number) {
                None => true,
                Some((c, cur)) => count > *c || (count == *c && part.mod_time > cur.mod_time),
            };
            if replace {
                best.insert(part.number, (count, part));
            }
        }

        let mut parts: Vec<ObjectPartInfo> = best.into_values().map(|(_, p)| p).collect();
        parts.sort_by_key(|p| p.number);
        parts
    }

    #[tracing::instrument(level = "debug", skip(self, opts))]
    pub async fn new_multipart_upload(&self, bucket: &str, object: &str, opts: &ObjectOptions) -> Result<MultipartUploadResult> {
        self.get_bucket_info(bucket).await?;

        let parity = self.default_parity_count;
        let mut fi = FileInfo::new(object, self.set_drive_count - parity, parity);
        fi.volume = bucket.to_owned();
        fi.mod_time = Some(OffsetDateTime::now_utc());
        fi.metadata = opts.user_defined.clone();

        let upload_id = Uuid::new_v4().to_string();
        let upload_dir = get_upload_id_dir(bucket, object, &upload_id);

        let disks = self.get_disks().await;
        let futures = disks.iter().enumerate().map(|(i, disk)| {
            let mut fi = fi.clone();
            let upload_dir = upload_dir.as_str();
            async move {
                let Some(disk) = disk else {
                    return Some(DiskError::DiskNotFound);
                };
                fi.erasure.index = fi.erasure.distribution.get(i).copied().unwrap_or_default();
                disk.write_metadata(RUSTFS_META_MULTIPART_BUCKET, upload_dir, fi).await.err()
            }
        });
        let errs = join_all(futures).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        Ok(MultipartUploadResult { upload_id })
    }

    #[tracing::instrument(level = "debug", skip(self, data, _opts))]
    pub async fn put_object_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_id: usize,
        data: &mut PutObjReader,
        _opts: &ObjectOptions,
    ) -> Result<PartInfo> {
        if part_id == 0 || part_id > MAX_PART_ID {
            return Err(StorageError::InvalidArgument(
                bucket.to_owned(),
                object.to_owned(),
                format!("part number {part_id} out of range"),
            ));
        }

        let upload_dir = get_upload_id_dir(bucket, object, upload_id);
        let _guard = self.ns_mutex.read(RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;

        let (fi, disks) = self.check_upload_id_exists(bucket, object, upload_id).await?;

        let erasure = Erasure::new(fi.erasure.data_blocks, fi.erasure.parity_blocks)?;
        let shards = erasure.encode_data(data.data())?;

        let part = ObjectPartInfo {
            etag: data.md5_hex(),
            number: part_id,
            size: data.size(),
            actual_size: data.size() as i64,
            mod_time: Some(OffsetDateTime::now_utc()),
        };
        let part_meta = Bytes::from(serde_json::to_vec(&part)?);

        let tmp = Uuid::new_v4().to_string();
        let tmp_part = format!("{tmp}/part.{part_id}");
        let dst_part = format!("{upload_dir}/part.{part_id}");
        let meta_path = part_meta_path(&upload_dir, part_id);

        let futures = disks.iter().enumerate().map(|(i, disk)| {
            let (shards, part_meta) = (&shards, part_meta.clone());
            let (tmp_part, dst_part, meta_path) = (tmp_part.as_str(), dst_part.as_str(), meta_path.as_str());
            let index = fi.erasure.distribution.get(i).copied();
            async move {
                let Some(disk) = disk else {
                    return Some(DiskError::DiskNotFound);
                };
                let Some(shard) = index.and_then(|idx| shards.get(idx - 1)) else {
                    return Some(DiskError::other("distribution shorter than the set"));
                };

                if let Err(e) = disk.write_all(RUSTFS_META_TMP_BUCKET, tmp_part, shard.clone()).await {
                    return Some(e);
                }
                if let Err(e) = disk
                    .rename_file(RUSTFS_META_TMP_BUCKET, tmp_part, RUSTFS_META_MULTIPART_BUCKET, dst_part)
                    .await
                {
                    return Some(e);
                }
                disk.write_all(RUSTFS_META_MULTIPART_BUCKET, meta_path, part_meta).await.err()
            }
        });
        let errs = join_all(futures).await;

        Self::cleanup_tmp(&disks, &tmp).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        Ok(PartInfo::from(&part))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_object_parts(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: Option<usize>,
        max_parts: usize,
    ) -> Result<ListPartsInfo> {
        let upload_dir = get_upload_id_dir(bucket, object, upload_id);
        let _guard = self.ns_mutex.read(RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;

        let (fi, disks) = self.check_upload_id_exists(bucket, object, upload_id).await?;
        let marker = part_number_marker.unwrap_or_default();

        let mut ret = ListPartsInfo {
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            upload_id: upload_id.to_owned(),
            part_number_marker: marker,
            max_parts,
            user_defined: fi.metadata.clone(),
            ..Default::default()
        };
        if max_parts == 0 {
            return Ok(ret);
        }

        let parts = Self::read_upload_parts(&disks, &upload_dir, fi.read_quorum()).await;
        let mut remaining = parts.iter().filter(|p| p.number > marker);

        ret.parts = remaining.by_ref().take(max_parts).map(PartInfo::from).collect();
        ret.is_truncated = remaining.next().is_some();
        if ret.is_truncated {
            ret.next_part_number_marker = ret.parts.last().map(|p| p.part_num).unwrap_or_default();
        }

        Ok(ret)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn abort_multipart_upload(&self, bucket: &str, object: &str, upload_id: &str) -> Result<()> {
        let upload_dir = get_upload_id_dir(bucket, object, upload_id);
        let _guard = self.ns_mutex.write(RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;

        let (fi, disks) = self.check_upload_id_exists(bucket, object, upload_id).await?;
        let errs = Self::delete_upload_dir(&disks, &upload_dir).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }
        Ok(())
    }

    async fn delete_upload_dir(disks: &[Option<DiskStore>], upload_dir: &str) -> Vec<Option<DiskError>> {
        let futures = disks.iter().map(|disk| async move {
            let Some(disk) = disk else {
                return Some(DiskError::DiskNotFound);
            };
            match disk
                .delete(RUSTFS_META_MULTIPART_BUCKET, upload_dir, DeleteOptions { recursive: true })
                .await
            {
                Ok(()) | Err(DiskError::FileNotFound) => None,
                Err(e) => Some(e),
            }
        });
        join_all(futures).await
    }

    #[tracing::instrument(level = "debug", skip(self, uploaded_parts, opts))]
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        uploaded_parts: Vec<CompletePart>,
        opts: &ObjectOptions,
    ) -> Result<ObjectInfo> {
        let upload_dir = get_upload_id_dir(bucket, object, upload_id);
        let _upload_guard = self.ns_mutex.write(RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;

        let (upload_fi, disks) = self.check_upload_id_exists(bucket, object, upload_id).await?;
        let current = Self::read_upload_parts(&disks, &upload_dir, upload_fi.read_quorum()).await;

        if uploaded_parts.is_empty() {
            return Err(StorageError::InvalidPart(0, String::new(), String::new()));
        }

        let mut fi = upload_fi.clone();
        fi.parts = Vec::with_capacity(uploaded_parts.len());
        let mut total_size = 0i64;
        let mut prev = 0usize;

        for (i, p) in uploaded_parts.iter().enumerate() {
            if p.part_num <= prev {
                return Err(StorageError::InvalidArgument(
                    bucket.to_owned(),
                    object.to_owned(),
                    format!("part {} listed out of order", p.part_num),
                ));
            }
            prev = p.part_num;

            let got = p.etag.as_deref().map(trim_etag).unwrap_or_default();
            let Some(part) = current.iter().find(|c| c.number == p.part_num) else {
                return Err(StorageError::InvalidPart(p.part_num, String::new(), got));
            };
            if part.etag != got {
                return Err(StorageError::InvalidPart(p.part_num, part.etag.clone(), got));
            }

            let last = i + 1 == uploaded_parts.len();
            if !last && part.size < MIN_PART_SIZE {
                return Err(StorageError::EntityTooSmall(p.part_num, part.size as i64, MIN_PART_SIZE as i64));
            }

            total_size += part.size as i64;
            fi.parts.push(part.clone());
        }

        fi.size = total_size;
        fi.mod_time = Some(OffsetDateTime::now_utc());
        fi.metadata.insert(ETAG_KEY.to_owned(), get_complete_multipart_md5(&fi.parts));

        let _guard = self.lock_write(bucket, object, opts.no_lock).await;

        let futures = disks.iter().enumerate().map(|(i, disk)| {
            let mut fi = fi.clone();
            let upload_dir = upload_dir.as_str();
            async move {
                let Some(disk) = disk else {
                    return Some(DiskError::DiskNotFound);
                };
                fi.erasure.index = fi.erasure.distribution.get(i).copied().unwrap_or_default();
                Self::commit_object_on_disk(disk, RUSTFS_META_MULTIPART_BUCKET, upload_dir, bucket, object, fi)
                    .await
                    .err()
            }
        });
        let errs = join_all(futures).await;

        if let Some(err) = reduce_write_quorum_errs(&errs, OBJECT_OP_IGNORED_ERRS, fi.write_quorum()) {
            return Err(to_object_err(err.into(), vec![bucket, object]));
        }

        for err in Self::delete_upload_dir(&disks, &upload_dir).await.into_iter().flatten() {
            if err != DiskError::DiskNotFound {
                warn!("remove completed upload {upload_dir}: {err}");
            }
        }

        Ok(ObjectInfo::from_file_info(&fi, bucket, object))
    }

    /// Every upload recorded on any drive, keyed by upload id.
    async fn scan_uploads(&self) -> HashMap<String, FileInfo> {
        let disks = self.get_disks().await;
        let mut uploads = HashMap::new();

        for disk in disks.iter().flatten() {
            for (upload_id, fi) in scan_disk_uploads(disk).await {
                uploads.entry(upload_id).or_insert(fi);
            }
        }
        uploads
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        key_marker: Option<String>,
        upload_id_marker: Option<String>,
        delimiter: Option<String>,
        max_uploads: usize,
    ) -> Result<ListMultipartsInfo> {
        let mut ret = ListMultipartsInfo {
            key_marker: key_marker.clone(),
            upload_id_marker: upload_id_marker.clone(),
            max_uploads,
            prefix: prefix.to_owned(),
            delimiter: delimiter.clone(),
            ..Default::default()
        };
        if max_uploads == 0 {
            return Ok(ret);
        }

        let mut uploads: Vec<MultipartInfo> = self
            .scan_uploads()
            .await
            .into_iter()
            .filter(|(_, fi)| fi.volume == bucket && fi.name.starts_with(prefix))
            .map(|(upload_id, fi)| MultipartInfo {
                bucket: fi.volume,
                object: fi.name,
                upload_id,
                initiated: fi.mod_time,
                user_defined: fi.metadata,
            })
            .collect();
        uploads.sort_by(|a, b| {
            a.object
                .cmp(&b.object)
                .then(a.initiated.cmp(&b.initiated))
                .then(a.upload_id.cmp(&b.upload_id))
        });

        if let Some(marker) = key_marker.as_deref().filter(|m| !m.is_empty()) {
            let skip_to = match upload_id_marker.as_deref() {
                Some(id) => uploads
                    .iter()
                    .position(|u| u.object == marker && u.upload_id == id)
                    .map(|pos| pos + 1)
                    .unwrap_or_else(|| uploads.iter().position(|u| u.object.as_str() > marker).unwrap_or(uploads.len())),
                None => uploads
                    .iter()
                    .position(|u| u.object.as_str() > marker)
                    .unwrap_or(uploads.len()),
            };
            uploads.drain(..skip_to);
        }

        let group = delimiter.as_deref() == Some(SLASH_SEPARATOR);
        let mut prefixes = BTreeSet::new();
        let mut count = 0;

        for upload in uploads {
            let common = if group {
                upload.object[prefix.len()..]
                    .find(SLASH_SEPARATOR)
                    .map(|pos| upload.object[..prefix.len() + pos + 1].to_owned())
            } else {
                None
            };

            if count == max_uploads {
                let repeat = common.as_ref().is_some_and(|c| prefixes.contains(c));
                if !repeat {
                    ret.is_truncated = true;
                    break;
                }
                continue;
            }

            match common {
                Some(common) => {
                    if prefixes.insert(common.clone()) {
                        count += 1;
                        ret.next_key_marker = Some(common);
                        ret.next_upload_id_marker = None;
                    }
                }
                None => {
                    count += 1;
                    ret.next_key_marker = Some(upload.object.clone());
                    ret.next_upload_id_marker = Some(upload.upload_id.clone());
                    ret.uploads.push(upload);
                }
            }
        }

        if !ret.is_truncated {
            ret.next_key_marker = None;
            ret.next_upload_id_marker = None;
        }
        ret.common_prefixes = prefixes.into_iter().collect();
        Ok(ret)
    }

    /// Remove uploads initiated more than `expiry` ago from every drive of the set.
    pub async fn cleanup_stale_uploads(&self, expiry: Duration) -> usize {
        let now = OffsetDateTime::now_utc();
        let disks = self.get_disks().await;
        let mut removed = 0;

        for disk in disks.iter().flatten() {
            for (upload_id, fi) in scan_disk_uploads(disk).await {
                let Some(initiated) = fi.mod_time else {
                    continue;
                };
                if now - initiated < expiry {
                    continue;
                }

                let upload_dir = get_upload_id_dir(&fi.volume, &fi.name, &upload_id);
                let _guard = self.ns_mutex.write(RUSTFS_META_MULTIPART_BUCKET, &upload_dir).await;
                match disk
                    .delete(RUSTFS_META_MULTIPART_BUCKET, &upload_dir, DeleteOptions { recursive: true })
                    .await
                {
                    Ok(()) => {
                        debug!("removed stale upload {upload_dir} on {}", disk.to_string());
                        removed += 1;
                    }
                    Err(DiskError::FileNotFound) => {}
                    Err(e) => warn!("remove stale upload {upload_dir} on {}: {e}", disk.to_string()),
                }
            }
        }

        if removed > 0 {
            info!("set {} removed {removed} stale upload dir(s)", self.set_index.0);
        }
        removed
    }
}

/// `(upload id, upload record)` for every upload directory on one drive.
async fn scan_disk_uploads(disk: &DiskStore) -> Vec<(String, FileInfo)> {
    let Ok(sha_dirs) = disk.list_dir(RUSTFS_META_MULTIPART_BUCKET, "", -1).await else {
        return Vec::new();
    };

    let mut uploads = Vec::new();
    for sha_dir in sha_dirs.iter().filter(|d| d.ends_with(SLASH_SEPARATOR)) {
        let sha_dir = sha_dir.trim_end_matches(SLASH_SEPARATOR);
        let Ok(ids) = disk.list_dir(RUSTFS_META_MULTIPART_BUCKET, sha_dir, -1).await else {
            continue;
        };

        for id in ids.iter().filter(|d| d.ends_with(SLASH_SEPARATOR)) {
            let id = id.trim_end_matches(SLASH_SEPARATOR);
            match disk
                .read_metadata(RUSTFS_META_MULTIPART_BUCKET, &format!("{sha_dir}/{id}"))
                .await
            {
                Ok(fi) => uploads.push((id.to_owned(), fi)),
                Err(e) => debug!("skip upload {sha_dir}/{id} on {}: {e}", disk.to_string()),
            }
        }
    }
    uploads
}
