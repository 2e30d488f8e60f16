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

use super::error::{to_disk_error, to_file_error, to_volume_error, DiskError, Result};
use super::os::{self, check_path_length, is_root_disk};
use super::{
    DeleteOptions, DiskAPI, DiskInfo, DiskOption, VolumeInfo, WalkDirOptions, FORMAT_CONFIG_FILE, RUSTFS_META_BUCKET,
    RUSTFS_META_MULTIPART_BUCKET, RUSTFS_META_TMP_BUCKET, STORAGE_FORMAT_FILE,
};
use crate::disk::endpoint::Endpoint;
use crate::disk::format::FormatV3;
use crate::fileinfo::FileInfo;
use bytes::Bytes;
use rustfs_utils::path::{base_dir_from_prefix, clean, path_join_buf, SLASH_SEPARATOR};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

const DEFAULT_WALK_CHANNEL_SIZE: usize = 64;

#[derive(Debug)]
pub struct LocalDisk {
    pub root: PathBuf,
    pub format_path: PathBuf,
    endpoint: Endpoint,
    disk_id: RwLock<Option<Uuid>>,
    closed: AtomicBool,
    root_disk: bool,
}

impl LocalDisk {
    /// Open the drive at `ep`. The drive directory itself must already exist.
    pub async fn new(ep: &Endpoint, opt: &DiskOption) -> Result<Self> {
        let root = ep.get_file_path();
        check_path_length(root.to_string_lossy().as_ref())?;

        let meta = fs::metadata(&root).await.map_err(to_disk_error)?;
        if !meta.is_dir() {
            return Err(DiskError::DiskNotDir);
        }

        let root_disk = is_root_disk(root.to_string_lossy().as_ref(), SLASH_SEPARATOR).unwrap_or_default();

        let format_path = root.join(RUSTFS_META_BUCKET).join(FORMAT_CONFIG_FILE);

        let disk = Self {
            root,
            format_path,
            endpoint: ep.clone(),
            disk_id: RwLock::new(None),
            closed: AtomicBool::new(false),
            root_disk,
        };

        if opt.cleanup {
            disk.cleanup_tmp().await;
        }

        disk.make_meta_volumes().await?;

        debug!("local disk {} opened", disk.root.display());

        Ok(disk)
    }

    async fn make_meta_volumes(&self) -> Result<()> {
        self.make_volumes(vec![RUSTFS_META_BUCKET, RUSTFS_META_MULTIPART_BUCKET, RUSTFS_META_TMP_BUCKET])
            .await
    }

    // Leftovers from interrupted uploads.
    async fn cleanup_tmp(&self) {
        let tmp = self.root.join(RUSTFS_META_TMP_BUCKET);
        if let Err(e) = fs::remove_dir_all(&tmp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("cleanup of {} failed: {e}", tmp.display());
            }
        }
    }

    async fn check_root(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiskError::DiskNotFound);
        }

        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(DiskError::DiskNotDir),
            Err(e) => Err(to_disk_error(e)),
        }
    }

    fn check_valid_path(&self, key: &str) -> Result<PathBuf> {
        let cleaned = clean(key);
        if cleaned == "." || cleaned.starts_with("..") || cleaned.starts_with(SLASH_SEPARATOR) {
            return Err(DiskError::InvalidPath);
        }
        check_path_length(&cleaned)?;
        Ok(self.root.join(cleaned))
    }

    pub fn get_bucket_path(&self, volume: &str) -> Result<PathBuf> {
        self.check_valid_path(volume)
    }

    pub fn get_object_path(&self, volume: &str, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return self.get_bucket_path(volume);
        }
        self.check_valid_path(&path_join_buf(&[volume, path]))
    }

    async fn check_volume(&self, volume: &str) -> Result<PathBuf> {
        let volume_dir = self.get_bucket_path(volume)?;
        match fs::metadata(&volume_dir).await {
            Ok(meta) if meta.is_dir() => Ok(volume_dir),
            Ok(_) => Err(DiskError::VolumeNotFound),
            Err(e) => Err(to_volume_error(e)),
        }
    }

    async fn write_atomic(&self, dst: &Path, data: &[u8]) -> Result<()> {
        let tmp_dir = self.root.join(RUSTFS_META_TMP_BUCKET);
        os::make_dir_all(&tmp_dir).await?;

        let tmp = tmp_dir.join(Uuid::new_v4().to_string());
        fs::write(&tmp, data).await.map_err(to_file_error)?;

        if let Err(e) = os::rename_all(&tmp, dst).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Delete `path` and then every parent left empty, stopping at the volume.
    async fn delete_file(&self, volume_dir: &Path, path: &Path, recursive: bool) -> Result<()> {
        let meta = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) => return Err(to_file_error(e)),
        };

        let res = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_dir(path).await
            }
        } else {
            fs::remove_file(path).await
        };

        if let Err(e) = res {
            match e.kind() {
                // Children keep a non-empty directory alive.
                ErrorKind::DirectoryNotEmpty => return Ok(()),
                ErrorKind::NotFound => return Err(DiskError::FileNotFound),
                _ => return Err(to_file_error(e)),
            }
        }

        if let Some(parent) = path.parent() {
            os::remove_empty_parents(parent, volume_dir).await;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl DiskAPI for LocalDisk {
    fn to_string(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn host_name(&self) -> String {
        self.endpoint.host_port()
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn path(&self) -> PathBuf {
        self.root.clone()
    }

    async fn is_online(&self) -> bool {
        self.check_root().await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_disk_id(&self) -> Result<Option<Uuid>> {
        self.check_root().await?;

        let data = match fs::read(&self.format_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(DiskError::UnformattedDisk),
            Err(e) => return Err(to_file_error(e)),
        };

        if data.is_empty() {
            return Err(DiskError::UnformattedDisk);
        }

        let fm = FormatV3::try_from(data.as_slice()).map_err(|e| {
            warn!("decode {} failed: {e}", self.format_path.display());
            DiskError::CorruptedFormat
        })?;

        let id = fm.erasure.this;
        *self.disk_id.write().await = Some(id);
        Ok(Some(id))
    }

    async fn set_disk_id(&self, id: Option<Uuid>) -> Result<()> {
        *self.disk_id.write().await = id;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn disk_info(&self) -> Result<DiskInfo> {
        self.check_root().await?;

        let info = rustfs_utils::os::get_info(&self.root).map_err(to_disk_error)?;

        let id = match self.get_disk_id().await {
            Ok(id) => id,
            Err(_) => *self.disk_id.read().await,
        };

        Ok(DiskInfo {
            total: info.total,
            free: info.free,
            used: info.used,
            used_inodes: info.files.saturating_sub(info.ffree),
            free_inodes: info.ffree,
            major: info.major,
            minor: info.minor,
            root_disk: self.root_disk,
            healing: false,
            endpoint: self.endpoint.to_string(),
            mount_path: self.to_string(),
            id,
            error: String::new(),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn make_volume(&self, volume: &str) -> Result<()> {
        self.check_root().await?;
        let volume_dir = self.get_bucket_path(volume)?;

        match fs::metadata(&volume_dir).await {
            Ok(_) => Err(DiskError::VolumeExists),
            Err(e) if e.kind() == ErrorKind::NotFound => os::make_dir_all(&volume_dir).await,
            Err(e) => {
                error!("local disk make volume failed: {e}");
                Err(to_volume_error(e))
            }
        }
    }

    async fn make_volumes(&self, volumes: Vec<&str>) -> Result<()> {
        for vol in volumes {
            if let Err(e) = self.make_volume(vol).await {
                if e != DiskError::VolumeExists {
                    error!("local disk make volumes failed: {e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        self.check_root().await?;

        let entries = os::read_dir(&self.root, -1).await.map_err(to_volume_error)?;

        let mut volumes = Vec::new();
        for entry in entries {
            if !entry.ends_with(SLASH_SEPARATOR) {
                continue;
            }
            let name = entry.trim_end_matches(SLASH_SEPARATOR);
            if name == RUSTFS_META_BUCKET {
                continue;
            }

            let created = match fs::metadata(self.root.join(name)).await {
                Ok(meta) => meta.modified().ok().map(OffsetDateTime::from),
                Err(_) => continue,
            };

            volumes.push(VolumeInfo {
                name: name.to_owned(),
                created,
            });
        }

        Ok(volumes)
    }

    #[tracing::instrument(skip(self))]
    async fn stat_volume(&self, volume: &str) -> Result<VolumeInfo> {
        self.check_root().await?;
        let volume_dir = self.check_volume(volume).await?;

        let created = fs::metadata(&volume_dir)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(OffsetDateTime::from);

        Ok(VolumeInfo {
            name: volume.to_string(),
            created,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn delete_volume(&self, volume: &str, force: bool) -> Result<()> {
        self.check_root().await?;
        let volume_dir = self.get_bucket_path(volume)?;

        let res = if force {
            fs::remove_dir_all(&volume_dir).await
        } else {
            fs::remove_dir(&volume_dir).await
        };

        res.map_err(to_volume_error)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn walk(&self, opts: WalkDirOptions) -> Result<mpsc::Receiver<FileInfo>> {
        self.check_root().await?;
        let volume_dir = self.check_volume(&opts.bucket).await?;

        let size = if opts.channel_size == 0 {
            DEFAULT_WALK_CHANNEL_SIZE
        } else {
            opts.channel_size
        };
        let (tx, rx) = mpsc::channel(size);

        let disk = self.to_string();
        tokio::spawn(async move {
            if let Err(e) = walk_volume(volume_dir, opts, tx).await {
                warn!("walk on {disk} stopped: {e}");
            }
        });

        Ok(rx)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_dir(&self, volume: &str, dir_path: &str, count: i32) -> Result<Vec<String>> {
        self.check_root().await?;
        self.check_volume(volume).await?;

        let dir = self.get_object_path(volume, dir_path.trim_start_matches(SLASH_SEPARATOR))?;
        os::read_dir(&dir, count).await.map_err(to_file_error)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn read_all(&self, volume: &str, path: &str) -> Result<Bytes> {
        self.check_root().await?;
        let file_path = self.get_object_path(volume, path)?;

        match fs::read(&file_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.check_volume(volume).await?;
                Err(DiskError::FileNotFound)
            }
            Err(e) => Err(to_file_error(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, data))]
    async fn write_all(&self, volume: &str, path: &str, data: Bytes) -> Result<()> {
        self.check_root().await?;
        self.check_volume(volume).await?;

        let file_path = self.get_object_path(volume, path)?;
        if let Some(parent) = file_path.parent() {
            os::make_dir_all(parent).await?;
        }

        fs::write(&file_path, &data).await.map_err(to_file_error)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn rename_file(&self, src_volume: &str, src_path: &str, dst_volume: &str, dst_path: &str) -> Result<()> {
        self.check_root().await?;
        self.check_volume(src_volume).await?;
        self.check_volume(dst_volume).await?;

        let src = self.get_object_path(src_volume, src_path)?;
        let dst = self.get_object_path(dst_volume, dst_path)?;

        os::rename_all(&src, &dst).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, volume: &str, path: &str, opt: DeleteOptions) -> Result<()> {
        self.check_root().await?;
        let volume_dir = self.check_volume(volume).await?;

        let file_path = self.get_object_path(volume, path)?;
        self.delete_file(&volume_dir, &file_path, opt.recursive).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_bulk(&self, volume: &str, paths: &[String]) -> Result<Vec<Option<DiskError>>> {
        self.check_root().await?;
        self.check_volume(volume).await?;

        let mut errs = Vec::with_capacity(paths.len());
        for path in paths {
            let res = match self.get_object_path(volume, path) {
                Ok(p) => fs::remove_file(&p).await.map_err(to_file_error),
                Err(e) => Err(e),
            };
            errs.push(res.err());
        }

        Ok(errs)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn read_metadata(&self, volume: &str, path: &str) -> Result<FileInfo> {
        let data = self
            .read_all(volume, &path_join_buf(&[path, STORAGE_FORMAT_FILE]))
            .await?;
        read_file_info(&data)
    }

    #[tracing::instrument(level = "debug", skip(self, fi))]
    async fn write_metadata(&self, volume: &str, path: &str, fi: FileInfo) -> Result<()> {
        self.check_root().await?;
        self.check_volume(volume).await?;

        let data = serde_json::to_vec(&fi)?;
        let dst = self.get_object_path(volume, &path_join_buf(&[path, STORAGE_FORMAT_FILE]))?;
        self.write_atomic(&dst, &data).await
    }
}

fn read_file_info(data: &[u8]) -> Result<FileInfo> {
    serde_json::from_slice::<FileInfo>(data).map_err(|e| {
        debug!("decode {STORAGE_FORMAT_FILE} failed: {e}");
        DiskError::FileCorrupt
    })
}

/// One entry of a scanned directory. An object directory that also has
/// subdirectories yields both kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WalkItem {
    Object(String),
    Prefix(String),
}

impl WalkItem {
    fn name(&self) -> &str {
        match self {
            WalkItem::Object(name) | WalkItem::Prefix(name) => name,
        }
    }
}

/// List the children of `dir` (relative to the volume, empty or ending in `/`).
async fn scan_dir(volume_dir: &Path, dir: &str) -> Result<VecDeque<WalkItem>> {
    let entries = match os::read_dir(volume_dir.join(dir), -1).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(e) => return Err(to_file_error(e)),
    };

    let mut items = Vec::new();
    for entry in entries {
        if !entry.ends_with(SLASH_SEPARATOR) {
            continue;
        }
        let name = entry.trim_end_matches(SLASH_SEPARATOR);
        let full = format!("{dir}{name}");

        let children = match os::read_dir(volume_dir.join(&full), -1).await {
            Ok(children) => children,
            Err(e) => {
                debug!("scan {full} skipped: {e}");
                continue;
            }
        };

        if children.iter().any(|c| c == STORAGE_FORMAT_FILE) {
            items.push(WalkItem::Object(full.clone()));
        }
        if children.iter().any(|c| c.ends_with(SLASH_SEPARATOR)) {
            items.push(WalkItem::Prefix(format!("{full}{SLASH_SEPARATOR}")));
        }
    }

    items.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(items.into())
}

/// Depth-first walk feeding `tx` in lexical order until done or the receiver goes away.
async fn walk_volume(volume_dir: PathBuf, opts: WalkDirOptions, tx: mpsc::Sender<FileInfo>) -> Result<()> {
    let WalkDirOptions {
        bucket,
        prefix,
        marker,
        recursive,
        ..
    } = opts;

    let base_dir = base_dir_from_prefix(&prefix);
    let mut stack = vec![scan_dir(&volume_dir, &base_dir).await?];

    while let Some(level) = stack.last_mut() {
        let Some(item) = level.pop_front() else {
            stack.pop();
            continue;
        };

        match item {
            WalkItem::Object(name) => {
                if !name.starts_with(&prefix) || name <= marker {
                    continue;
                }

                let meta_path = volume_dir.join(&name).join(STORAGE_FORMAT_FILE);
                let mut fi = match fs::read(&meta_path).await {
                    Ok(data) => match read_file_info(&data) {
                        Ok(fi) => fi,
                        Err(e) => {
                            warn!("walk {bucket}/{name}: {e}");
                            continue;
                        }
                    },
                    // Removed while walking.
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(to_file_error(e)),
                };

                fi.volume = bucket.clone();
                fi.name = name;
                fi.is_dir = false;
                fi.quorum = fi.erasure.data_blocks;

                if tx.send(fi).await.is_err() {
                    return Ok(());
                }
            }
            WalkItem::Prefix(name) => {
                if !(name.starts_with(&prefix) || prefix.starts_with(&name)) {
                    continue;
                }

                if recursive {
                    // Every name below `name` sorts before the marker.
                    if marker.as_str() > name.as_str() && !marker.starts_with(&name) {
                        continue;
                    }
                    stack.push(scan_dir(&volume_dir, &name).await?);
                } else if name.starts_with(&prefix) && name > marker {
                    if tx.send(FileInfo::new_dir(&bucket, &name)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    debug!("walk of {bucket} under {prefix:?} finished");
    Ok(())
}
