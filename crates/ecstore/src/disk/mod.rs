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

pub mod endpoint;
pub mod error;
pub mod error_reduce;
pub mod format;
pub mod local;
pub mod os;

pub const RUSTFS_META_BUCKET: &str = ".rustfs.sys";
pub const RUSTFS_META_MULTIPART_BUCKET: &str = ".rustfs.sys/multipart";
pub const RUSTFS_META_TMP_BUCKET: &str = ".rustfs.sys/tmp";
pub const FORMAT_CONFIG_FILE: &str = "format.json";
pub const STORAGE_FORMAT_FILE: &str = "xl.meta";

use crate::fileinfo::FileInfo;
use bytes::Bytes;
use endpoint::Endpoint;
use error::{DiskError, Result};
use local::LocalDisk;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, path::PathBuf, sync::Arc};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type DiskStore = Arc<dyn DiskAPI>;

/// Open a handle for `ep`. Only local drives are served by this build.
pub async fn new_disk(ep: &Endpoint, opt: &DiskOption) -> Result<DiskStore> {
    if ep.is_local {
        let s = LocalDisk::new(ep, opt).await?;
        Ok(Arc::new(s))
    } else {
        Err(DiskError::other(format!("remote drive {ep} is not supported")))
    }
}

/// Storage operations on one physical drive.
#[async_trait::async_trait]
pub trait DiskAPI: Debug + Send + Sync + 'static {
    fn to_string(&self) -> String;
    fn is_local(&self) -> bool;
    fn host_name(&self) -> String;
    fn endpoint(&self) -> Endpoint;
    fn path(&self) -> PathBuf;

    async fn is_online(&self) -> bool;
    async fn close(&self) -> Result<()>;
    async fn get_disk_id(&self) -> Result<Option<Uuid>>;
    async fn set_disk_id(&self, id: Option<Uuid>) -> Result<()>;
    async fn disk_info(&self) -> Result<DiskInfo>;

    // Volume operations.
    async fn make_volume(&self, volume: &str) -> Result<()>;
    async fn make_volumes(&self, volumes: Vec<&str>) -> Result<()>;
    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;
    async fn stat_volume(&self, volume: &str) -> Result<VolumeInfo>;
    async fn delete_volume(&self, volume: &str, force: bool) -> Result<()>;

    /// Lazily stream the objects under `opts.bucket` in lexical order.
    async fn walk(&self, opts: WalkDirOptions) -> Result<mpsc::Receiver<FileInfo>>;

    // File operations.
    /// Entries of a directory; subdirectories carry a trailing `/`. `count` < 0 means all.
    async fn list_dir(&self, volume: &str, dir_path: &str, count: i32) -> Result<Vec<String>>;
    async fn read_all(&self, volume: &str, path: &str) -> Result<Bytes>;
    async fn write_all(&self, volume: &str, path: &str, data: Bytes) -> Result<()>;
    async fn rename_file(&self, src_volume: &str, src_path: &str, dst_volume: &str, dst_path: &str) -> Result<()>;
    async fn delete(&self, volume: &str, path: &str, opt: DeleteOptions) -> Result<()>;
    async fn delete_bulk(&self, volume: &str, paths: &[String]) -> Result<Vec<Option<DiskError>>>;

    // Metadata operations
    async fn read_metadata(&self, volume: &str, path: &str) -> Result<FileInfo>;
    async fn write_metadata(&self, volume: &str, path: &str, fi: FileInfo) -> Result<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskInfo {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_inodes: u64,
    pub free_inodes: u64,
    pub major: u64,
    pub minor: u64,
    pub root_disk: bool,
    pub healing: bool,
    pub endpoint: String,
    pub mount_path: String,
    pub id: Option<Uuid>,
    pub error: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WalkDirOptions {
    // Bucket to walk
    pub bucket: String,

    // Only names with this prefix are returned.
    pub prefix: String,

    // Only names sorting strictly after the marker are returned.
    pub marker: String,

    // Do a full recursive scan.
    pub recursive: bool,

    // Capacity of the result channel. Zero uses the default.
    pub channel_size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DiskOption {
    pub cleanup: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VolumeInfo {
    pub name: String,
    pub created: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_disk_local_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        let ep = Endpoint::try_from(dir.path().to_str().unwrap()).unwrap();
        let disk = new_disk(&ep, &DiskOption::default()).await.unwrap();
        assert!(disk.is_local());
        assert!(disk.is_online().await);
        assert_eq!(disk.path(), dir.path().to_path_buf());

        let remote = Endpoint::try_from("http://node2:9000/data").unwrap();
        assert!(new_disk(&remote, &DiskOption::default()).await.is_err());
    }
}
