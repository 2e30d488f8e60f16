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

#![allow(dead_code)]

use rustfs_ecstore::config::EcConfig;
use rustfs_ecstore::endpoints::PoolEndpoints;
use rustfs_ecstore::sets::Sets;
use rustfs_ecstore::store_api::{BucketOperations, MakeBucketOptions, ObjectIO, ObjectOptions, PutObjReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fast retries, and no background reconnects or janitor passes during a test.
pub fn test_config() -> EcConfig {
    EcConfig {
        monitor_interval: Duration::from_secs(3600),
        quorum_retry_interval: Duration::from_millis(20),
        stale_uploads_cleanup_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

/// A pool of directory-backed drives under one temp dir.
pub struct Cluster {
    pub dir: TempDir,
    pub paths: Vec<PathBuf>,
    pub per_set: usize,
}

impl Cluster {
    pub fn new(drives: usize, per_set: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..drives).map(|i| dir.path().join(format!("disk{i}"))).collect();
        for p in &paths {
            std::fs::create_dir_all(p).unwrap();
        }
        Self { dir, paths, per_set }
    }

    pub fn pool(&self) -> PoolEndpoints {
        let vols: Vec<String> = self.paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
        PoolEndpoints::from_volumes(&vols, self.per_set).unwrap()
    }

    pub async fn start(&self) -> Arc<Sets> {
        Sets::new(self.pool(), test_config()).await.unwrap()
    }

    pub fn flat(&self, set: usize, slot: usize) -> usize {
        set * self.per_set + slot
    }

    /// Make drive `i` unreachable; [`Cluster::bring_back`] undoes it.
    pub fn take_offline(&self, i: usize) {
        std::fs::rename(&self.paths[i], away(&self.paths[i])).unwrap();
    }

    pub fn bring_back(&self, i: usize) {
        std::fs::rename(away(&self.paths[i]), &self.paths[i]).unwrap();
    }

    /// Replace drive `i` with an empty one.
    pub fn wipe(&self, i: usize) {
        if self.paths[i].exists() {
            std::fs::remove_dir_all(&self.paths[i]).unwrap();
        }
        std::fs::create_dir_all(&self.paths[i]).unwrap();
    }
}

fn away(p: &Path) -> PathBuf {
    p.with_extension("offline")
}

pub async fn create_bucket(sets: &Sets, bucket: &str) {
    sets.make_bucket(bucket, &MakeBucketOptions::default())
        .await
        .expect("create test bucket");
}

pub async fn upload(sets: &Sets, bucket: &str, object: &str, data: &[u8]) {
    let mut reader = PutObjReader::from_vec(data.to_vec());
    sets.put_object(bucket, object, &mut reader, &ObjectOptions::default())
        .await
        .expect("upload test object");
}

pub async fn download(sets: &Sets, bucket: &str, object: &str) -> Vec<u8> {
    let mut reader = sets
        .get_object_reader(bucket, object, &ObjectOptions::default())
        .await
        .expect("open test object");
    reader.read_all().await.expect("read test object")
}
