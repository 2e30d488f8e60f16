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

//! Per-set namespace locks keyed by `(bucket, object)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockTable = Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>;

#[derive(Debug, Default, Clone)]
pub struct NsLockMap {
    locks: LockTable,
}

enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Held lock on one resource. The table entry is dropped with the last holder.
pub struct NsLockGuard {
    table: LockTable,
    resource: String,
    held: Option<Held>,
}

impl std::fmt::Debug for NsLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.held {
            Some(Held::Read(_)) => "read",
            Some(Held::Write(_)) => "write",
            None => "released",
        };
        f.debug_struct("NsLockGuard")
            .field("resource", &self.resource)
            .field("mode", &mode)
            .finish()
    }
}

fn resource_key(bucket: &str, object: &str) -> String {
    format!("{bucket}/{object}")
}

impl NsLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, resource: &str) -> Arc<RwLock<()>> {
        let mut table = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(resource.to_owned()).or_default().clone()
    }

    pub async fn read(&self, bucket: &str, object: &str) -> NsLockGuard {
        let resource = resource_key(bucket, object);
        let guard = self.entry(&resource).read_owned().await;
        NsLockGuard {
            table: self.locks.clone(),
            resource,
            held: Some(Held::Read(guard)),
        }
    }

    pub async fn write(&self, bucket: &str, object: &str) -> NsLockGuard {
        let resource = resource_key(bucket, object);
        let guard = self.entry(&resource).write_owned().await;
        NsLockGuard {
            table: self.locks.clone(),
            resource,
            held: Some(Held::Write(guard)),
        }
    }

    /// Number of resources with a holder or a waiter.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for NsLockGuard {
    fn drop(&mut self) {
        self.held.take();

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // the table holds the only remaining reference when nobody waits on it
        let idle = table.get(&self.resource).is_some_and(|l| Arc::strong_count(l) == 1);
        if idle {
            table.remove(&self.resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_readers_share_writers_exclude() {
        let locks = NsLockMap::new();

        let r1 = locks.read("bucket", "obj").await;
        let r2 = tokio::time::timeout(Duration::from_millis(100), locks.read("bucket", "obj"))
            .await
            .unwrap();

        assert!(tokio::time::timeout(Duration::from_millis(50), locks.write("bucket", "obj"))
            .await
            .is_err());

        drop(r1);
        drop(r2);
        let w = tokio::time::timeout(Duration::from_millis(100), locks.write("bucket", "obj"))
            .await
            .unwrap();

        // other resources are independent
        let _other = tokio::time::timeout(Duration::from_millis(100), locks.write("bucket", "other"))
            .await
            .unwrap();
        drop(w);
    }

    #[tokio::test]
    async fn test_entries_are_removed_after_release() {
        let locks = NsLockMap::new();
        {
            let _a = locks.write("b", "a").await;
            let _c = locks.read("b", "c").await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = NsLockMap::new();
        let held = locks.write("b", "o").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.write("b", "o").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert!(!locks.is_empty() || waiter.is_finished());
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
