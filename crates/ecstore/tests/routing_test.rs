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

mod common;

use common::{create_bucket, download, upload, Cluster};
use rustfs_ecstore::disk::format::DistributionAlgo;
use rustfs_ecstore::sets::hash_key;
use rustfs_ecstore::store_api::{ObjectLayer, ObjectOperations, ObjectOptions};
use tracing::info;

#[tokio::test]
async fn objects_live_only_on_their_hashed_set() {
    let cluster = Cluster::new(16, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "routing").await;
    assert_eq!(sets.set_drive_counts(), vec![4; 4]);

    let names: Vec<String> = (0..24).map(|i| format!("dir-{}/object-{i}", i % 3)).collect();
    for name in &names {
        upload(&sets, "routing", name, name.as_bytes()).await;
    }

    for name in &names {
        let set = hash_key(DistributionAlgo::CrcMod, name, sets.set_count);
        assert!(set >= 0);
        let set = set as usize;
        info!("{name} -> set {set}");

        for (i, path) in cluster.paths.iter().enumerate() {
            let present = path.join("routing").join(name).join("xl.meta").exists();
            assert_eq!(present, i / 4 == set, "{name} on drive {i}");
        }

        assert_eq!(download(&sets, "routing", name).await, name.as_bytes());
    }

    // deletes route the same way
    let gone = &names[0];
    sets.delete_object("routing", gone, ObjectOptions::default()).await.unwrap();
    for path in &cluster.paths {
        assert!(!path.join("routing").join(gone).join("xl.meta").exists());
    }
    assert!(sets
        .get_object_info("routing", gone, &ObjectOptions::default())
        .await
        .is_err());

    sets.shutdown().await;
}

#[tokio::test]
async fn bucket_name_does_not_change_the_set() {
    let cluster = Cluster::new(16, 4);
    let sets = cluster.start().await;
    let buckets = ["alpha", "beta-bucket", "gamma.photos"];
    for bucket in buckets {
        create_bucket(&sets, bucket).await;
    }

    for name in ["shared/name.txt", "a", "deep/nested/key.bin"] {
        let mut holders = Vec::new();
        for bucket in buckets {
            upload(&sets, bucket, name, bucket.as_bytes()).await;
            let drives: Vec<usize> = cluster
                .paths
                .iter()
                .enumerate()
                .filter(|(_, p)| p.join(bucket).join(name).join("xl.meta").exists())
                .map(|(i, _)| i)
                .collect();
            assert_eq!(drives.len(), 4, "{bucket}/{name}");
            holders.push(drives);
        }
        assert!(holders.windows(2).all(|w| w[0] == w[1]), "{name} moved with the bucket: {holders:?}");

        for bucket in buckets {
            assert_eq!(download(&sets, bucket, name).await, bucket.as_bytes());
        }
    }

    sets.shutdown().await;
}
