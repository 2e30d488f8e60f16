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

use common::{create_bucket, Cluster};
use rustfs_ecstore::store_api::{BucketOperations, MakeBucketOptions};
use tracing::info;

#[tokio::test]
async fn failed_make_bucket_leaves_no_trace() {
    let cluster = Cluster::new(16, 4);
    let sets = cluster.start().await;

    let lost = [cluster.flat(2, 0), cluster.flat(2, 3)];
    for &i in &lost {
        cluster.take_offline(i);
    }

    let err = sets
        .make_bucket("rollback", &MakeBucketOptions::default())
        .await
        .unwrap_err();
    info!("make_bucket failed as expected: {err}");
    assert!(err.is_write_quorum_err());

    for (i, path) in cluster.paths.iter().enumerate() {
        if lost.contains(&i) {
            continue;
        }
        assert!(!path.join("rollback").exists(), "drive {i} kept the bucket");
    }
    assert!(sets.get_bucket_info("rollback").await.is_err());
    assert!(sets.list_bucket().await.unwrap().is_empty());

    // with every drive back the same bucket can be created
    for &i in &lost {
        cluster.bring_back(i);
    }
    create_bucket(&sets, "rollback").await;
    for path in &cluster.paths {
        assert!(path.join("rollback").is_dir());
    }

    sets.shutdown().await;
}
