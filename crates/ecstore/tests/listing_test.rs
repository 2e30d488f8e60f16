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

use common::{create_bucket, upload, Cluster};
use rustfs_ecstore::store_api::{HealOperations, ListOperations};

fn names(loi: &rustfs_ecstore::store_api::ListObjectsInfo) -> Vec<&str> {
    loi.objects.iter().map(|o| o.name.as_str()).collect()
}

#[tokio::test]
async fn under_replicated_objects_only_show_in_heal_listings() {
    let cluster = Cluster::new(4, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "listing").await;
    upload(&sets, "listing", "kept", b"on every drive").await;
    upload(&sets, "listing", "orphan", b"soon on one drive").await;

    for path in &cluster.paths[1..] {
        std::fs::remove_dir_all(path.join("listing").join("orphan")).unwrap();
    }

    let loi = sets.list_objects("listing", "", None, None, 100).await.unwrap();
    assert_eq!(names(&loi), vec!["kept"]);

    let loi = sets.list_objects_heal("listing", "", None, None, 100).await.unwrap();
    assert_eq!(names(&loi), vec!["orphan"]);

    sets.shutdown().await;
}

#[tokio::test]
async fn a_stale_minority_copy_does_not_win() {
    let cluster = Cluster::new(4, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "listing").await;

    let meta = cluster.paths[0].join("listing").join("doc").join("xl.meta");
    upload(&sets, "listing", "doc", b"old").await;
    let stale = std::fs::read(&meta).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    upload(&sets, "listing", "doc", b"newer!").await;
    std::fs::write(&meta, stale).unwrap();

    let loi = sets.list_objects("listing", "", None, None, 100).await.unwrap();
    assert_eq!(names(&loi), vec!["doc"]);
    assert_eq!(loi.objects[0].size, 6);

    // three of four drives agree, so the object still needs healing
    let loi = sets.list_objects_heal("listing", "", None, None, 100).await.unwrap();
    assert_eq!(names(&loi), vec!["doc"]);

    sets.shutdown().await;
}

#[tokio::test]
async fn listings_merge_every_set() {
    let cluster = Cluster::new(16, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "listing").await;

    let mut expected: Vec<String> = (0..40).map(|i| format!("k{i:03}")).collect();
    for name in &expected {
        upload(&sets, "listing", name, b"v").await;
    }
    expected.sort();

    let mut seen = Vec::new();
    let mut marker = None;
    loop {
        let loi = sets.list_objects("listing", "", marker, None, 7).await.unwrap();
        seen.extend(loi.objects.iter().map(|o| o.name.clone()));
        if !loi.is_truncated {
            break;
        }
        marker = loi.next_marker;
    }
    assert_eq!(seen, expected);

    let loi = sets.list_objects("listing", "k01", None, None, 100).await.unwrap();
    assert_eq!(loi.objects.len(), 10);

    sets.shutdown().await;
}
