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
use rustfs_common::heal_channel::DriveState;
use rustfs_ecstore::disk::format::OFFLINE_DISK_UUID;
use rustfs_ecstore::disk::{FORMAT_CONFIG_FILE, RUSTFS_META_BUCKET};
use rustfs_ecstore::error::StorageError;
use rustfs_ecstore::store_api::{HealOperations, ObjectLayer};
use rustfs_ecstore::topology::DiskCoord;
use std::collections::HashSet;
use tracing::info;

#[tokio::test]
async fn replaced_drive_is_formatted_and_swapped_in() {
    let cluster = Cluster::new(16, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "heal").await;
    upload(&sets, "heal", "payload", b"survives a drive swap").await;

    let coord = DiskCoord::new(2, 3);
    let replaced = cluster.flat(2, 3);
    let before = sets.topology().format().await;

    std::fs::remove_dir_all(&cluster.paths[replaced]).unwrap();
    let info = sets.storage_info().await;
    assert_eq!(info.disk_counts(), (15, 1));
    assert_eq!(info.disks[replaced].state, DriveState::Offline.to_string());

    // a blank drive goes back into the same slot
    std::fs::create_dir_all(&cluster.paths[replaced]).unwrap();
    let format_file = cluster.paths[replaced].join(RUSTFS_META_BUCKET).join(FORMAT_CONFIG_FILE);

    let (item, err) = sets.heal_format(true).await.unwrap();
    assert!(err.is_none());
    assert_eq!(item.before.drives[replaced].state, DriveState::Missing.to_string());
    assert!(!format_file.exists(), "dry run wrote a format");

    let (item, err) = sets.heal_format(false).await.unwrap();
    assert!(err.is_none());
    info!("healed drives: {:?}", item.changed_drives());
    assert_eq!(item.after.drives[replaced].state, DriveState::Ok.to_string());
    assert!(format_file.exists());

    let after = sets.topology().format().await;
    let new_id = after.erasure.sets[2][3];
    assert_ne!(new_id, before.erasure.sets[2][3]);
    assert_eq!(item.after.drives[replaced].uuid, new_id.to_string());

    let all: Vec<_> = after.erasure.sets.iter().flatten().copied().collect();
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), all.len());
    assert!(!all.contains(&OFFLINE_DISK_UUID));
    for set in 0..4 {
        for slot in 0..4 {
            if (set, slot) != (2, 3) {
                assert_eq!(after.erasure.sets[set][slot], before.erasure.sets[set][slot]);
            }
        }
    }

    assert!(sets.topology().disk_at(coord).await.is_some());
    assert_eq!(sets.storage_info().await.disk_counts(), (16, 0));
    assert_eq!(download(&sets, "heal", "payload").await, b"survives a drive swap");

    let (_, err) = sets.heal_format(false).await.unwrap();
    assert!(matches!(err, Some(StorageError::NoHealRequired)));

    sets.shutdown().await;
}

#[tokio::test]
async fn reload_format_keeps_the_layout() {
    let cluster = Cluster::new(8, 4);
    let sets = cluster.start().await;
    let before = sets.topology().format().await;

    sets.reload_format(true).await.unwrap();
    sets.reload_format(false).await.unwrap();

    let after = sets.topology().format().await;
    assert_eq!(after.erasure.sets, before.erasure.sets);
    assert_eq!(sets.storage_info().await.disk_counts(), (8, 0));
    sets.shutdown().await;
}

#[tokio::test]
async fn remounted_drive_keeps_its_slot() {
    let cluster = Cluster::new(4, 4);
    let sets = cluster.start().await;
    create_bucket(&sets, "heal").await;
    upload(&sets, "heal", "payload", b"moved drives").await;
    let before = sets.topology().format().await;
    sets.shutdown().await;

    // drive 0 dies, drive 3 is remounted where drive 0 was and a blank drive goes in at 3
    std::fs::remove_dir_all(&cluster.paths[0]).unwrap();
    std::fs::rename(&cluster.paths[3], &cluster.paths[0]).unwrap();
    std::fs::create_dir_all(&cluster.paths[3]).unwrap();

    let sets = cluster.start().await;
    // the background healer may have won the race, both outcomes are fine
    let (_, err) = sets.heal_format(false).await.unwrap();
    assert!(err.is_none() || matches!(err, Some(StorageError::NoHealRequired)));

    let after = sets.topology().format().await;
    assert_eq!(after.erasure.sets[0][3], before.erasure.sets[0][3]);
    assert_eq!(after.erasure.sets[0][1..3], before.erasure.sets[0][1..3]);
    assert_ne!(after.erasure.sets[0][0], before.erasure.sets[0][0]);
    assert!(!after.erasure.sets[0].contains(&OFFLINE_DISK_UUID));

    for slot in 0..4 {
        assert!(sets.topology().disk_at(DiskCoord::new(0, slot)).await.is_some(), "slot {slot} empty");
    }
    assert_eq!(sets.storage_info().await.disk_counts(), (4, 0));
    assert_eq!(download(&sets, "heal", "payload").await, b"moved drives");

    sets.shutdown().await;
}
