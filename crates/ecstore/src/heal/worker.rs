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

use crate::error::{Error, Result, StorageError};
use crate::sets::Sets;
use crate::store_api::HealOperations;
use rustfs_common::heal_channel::{HealItemType, HealRequest, HealTaskReceiver};
use std::sync::Weak;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drain `rx` one request at a time until `cancel` fires or the sets are gone.
pub fn spawn_heal_worker(sets: Weak<Sets>, mut rx: HealTaskReceiver, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let req = tokio::select! {
                _ = cancel.cancelled() => break,
                req = rx.recv() => match req {
                    Some(req) => req,
                    None => break,
                },
            };

            let Some(store) = sets.upgrade() else {
                req.respond(false, Some("storage is shutting down".to_owned()));
                break;
            };

            debug!("healing {} ({})", req.path(), req.item_type);
            let res = handle_heal_request(&store, &req).await;
            drop(store);

            match res {
                Ok(()) => req.respond(true, None),
                Err(e) => {
                    warn!("heal {} ({}) failed: {e}", req.path(), req.item_type);
                    req.respond(false, Some(e.to_string()));
                }
            }
        }
        info!("heal worker stopped");
    })
}

pub async fn handle_heal_request(sets: &Sets, req: &HealRequest) -> Result<()> {
    match req.item_type {
        HealItemType::Metadata => match sets.heal_format(req.opts.dry_run).await? {
            (_, Some(Error::NoHealRequired)) => {
                debug!("drive formats already consistent");
                Ok(())
            }
            (item, _) => {
                info!("format heal changed {} drive(s)", item.changed_drives().len());
                Ok(())
            }
        },
        HealItemType::Bucket => sets.heal_bucket(&req.bucket, &req.opts).await.map(|_| ()),
        HealItemType::Object => sets.heal_object(&req.bucket, &req.object, &req.opts).await.map(|_| ()),
        HealItemType::BucketMetadata => Err(StorageError::NotImplemented),
    }
}
