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

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealItemType {
    Metadata,
    Bucket,
    BucketMetadata,
    Object,
}

impl HealItemType {
    pub fn to_str(&self) -> &str {
        match self {
            HealItemType::Metadata => "metadata",
            HealItemType::Bucket => "bucket",
            HealItemType::BucketMetadata => "bucket-metadata",
            HealItemType::Object => "object",
        }
    }
}

impl Display for HealItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Per-drive state reported by storage info and heal results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveState {
    Ok,
    Offline,
    Corrupt,
    Missing,
    PermissionDenied,
    Faulty,
    RootMount,
    Unknown,
    Unformatted, // only returned by disk
}

impl DriveState {
    pub fn to_str(&self) -> &str {
        match self {
            DriveState::Ok => "ok",
            DriveState::Offline => "offline",
            DriveState::Corrupt => "corrupt",
            DriveState::Missing => "missing",
            DriveState::PermissionDenied => "permission-denied",
            DriveState::Faulty => "faulty",
            DriveState::RootMount => "root-mount",
            DriveState::Unknown => "unknown",
            DriveState::Unformatted => "unformatted",
        }
    }
}

impl Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealScanMode {
    Unknown,
    #[default]
    Normal,
    Deep,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealOpts {
    pub recursive: bool,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub remove: bool,
    pub recreate: bool,
    #[serde(rename = "scanMode")]
    pub scan_mode: HealScanMode,
    #[serde(rename = "nolock")]
    pub no_lock: bool,
    #[serde(rename = "set", default)]
    pub set: Option<usize>,
}

/// A unit of heal work: `(path, item type, options)` plus an optional reply slot.
#[derive(Debug)]
pub struct HealRequest {
    pub id: String,
    pub bucket: String,
    pub object: String,
    pub item_type: HealItemType,
    pub opts: HealOpts,
    pub respond_to: Option<oneshot::Sender<HealResponse>>,
}

impl HealRequest {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>, item_type: HealItemType, opts: HealOpts) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bucket: bucket.into(),
            object: object.into(),
            item_type,
            opts,
            respond_to: None,
        }
    }

    /// `bucket/object`, or just the bucket for bucket-level items.
    pub fn path(&self) -> String {
        if self.object.is_empty() {
            self.bucket.clone()
        } else {
            format!("{}/{}", self.bucket, self.object)
        }
    }

    /// Answer the submitter, if it is still waiting.
    pub fn respond(self, success: bool, error: Option<String>) {
        if let Some(tx) = self.respond_to {
            let _ = tx.send(HealResponse {
                request_id: self.id,
                success,
                error,
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealResponse {
    pub request_id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HealQueueError {
    #[error("heal queue is full")]
    Full,
    #[error("heal queue is closed")]
    Closed,
}

pub type HealTaskReceiver = mpsc::Receiver<HealRequest>;

/// Producer side of the background heal task queue.
///
/// The storage layer only enqueues; a separate heal runner owns the
/// receiver and drains it.
#[derive(Debug, Clone)]
pub struct HealTaskQueue {
    tx: mpsc::Sender<HealRequest>,
}

impl HealTaskQueue {
    pub fn new(capacity: usize) -> (Self, HealTaskReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. Used from hot paths such as listing, where a
    /// full queue simply drops the hint.
    pub fn try_enqueue(&self, req: HealRequest) -> Result<(), HealQueueError> {
        self.tx.try_send(req).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HealQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => HealQueueError::Closed,
        })
    }

    /// Enqueue and hand back a receiver for the heal result.
    pub async fn submit(
        &self,
        bucket: &str,
        object: &str,
        item_type: HealItemType,
        opts: HealOpts,
    ) -> Result<oneshot::Receiver<HealResponse>, HealQueueError> {
        let (tx, rx) = oneshot::channel();
        let mut req = HealRequest::new(bucket, object, item_type, opts);
        req.respond_to = Some(tx);
        self.tx.send(req).await.map_err(|_| HealQueueError::Closed)?;
        Ok(rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_round_trips_through_runner() {
        let (queue, mut rx) = HealTaskQueue::new(4);
        let reply = queue
            .submit("bucket", "a/b.txt", HealItemType::Object, HealOpts::default())
            .await
            .unwrap();

        let req = rx.recv().await.expect("request queued");
        assert_eq!(req.path(), "bucket/a/b.txt");
        assert_eq!(req.item_type, HealItemType::Object);
        let id = req.id.clone();
        req.respond(true, None);

        let resp = reply.await.expect("runner answered");
        assert_eq!(resp.request_id, id);
        assert!(resp.success);
    }

    #[test]
    fn try_enqueue_reports_full_and_closed() {
        let (queue, rx) = HealTaskQueue::new(1);
        queue
            .try_enqueue(HealRequest::new("b", "", HealItemType::Bucket, HealOpts::default()))
            .unwrap();
        let err = queue
            .try_enqueue(HealRequest::new("b", "", HealItemType::Bucket, HealOpts::default()))
            .unwrap_err();
        assert_eq!(err, HealQueueError::Full);

        drop(rx);
        let err = queue
            .try_enqueue(HealRequest::new("b", "", HealItemType::Bucket, HealOpts::default()))
            .unwrap_err();
        assert_eq!(err, HealQueueError::Closed);
        assert!(queue.is_closed());
    }

    #[test]
    fn drive_state_strings() {
        assert_eq!(DriveState::Ok.to_string(), "ok");
        assert_eq!(DriveState::Offline.to_string(), "offline");
        assert_eq!(DriveState::Missing.to_string(), "missing");
        assert_eq!(DriveState::Corrupt.to_string(), "corrupt");
        assert_eq!(HealItemType::Metadata.to_string(), "metadata");
    }
}
