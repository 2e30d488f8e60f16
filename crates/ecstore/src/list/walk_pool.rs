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

use super::merge::MergeWalker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// Identifies a listing that can be resumed: the next page asks with the
/// marker the previous page ended on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalkParams {
    pub bucket: String,
    pub recursive: bool,
    pub marker: String,
    pub prefix: String,
    pub heal: bool,
}

/// Parked merge walks, waiting for their next page.
#[derive(Debug)]
pub struct WalkPool {
    idle_timeout: Duration,
    walks: Mutex<HashMap<WalkParams, Vec<(MergeWalker, Instant)>>>,
}

impl WalkPool {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            walks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the most recently parked walk for `params`, if one is still fresh.
    pub fn release(&self, params: &WalkParams) -> Option<MergeWalker> {
        let mut walks = self.walks.lock().unwrap_or_else(|e| e.into_inner());
        self.purge(&mut walks);

        let list = walks.get_mut(params)?;
        let walker = list.pop().map(|(w, _)| w);
        if list.is_empty() {
            walks.remove(params);
        }
        walker
    }

    /// Park `walker` so a request with `params` can resume it.
    pub fn set(&self, params: WalkParams, walker: MergeWalker) {
        let mut walks = self.walks.lock().unwrap_or_else(|e| e.into_inner());
        self.purge(&mut walks);
        walks.entry(params).or_default().push((walker, Instant::now()));
    }

    /// Drop every walk parked longer than the idle timeout.
    pub fn sweep(&self) {
        let mut walks = self.walks.lock().unwrap_or_else(|e| e.into_inner());
        self.purge(&mut walks);
    }

    /// Sweep on a timer so abandoned listings release their drive walks
    /// even when no other listing comes along.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let period = (self.idle_timeout / 2).max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        let Some(pool) = pool.upgrade() else { break };
                        pool.sweep();
                    }
                }
            }
            debug!("walk pool sweeper stopped");
        })
    }

    pub fn len(&self) -> usize {
        let walks = self.walks.lock().unwrap_or_else(|e| e.into_inner());
        walks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Dropping a walker closes its channels, which stops the drive walks.
    fn purge(&self, walks: &mut HashMap<WalkParams, Vec<(MergeWalker, Instant)>>) {
        let timeout = self.idle_timeout;
        walks.retain(|params, list| {
            let before = list.len();
            list.retain(|(_, parked)| parked.elapsed() < timeout);
            if list.len() < before {
                debug!("dropped {} idle walk(s) of {}", before - list.len(), params.bucket);
            }
            !list.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(marker: &str) -> WalkParams {
        WalkParams {
            bucket: "bucket".to_owned(),
            recursive: true,
            marker: marker.to_owned(),
            prefix: String::new(),
            heal: false,
        }
    }

    #[test]
    fn test_set_and_release() {
        let pool = WalkPool::new(Duration::from_secs(60));
        pool.set(params("m"), MergeWalker::new(Vec::new(), 4, false));
        assert_eq!(pool.len(), 1);

        assert!(pool.release(&params("other")).is_none());
        assert!(pool.release(&params("m")).is_some());
        assert!(pool.release(&params("m")).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_idle_walks_expire() {
        let pool = WalkPool::new(Duration::ZERO);
        pool.set(params("m"), MergeWalker::new(Vec::new(), 4, false));
        assert!(pool.release(&params("m")).is_none());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_drops_abandoned_walks() {
        let pool = Arc::new(WalkPool::new(Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let sweeper = pool.spawn_sweeper(cancel.clone());

        pool.set(params("m"), MergeWalker::new(Vec::new(), 4, false));
        assert_eq!(pool.len(), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(pool.is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_keeps_fresh_walks() {
        let pool = Arc::new(WalkPool::new(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let sweeper = pool.spawn_sweeper(cancel.clone());

        pool.set(params("m"), MergeWalker::new(Vec::new(), 4, false));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pool.len(), 1);

        cancel.cancel();
        sweeper.await.unwrap();
    }
}
