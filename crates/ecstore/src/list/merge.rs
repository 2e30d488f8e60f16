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

//! Lexical merge of per-drive walks into one quorum-filtered listing.

use crate::fileinfo::FileInfo;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// One drive's walk with a single look-ahead slot.
#[derive(Debug)]
pub struct FileInfoCh {
    rx: Option<mpsc::Receiver<FileInfo>>,
    peeked: Option<FileInfo>,
}

impl FileInfoCh {
    pub fn new(rx: mpsc::Receiver<FileInfo>) -> Self {
        Self {
            rx: Some(rx),
            peeked: None,
        }
    }

    /// Fill the slot if it is empty. `None` once the walk is exhausted.
    async fn peek(&mut self) -> Option<&FileInfo> {
        if self.peeked.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match rx.recv().await {
                    Some(fi) => self.peeked = Some(fi),
                    None => self.rx = None,
                }
            }
        }
        self.peeked.as_ref()
    }

    fn take(&mut self) -> Option<FileInfo> {
        self.peeked.take()
    }
}

#[derive(Debug)]
pub struct MergeWalker {
    chans: Vec<FileInfoCh>,
    drives_per_set: usize,
    heal: bool,
    pending: Option<FileInfo>,
}

impl MergeWalker {
    pub fn new(chans: Vec<FileInfoCh>, drives_per_set: usize, heal: bool) -> Self {
        Self {
            chans,
            drives_per_set,
            heal,
            pending: None,
        }
    }

    /// Return an entry already produced by [`MergeWalker::next`] so the next
    /// call yields it again.
    pub fn push_back(&mut self, fi: FileInfo) {
        self.pending = Some(fi);
    }

    /// The next entry that passes the quorum filter, in lexical order.
    pub async fn next(&mut self) -> Option<FileInfo> {
        if let Some(fi) = self.pending.take() {
            return Some(fi);
        }

        loop {
            let (fi, count) = self.lexically_least().await?;

            if fi.is_dir {
                return Some(fi);
            }

            if self.heal {
                // identical on every drive of its set: nothing to heal
                if count < self.drives_per_set {
                    return Some(fi);
                }
                continue;
            }

            let threshold = if fi.quorum > 0 { fi.quorum } else { self.drives_per_set / 2 };
            if count >= threshold {
                return Some(fi);
            }
        }
    }

    /// Consume every peek carrying the least name and report how many agreed
    /// on the winning modification time.
    async fn lexically_least(&mut self) -> Option<(FileInfo, usize)> {
        let mut least: Option<String> = None;
        for ch in self.chans.iter_mut() {
            if let Some(fi) = ch.peek().await {
                if least.as_ref().is_none_or(|l| fi.name < *l) {
                    least = Some(fi.name.clone());
                }
            }
        }
        let least = least?;

        let mut votes: HashMap<Option<OffsetDateTime>, usize> = HashMap::new();
        for ch in self.chans.iter() {
            if let Some(fi) = ch.peeked.as_ref().filter(|fi| fi.name == least) {
                *votes.entry(fi.mod_time).or_default() += 1;
            }
        }

        // most common mod time, later one on ties
        let (mod_time, count) = votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))?;

        let mut chosen = None;
        for ch in self.chans.iter_mut() {
            if ch.peeked.as_ref().is_some_and(|fi| fi.name == least) {
                if let Some(fi) = ch.take() {
                    if chosen.is_none() && fi.mod_time == mod_time {
                        chosen = Some(fi);
                    }
                }
            }
        }

        chosen.map(|fi| (fi, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, ts: i64, quorum: usize) -> FileInfo {
        FileInfo {
            name: name.to_owned(),
            mod_time: Some(OffsetDateTime::from_unix_timestamp(ts).unwrap()),
            quorum,
            ..Default::default()
        }
    }

    async fn chan(items: Vec<FileInfo>) -> FileInfoCh {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for fi in items {
            tx.send(fi).await.unwrap();
        }
        FileInfoCh::new(rx)
    }

    async fn drain(mut walker: MergeWalker) -> Vec<(String, Option<OffsetDateTime>)> {
        let mut out = Vec::new();
        while let Some(fi) = walker.next().await {
            out.push((fi.name, fi.mod_time));
        }
        out
    }

    #[tokio::test]
    async fn test_merge_orders_and_dedups() {
        let chans = vec![
            chan(vec![object("a", 1, 0), object("c", 1, 0)]).await,
            chan(vec![object("a", 1, 0), object("b", 1, 0), object("c", 1, 0)]).await,
            chan(vec![object("b", 1, 0), object("c", 1, 0)]).await,
            chan(vec![FileInfo::new_dir("bucket", "d/")]).await,
        ];
        let names: Vec<String> = drain(MergeWalker::new(chans, 4, false)).await.into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["a", "b", "c", "d/"]);
    }

    #[tokio::test]
    async fn test_quorum_hint_wins() {
        let chans = vec![
            chan(vec![object("a", 1, 3), object("b", 1, 0)]).await,
            chan(vec![object("a", 1, 3), object("b", 1, 0)]).await,
            chan(vec![]).await,
            chan(vec![]).await,
        ];
        let names: Vec<String> = drain(MergeWalker::new(chans, 4, false)).await.into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_minority_mtime_is_dropped_and_majority_kept() {
        let chans = vec![
            chan(vec![object("a", 1, 2)]).await,
            chan(vec![object("a", 1, 2)]).await,
            chan(vec![object("a", 1, 2)]).await,
            chan(vec![object("a", 9, 2), object("z", 9, 2)]).await,
        ];
        let out = drain(MergeWalker::new(chans, 4, false)).await;
        assert_eq!(out, vec![("a".to_owned(), Some(OffsetDateTime::from_unix_timestamp(1).unwrap()))]);
    }

    #[tokio::test]
    async fn test_heal_mode_inverts_filter() {
        let chans = vec![
            chan(vec![object("a", 1, 2), object("b", 1, 2)]).await,
            chan(vec![object("a", 1, 2), object("b", 1, 2)]).await,
            chan(vec![object("a", 1, 2), object("b", 2, 2)]).await,
            chan(vec![object("a", 1, 2)]).await,
        ];
        let names: Vec<String> = drain(MergeWalker::new(chans, 4, true)).await.into_iter().map(|e| e.0).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_merge_is_independent_of_drive_order() {
        let sets = vec![
            vec![object("a", 1, 2), object("b", 3, 2), object("c", 1, 2)],
            vec![object("a", 1, 2), object("b", 4, 2), object("c", 1, 2)],
            vec![object("a", 2, 2), object("b", 4, 2)],
            vec![object("b", 3, 2), object("c", 1, 2)],
        ];

        let mut first = None;
        for rotation in 0..sets.len() {
            let mut chans = Vec::new();
            for i in 0..sets.len() {
                chans.push(chan(sets[(i + rotation) % sets.len()].clone()).await);
            }
            let out = drain(MergeWalker::new(chans, 4, false)).await;
            match &first {
                None => first = Some(out),
                Some(want) => assert_eq!(&out, want),
            }
        }
        // b ties 2:2 between mtimes 3 and 4, the later one wins
        let out = first.unwrap();
        assert_eq!(out[1], ("b".to_owned(), Some(OffsetDateTime::from_unix_timestamp(4).unwrap())));
    }

    #[tokio::test]
    async fn test_push_back() {
        let chans = vec![chan(vec![object("a", 1, 1), object("b", 1, 1)]).await];
        let mut walker = MergeWalker::new(chans, 1, false);
        let a = walker.next().await.unwrap();
        walker.push_back(a);
        assert_eq!(walker.next().await.unwrap().name, "a");
        assert_eq!(walker.next().await.unwrap().name, "b");
        assert!(walker.next().await.is_none());
    }
}
