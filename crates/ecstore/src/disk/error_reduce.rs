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

//! Quorum reduction over per-disk results.
//!
//! Every fan-out call produces one `Option<DiskError>` per disk (`None` is
//! success). These helpers collapse that vector into a single verdict.

use super::error::Error;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Errors that do not count against object operations.
pub static OBJECT_OP_IGNORED_ERRS: &[Error] = &[
    Error::DiskNotFound,
    Error::FaultyDisk,
    Error::DiskAccessDenied,
    Error::UnformattedDisk,
];

/// Errors that do not count against bucket operations.
pub static BUCKET_OP_IGNORED_ERRS: &[Error] = &[
    Error::DiskNotFound,
    Error::FaultyDisk,
    Error::DiskAccessDenied,
    Error::UnformattedDisk,
];

pub static BASE_IGNORED_ERRS: &[Error] = &[Error::DiskNotFound, Error::FaultyDisk];

pub fn reduce_write_quorum_errs(errors: &[Option<Error>], ignored_errs: &[Error], quorum: usize) -> Option<Error> {
    reduce_quorum_errs(errors, ignored_errs, quorum, Error::ErasureWriteQuorum)
}

pub fn reduce_read_quorum_errs(errors: &[Option<Error>], ignored_errs: &[Error], quorum: usize) -> Option<Error> {
    reduce_quorum_errs(errors, ignored_errs, quorum, Error::ErasureReadQuorum)
}

/// The most common outcome wins if at least `quorum` disks agree on it,
/// otherwise `quorum_err`.
pub fn reduce_quorum_errs(errors: &[Option<Error>], ignored_errs: &[Error], quorum: usize, quorum_err: Error) -> Option<Error> {
    let (max_count, err) = reduce_errs(errors, ignored_errs);
    if max_count >= quorum { err } else { Some(quorum_err) }
}

/// Returns the most frequent outcome and its count. Success wins ties.
pub fn reduce_errs(errors: &[Option<Error>], ignored_errs: &[Error]) -> (usize, Option<Error>) {
    let mut counts: HashMap<Option<Error>, usize> = HashMap::new();
    for err in errors {
        if let Some(e) = err {
            if is_ignored_err(ignored_errs, e) {
                continue;
            }
        }
        *counts.entry(err.clone()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(e1, c1), (e2, c2)| {
            c1.cmp(c2).then_with(|| match (e1, e2) {
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => b.to_string().cmp(&a.to_string()),
                (None, None) => Ordering::Equal,
            })
        })
        .map(|(err, count)| (count, err))
        .unwrap_or((0, None))
}

pub fn is_ignored_err(ignored_errs: &[Error], err: &Error) -> bool {
    ignored_errs.iter().any(|e| e == err)
}

pub fn count_errs(errors: &[Option<Error>], err: &Error) -> usize {
    errors.iter().filter(|&e| e.as_ref() == Some(err)).count()
}

pub fn count_successes(errors: &[Option<Error>]) -> usize {
    errors.iter().filter(|e| e.is_none()).count()
}

pub fn is_all_buckets_not_found(errs: &[Option<Error>]) -> bool {
    if errs.is_empty() {
        return false;
    }

    errs.iter()
        .all(|err| matches!(err, Some(Error::DiskNotFound) | Some(Error::VolumeNotFound)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_io(msg: &str) -> Error {
        Error::Io(std::io::Error::other(msg))
    }

    #[test]
    fn test_reduce_errs_basic() {
        let e1 = err_io("a");
        let e2 = err_io("b");
        let errors = vec![Some(e1.clone()), Some(e1.clone()), Some(e2.clone()), None];
        let (count, err) = reduce_errs(&errors, &[]);
        assert_eq!(count, 2);
        assert_eq!(err, Some(e1));
    }

    #[test]
    fn test_reduce_errs_ignored() {
        let e1 = err_io("a");
        let e2 = err_io("b");
        let errors = vec![Some(e1.clone()), Some(e2.clone()), Some(e1.clone()), Some(e2.clone()), None];
        let (count, err) = reduce_errs(&errors, &[e2.clone()]);
        assert_eq!(count, 2);
        assert_eq!(err, Some(e1));
    }

    #[test]
    fn test_reduce_errs_success_wins_tie() {
        let e1 = err_io("a");
        let errors = vec![Some(e1.clone()), None, Some(e1.clone()), None];
        let (count, err) = reduce_errs(&errors, &[]);
        assert_eq!(count, 2);
        assert_eq!(err, None);
    }

    #[test]
    fn test_reduce_errs_empty() {
        assert_eq!(reduce_errs(&[], &[]), (0, None));
    }

    #[test]
    fn test_reduce_quorum_errs() {
        let e1 = err_io("a");
        let e2 = err_io("b");
        let errors = vec![Some(e1.clone()), Some(e1.clone()), Some(e2.clone()), None];
        let res = reduce_quorum_errs(&errors, &[], 2, Error::FaultyDisk);
        assert_eq!(res, Some(e1));
        let res = reduce_quorum_errs(&errors, &[], 3, Error::FaultyDisk);
        assert_eq!(res, Some(Error::FaultyDisk));
    }

    #[test]
    fn test_offline_disks_do_not_count_toward_write_quorum() {
        // Two successes out of four, the rest offline: quorum of three is not met.
        let errors = vec![None, None, Some(Error::DiskNotFound), Some(Error::DiskNotFound)];
        assert_eq!(
            reduce_write_quorum_errs(&errors, BUCKET_OP_IGNORED_ERRS, 3),
            Some(Error::ErasureWriteQuorum)
        );
        assert_eq!(reduce_write_quorum_errs(&errors, BUCKET_OP_IGNORED_ERRS, 2), None);
    }

    #[test]
    fn test_read_quorum_returns_agreed_error() {
        let errors = vec![
            Some(Error::FileNotFound),
            Some(Error::FileNotFound),
            Some(Error::FileNotFound),
            None,
        ];
        assert_eq!(
            reduce_read_quorum_errs(&errors, OBJECT_OP_IGNORED_ERRS, 2),
            Some(Error::FileNotFound)
        );
    }

    #[test]
    fn test_count_errs() {
        let e1 = err_io("a");
        let e2 = err_io("b");
        let errors = vec![Some(e1.clone()), Some(e2.clone()), Some(e1.clone()), None];
        assert_eq!(count_errs(&errors, &e1), 2);
        assert_eq!(count_errs(&errors, &e2), 1);
        assert_eq!(count_successes(&errors), 1);
    }

    #[test]
    fn test_is_all_buckets_not_found() {
        assert!(!is_all_buckets_not_found(&[]));
        assert!(is_all_buckets_not_found(&[Some(Error::VolumeNotFound), Some(Error::DiskNotFound)]));
        assert!(!is_all_buckets_not_found(&[Some(Error::VolumeNotFound), None]));
    }
}
