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

use crate::disk::endpoint::Endpoint;
use crate::topology::DiskCoord;
use std::collections::HashSet;
use std::io::{Error, Result};
use tracing::{info, warn};

/// Supported erasure set sizes.
const SET_SIZES: [usize; 15] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

/// Smallest set size picked automatically.
const MIN_AUTO_SET_SIZE: usize = 4;

/// list of same type of endpoint.
#[derive(Debug, Default, Clone)]
pub struct Endpoints(Vec<Endpoint>);

impl AsRef<Vec<Endpoint>> for Endpoints {
    fn as_ref(&self) -> &Vec<Endpoint> {
        &self.0
    }
}

impl From<Vec<Endpoint>> for Endpoints {
    fn from(v: Vec<Endpoint>) -> Self {
        Self(v)
    }
}

impl<T: AsRef<str>> TryFrom<&[T]> for Endpoints {
    type Error = Error;

    /// returns new endpoint list based on input args.
    fn try_from(args: &[T]) -> Result<Self> {
        let mut endpoint_type = None;
        let mut schema = None;
        let mut endpoints = Vec::with_capacity(args.len());
        let mut uniq_set = HashSet::with_capacity(args.len());

        for (i, arg) in args.iter().enumerate() {
            let endpoint = match Endpoint::try_from(arg.as_ref()) {
                Ok(ep) => ep,
                Err(e) => return Err(Error::other(format!("'{}': {}", arg.as_ref(), e))),
            };

            // All endpoints have to be same type and scheme if applicable.
            if i == 0 {
                endpoint_type = Some(endpoint.get_type());
                schema = Some(endpoint.url.scheme().to_owned());
            } else if Some(endpoint.get_type()) != endpoint_type {
                return Err(Error::other("mixed style endpoints are not supported"));
            } else if Some(endpoint.url.scheme()) != schema.as_deref() {
                return Err(Error::other("mixed scheme is not supported"));
            }

            let endpoint_str = endpoint.to_string();
            if !uniq_set.insert(endpoint_str) {
                return Err(Error::other("duplicate endpoints found"));
            }

            endpoints.push(endpoint);
        }

        Ok(Endpoints(endpoints))
    }
}

impl Endpoints {
    pub fn into_inner(self) -> Vec<Endpoint> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter()
    }

    /// returns endpoint string of i-th endpoint (0-based), and empty string for invalid indexes.
    pub fn get_string(&self, i: usize) -> String {
        self.0.get(i).map(|ep| ep.to_string()).unwrap_or_default()
    }
}

/// The single pool of endpoints this server runs on, split into equal sets.
#[derive(Debug, Clone)]
pub struct PoolEndpoints {
    pub endpoints: Endpoints,
    pub set_count: usize,
    pub drives_per_set: usize,
    pub cmd_line: String,
}

impl PoolEndpoints {
    /// Lay `volumes` out into erasure sets. `set_drive_count` of zero picks a size automatically.
    pub fn from_volumes<T: AsRef<str>>(volumes: &[T], set_drive_count: usize) -> Result<Self> {
        if volumes.is_empty() {
            return Err(Error::other("no volumes provided"));
        }

        let endpoints = Endpoints::try_from(volumes)?;
        let cmd_line = volumes.iter().map(|v| v.as_ref()).collect::<Vec<_>>().join(" ");
        Self::new(endpoints, set_drive_count, cmd_line)
    }

    pub fn new(endpoints: Endpoints, set_drive_count: usize, cmd_line: String) -> Result<Self> {
        let total = endpoints.len();
        let drives_per_set = pick_set_drive_count(total, set_drive_count)?;
        let set_count = total / drives_per_set;

        let mut eps = endpoints.into_inner();
        for (flat, ep) in eps.iter_mut().enumerate() {
            let coord = DiskCoord::from_flat(flat, drives_per_set);
            ep.set_pool_index(0);
            ep.set_set_index(coord.set.0);
            ep.set_disk_index(coord.slot.0);
        }

        info!("erasure layout: {set_count} set(s) of {drives_per_set} drive(s)");

        Ok(Self {
            endpoints: eps.into(),
            set_count,
            drives_per_set,
            cmd_line,
        })
    }

    pub fn total_drives(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoint_at(&self, coord: DiskCoord) -> Option<&Endpoint> {
        self.endpoints.as_ref().get(coord.to_flat(self.drives_per_set))
    }

    /// Endpoints of one set, in slot order.
    pub fn set_endpoints(&self, set_idx: usize) -> &[Endpoint] {
        let start = set_idx * self.drives_per_set;
        let end = (start + self.drives_per_set).min(self.endpoints.len());
        self.endpoints.as_ref().get(start..end).unwrap_or_default()
    }
}

fn possible_set_counts(total: usize) -> Vec<usize> {
    SET_SIZES.iter().copied().filter(|s| total % s == 0).collect()
}

/// checks whether given count is a valid set size for erasure coding.
fn is_valid_set_size(count: usize) -> bool {
    count >= SET_SIZES[0] && count <= SET_SIZES[SET_SIZES.len() - 1]
}

fn pick_set_drive_count(total: usize, requested: usize) -> Result<usize> {
    if total == 0 {
        return Err(Error::other("Incorrect number of endpoints provided, size 0"));
    }

    let candidates = possible_set_counts(total);

    if requested > 0 {
        if is_valid_set_size(requested) && candidates.contains(&requested) {
            return Ok(requested);
        }
        warn!(
            "invalid set drive count {requested}. Acceptable values for {total} number drives are {:?}",
            candidates
        );
    }

    if total < MIN_AUTO_SET_SIZE {
        return Ok(total);
    }

    candidates
        .into_iter()
        .filter(|&s| s >= MIN_AUTO_SET_SIZE)
        .max()
        .ok_or_else(|| {
            Error::other(format!(
                "Incorrect number of endpoints provided, number of drives {total} is not divisible by any supported erasure set sizes {SET_SIZES:?}"
            ))
        })
}
