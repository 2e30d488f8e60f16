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

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;

pub const STANDARD: &str = "STANDARD";

pub const STANDARD_ENV: &str = "RUSTFS_STORAGE_CLASS_STANDARD";

pub const SCHEME_PREFIX: &str = "EC";

/// Parity used when nothing is configured, by drives per set.
pub fn default_parity_count(drive: usize) -> usize {
    match drive {
        1 => 0,
        2 | 3 => 1,
        4 | 5 => 2,
        6 | 7 => 3,
        _ => 4,
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StorageClass {
    pub parity: usize,
}

/// Parse a storage class of the form `EC:<parity>`.
pub fn parse_storage_class(env: &str) -> Result<StorageClass> {
    let s: Vec<&str> = env.split(':').collect();

    // only two elements allowed in the string - "scheme" and "number of parity drives"
    if s.len() != 2 {
        return Err(Error::other(format!(
            "Invalid storage class format: {env}. Expected 'Scheme:Number of parity drives'."
        )));
    }

    if s[0] != SCHEME_PREFIX {
        return Err(Error::other(format!("Unsupported scheme {}. Supported scheme is EC.", s[0])));
    }

    let parity_drives: usize = match s[1].parse() {
        Ok(num) => num,
        Err(_) => return Err(Error::other(format!("Failed to parse parity value: {}.", s[1]))),
    };

    Ok(StorageClass { parity: parity_drives })
}

/// Parity may not exceed half the set.
pub fn validate_parity(ss_parity: usize, set_drive_count: usize) -> Result<()> {
    if ss_parity > set_drive_count / 2 {
        return Err(Error::other(format!(
            "parity {} should be less than or equal to {}",
            ss_parity,
            set_drive_count / 2
        )));
    }

    Ok(())
}

/// Standard-class parity: the explicit value, else `RUSTFS_STORAGE_CLASS_STANDARD`, else the default.
pub fn lookup_standard_parity(explicit: Option<usize>, set_drive_count: usize) -> Result<usize> {
    let parity = match explicit {
        Some(p) => p,
        None => match env::var(STANDARD_ENV) {
            Ok(s) if !s.is_empty() => parse_storage_class(&s)?.parity,
            _ => default_parity_count(set_drive_count),
        },
    };

    validate_parity(parity, set_drive_count)?;
    Ok(parity)
}
