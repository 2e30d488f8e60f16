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

use super::DiskInfo;
use rustix::fs::{major, minor, stat, statvfs};
use std::io::{Error, Result};
use std::path::Path;

/// Capacity of the filesystem holding `p`, counted in fundamental blocks.
pub fn get_info(p: impl AsRef<Path>) -> Result<DiskInfo> {
    let p = p.as_ref();
    let vfs = statvfs(p)?;

    let block = if vfs.f_frsize > 0 { vfs.f_frsize } else { vfs.f_bsize };
    // blocks held back for root are neither free nor part of the usable total
    let reserved = vfs
        .f_bfree
        .checked_sub(vfs.f_bavail)
        .ok_or_else(|| Error::other(format!("{}: more available than free blocks", p.display())))?;
    let usable = vfs
        .f_blocks
        .checked_sub(reserved)
        .ok_or_else(|| Error::other(format!("{}: more reserved than total blocks", p.display())))?;

    let total = usable * block;
    let free = vfs.f_bavail * block;
    let dev = stat(p)?.st_dev;

    Ok(DiskInfo {
        total,
        free,
        used: total.saturating_sub(free),
        files: vfs.f_files,
        ffree: vfs.f_ffree,
        major: major(dev) as u64,
        minor: minor(dev) as u64,
    })
}

/// Both paths live on the same device.
pub fn same_disk(a: &str, b: &str) -> Result<bool> {
    Ok(stat(a)?.st_dev == stat(b)?.st_dev)
}
