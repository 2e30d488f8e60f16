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

use clap::Parser;

pub const ENV_VOLUMES: &str = "RUSTFS_VOLUMES";
pub const ENV_SET_DRIVE_COUNT: &str = "RUSTFS_ERASURE_SET_DRIVE_COUNT";
pub const ENV_PARITY: &str = "RUSTFS_STORAGE_CLASS_PARITY";

#[derive(Debug, Parser)]
#[command(version, about = "Erasure-coded object storage")]
pub struct Opt {
    /// DIR points to a directory on a filesystem.
    #[arg(required = true, env = ENV_VOLUMES, value_delimiter = ' ')]
    pub volumes: Vec<String>,

    /// Drives per erasure set, 0 picks the largest size that divides the drive count.
    #[arg(long, env = ENV_SET_DRIVE_COUNT, default_value_t = 0)]
    pub set_drive_count: usize,

    /// Parity drives per set for the standard storage class.
    #[arg(long, env = ENV_PARITY)]
    pub parity: Option<usize>,
}
