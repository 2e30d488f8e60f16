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

//! Erasure-set storage core.
//!
//! [`sets::Sets`] routes every request to one of several erasure sets by
//! hashing the object name, fans bucket operations out to all of them and
//! merges per-drive walks into one quorum-checked listing. The drive table
//! lives in [`topology::Topology`] and is kept populated by the
//! [`monitor::ConnectionMonitor`] and by format healing.

pub mod bucket;
pub mod config;
pub mod connection;
pub mod disk;
pub mod endpoints;
pub mod erasure_coding;
pub mod error;
pub mod fileinfo;
pub mod heal;
pub mod list;
pub mod monitor;
pub mod ns_lock;
pub mod set_disk;
pub mod sets;
pub mod store_api;
pub mod store_init;
pub mod store_list_objects;
pub mod topology;

pub use error::{Error, Result, StorageError};
pub use sets::Sets;
pub use store_api::ObjectLayer;
