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
use crate::fileinfo::{FileInfo, ObjectPartInfo, CONTENT_TYPE_KEY, ETAG_KEY};
use bytes::Bytes;
use rustfs_common::heal_channel::HealOpts;
use rustfs_madmin::heal_commands::HealResultItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use time::OffsetDateTime;

mod readers;
mod traits;
mod types;

pub use readers::*;
pub use traits::*;
pub use types::*;
