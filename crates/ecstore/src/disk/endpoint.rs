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

use super::error::{Error, Result};
use path_absolutize::Absolutize;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::{ParseError, Url};

/// enum for endpoint type.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EndpointType {
    /// path style endpoint type enum.
    Path,

    /// URL style endpoint type enum.
    Url,
}

/// One configured drive location.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Endpoint {
    pub url: Url,
    pub is_local: bool,

    pub pool_idx: i32,
    pub set_idx: i32,
    pub disk_idx: i32,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.url.scheme() == "file" {
            write!(f, "{}", self.get_file_path().display())
        } else {
            write!(f, "{}", self.url)
        }
    }
}

impl TryFrom<&str> for Endpoint {
    type Error = Error;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        if ["", "/", "\\"].iter().any(|&v| v.eq(value)) {
            return Err(Error::other("empty or root endpoint is not supported"));
        }

        let mut is_local = false;
        let url = match Url::parse(value) {
            Ok(mut url) if url.has_host() => {
                // Valid URL style endpoint is http(s)://host[:port]/path with nothing else set.
                if !((url.scheme() == "http" || url.scheme() == "https")
                    && url.username().is_empty()
                    && url.fragment().is_none()
                    && url.query().is_none())
                {
                    return Err(Error::other("invalid URL endpoint format"));
                }

                let path = url.path().to_string();
                let path = Path::new(&path).absolutize()?;

                debug!("endpoint try_from: path={}", path.display());

                if path.parent().is_none() || Path::new("").eq(&path) {
                    return Err(Error::other("empty or root path is not supported in URL endpoint"));
                }

                match path.to_str() {
                    Some(v) => url.set_path(v),
                    None => return Err(Error::InvalidPath),
                }

                url
            }
            Ok(_) => {
                // like d:/foo
                is_local = true;
                url_parse_from_file_path(value)?
            }
            Err(e) => match e {
                ParseError::InvalidPort => {
                    return Err(Error::other("invalid URL endpoint format: port number must be between 1 to 65535"));
                }
                ParseError::EmptyHost => return Err(Error::other("invalid URL endpoint format: empty host name")),
                ParseError::RelativeUrlWithoutBase => {
                    // like /foo
                    is_local = true;
                    url_parse_from_file_path(value)?
                }
                _ => return Err(Error::other(format!("invalid URL endpoint format: {e}"))),
            },
        };

        Ok(Endpoint {
            url,
            is_local,
            pool_idx: -1,
            set_idx: -1,
            disk_idx: -1,
        })
    }
}

impl Endpoint {
    pub fn get_type(&self) -> EndpointType {
        if self.url.scheme() == "file" {
            EndpointType::Path
        } else {
            EndpointType::Url
        }
    }

    pub fn set_pool_index(&mut self, idx: usize) {
        self.pool_idx = idx as i32
    }

    pub fn set_set_index(&mut self, idx: usize) {
        self.set_idx = idx as i32
    }

    pub fn set_disk_index(&mut self, idx: usize) {
        self.disk_idx = idx as i32
    }

    /// `host:port` for URL endpoints, empty for paths.
    pub fn host_port(&self) -> String {
        match (self.url.host(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => format!("{host}"),
            _ => String::new(),
        }
    }

    /// Key used to group drive counts per node in storage info.
    pub fn node_name(&self) -> String {
        match self.get_type() {
            EndpointType::Path => self.to_string(),
            EndpointType::Url => self.host_port(),
        }
    }

    pub fn get_file_path(&self) -> PathBuf {
        if self.url.scheme() == "file" {
            if let Ok(p) = self.url.to_file_path() {
                return p;
            }
        }
        PathBuf::from(self.url.path())
    }
}

/// parse a file path into a URL.
fn url_parse_from_file_path(value: &str) -> Result<Url> {
    // A bare ip:port cannot be told apart from a relative path, so ask for a scheme.
    let head = value.split('/').next().unwrap_or_default();
    if head.parse::<SocketAddr>().is_ok() {
        return Err(Error::other("invalid URL endpoint format: missing scheme http or https"));
    }

    let file_path = match Path::new(value).absolutize() {
        Ok(path) => path,
        Err(err) => return Err(Error::other(format!("absolute path failed: {err}"))),
    };

    Url::from_file_path(file_path).map_err(|_| Error::other("Convert a file path into an URL failed"))
}
