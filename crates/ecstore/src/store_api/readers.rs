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

use super::*;
use md5::{Digest, Md5};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Payload of a put. The whole body is held in memory and erasure coded at once.
pub struct PutObjReader {
    data: Bytes,
}

impl Debug for PutObjReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjReader").field("size", &self.data.len()).finish()
    }
}

impl PutObjReader {
    pub fn new(data: Bytes) -> Self {
        PutObjReader { data }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Hex MD5 of the payload, used as the etag.
    pub fn md5_hex(&self) -> String {
        hex_simd::encode_to_string(Md5::digest(&self.data), hex_simd::AsciiCase::Lower)
    }
}

pub struct GetObjectReader {
    pub stream: Box<dyn AsyncRead + Unpin + Send + Sync>,
    pub object_info: ObjectInfo,
}

impl Debug for GetObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectReader")
            .field("object_info", &self.object_info)
            .finish()
    }
}

impl GetObjectReader {
    pub fn new(data: Bytes, object_info: ObjectInfo) -> Self {
        GetObjectReader {
            stream: Box::new(Cursor::new(data)),
            object_info,
        }
    }

    pub async fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.object_info.size.max(0) as usize);
        self.stream.read_to_end(&mut buf).await.map_err(Error::from)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_reader_md5() {
        let r = PutObjReader::from_vec(b"hello".to_vec());
        assert_eq!(r.size(), 5);
        assert_eq!(r.md5_hex(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_get_reader_reads_everything() {
        let oi = ObjectInfo {
            size: 3,
            ..Default::default()
        };
        let mut r = GetObjectReader::new(Bytes::from_static(b"abc"), oi);
        assert_eq!(r.read_all().await.unwrap(), b"abc");
    }
}
