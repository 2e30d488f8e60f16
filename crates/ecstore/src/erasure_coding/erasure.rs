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

//! Reed-Solomon coding of whole object parts.
//!
//! A part of `n` bytes is zero-padded to `data_shards * shard_size` bytes and
//! cut into `data_shards` equal shards, followed by `parity_shards` parity
//! shards of the same size. Shards are indexed from 0 here; on disk they are
//! numbered from 1.

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;
use std::io;
use tracing::warn;

pub struct ReedSolomonEncoder {
    data_shards: usize,
    parity_shards: usize,
    // Reused across calls; the coders reset themselves for a new shard size.
    encoder_cache: std::sync::RwLock<Option<reed_solomon_simd::ReedSolomonEncoder>>,
    decoder_cache: std::sync::RwLock<Option<reed_solomon_simd::ReedSolomonDecoder>>,
}

impl Clone for ReedSolomonEncoder {
    fn clone(&self) -> Self {
        Self {
            data_shards: self.data_shards,
            parity_shards: self.parity_shards,
            encoder_cache: std::sync::RwLock::new(None),
            decoder_cache: std::sync::RwLock::new(None),
        }
    }
}

impl std::fmt::Debug for ReedSolomonEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomonEncoder")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

impl ReedSolomonEncoder {
    pub fn new(data_shards: usize, parity_shards: usize) -> io::Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(io::Error::other(format!(
                "invalid reed-solomon layout {data_shards}+{parity_shards}"
            )));
        }

        Ok(ReedSolomonEncoder {
            data_shards,
            parity_shards,
            encoder_cache: std::sync::RwLock::new(None),
            decoder_cache: std::sync::RwLock::new(None),
        })
    }

    /// Fill the parity shards from the data shards, in place.
    pub fn encode(&self, shards: SmallVec<[&mut [u8]; 16]>) -> io::Result<()> {
        let mut shards_vec: Vec<&mut [u8]> = shards.into_vec();
        if shards_vec.is_empty() {
            return Ok(());
        }

        self.encode_with_simd(&mut shards_vec).inspect_err(|e| {
            warn!("SIMD encoding failed: {}", e);
        })
    }

    fn encode_with_simd(&self, shards_vec: &mut [&mut [u8]]) -> io::Result<()> {
        let shard_len = shards_vec[0].len();

        let mut encoder = {
            let mut cache_guard = self
                .encoder_cache
                .write()
                .map_err(|_| io::Error::other("Failed to acquire encoder cache lock"))?;

            match cache_guard.take() {
                Some(mut cached_encoder) => {
                    if let Err(e) = cached_encoder.reset(self.data_shards, self.parity_shards, shard_len) {
                        warn!("Failed to reset SIMD encoder: {:?}, creating new one", e);
                        reed_solomon_simd::ReedSolomonEncoder::new(self.data_shards, self.parity_shards, shard_len)
                            .map_err(|e| io::Error::other(format!("Failed to create SIMD encoder: {e:?}")))?
                    } else {
                        cached_encoder
                    }
                }
                None => reed_solomon_simd::ReedSolomonEncoder::new(self.data_shards, self.parity_shards, shard_len)
                    .map_err(|e| io::Error::other(format!("Failed to create SIMD encoder: {e:?}")))?,
            }
        };

        for (i, shard) in shards_vec.iter().enumerate().take(self.data_shards) {
            encoder
                .add_original_shard(shard)
                .map_err(|e| io::Error::other(format!("Failed to add shard {i}: {e:?}")))?;
        }

        let result = encoder
            .encode()
            .map_err(|e| io::Error::other(format!("SIMD encoding failed: {e:?}")))?;

        for (i, recovery_shard) in result.recovery_iter().enumerate() {
            if i + self.data_shards < shards_vec.len() {
                shards_vec[i + self.data_shards].copy_from_slice(recovery_shard);
            }
        }

        // The encoder is reusable once the result is gone.
        drop(result);

        *self
            .encoder_cache
            .write()
            .map_err(|_| io::Error::other("Failed to return encoder to cache"))? = Some(encoder);

        Ok(())
    }

    /// Restore the missing data shards. Missing parity shards stay `None`.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> io::Result<()> {
        self.reconstruct_with_simd(shards).inspect_err(|e| {
            warn!("SIMD reconstruction failed: {}", e);
        })
    }

    fn reconstruct_with_simd(&self, shards: &mut [Option<Vec<u8>>]) -> io::Result<()> {
        let shard_len = shards
            .iter()
            .find_map(|s| s.as_ref().map(|v| v.len()))
            .ok_or_else(|| io::Error::other("No valid shards found for reconstruction"))?;

        let mut decoder = {
            let mut cache_guard = self
                .decoder_cache
                .write()
                .map_err(|_| io::Error::other("Failed to acquire decoder cache lock"))?;

            match cache_guard.take() {
                Some(mut cached_decoder) => {
                    if let Err(e) = cached_decoder.reset(self.data_shards, self.parity_shards, shard_len) {
                        warn!("Failed to reset SIMD decoder: {:?}, creating new one", e);
                        reed_solomon_simd::ReedSolomonDecoder::new(self.data_shards, self.parity_shards, shard_len)
                            .map_err(|e| io::Error::other(format!("Failed to create SIMD decoder: {e:?}")))?
                    } else {
                        cached_decoder
                    }
                }
                None => reed_solomon_simd::ReedSolomonDecoder::new(self.data_shards, self.parity_shards, shard_len)
                    .map_err(|e| io::Error::other(format!("Failed to create SIMD decoder: {e:?}")))?,
            }
        };

        for (i, shard_opt) in shards.iter().enumerate() {
            if let Some(shard) = shard_opt {
                if i < self.data_shards {
                    decoder
                        .add_original_shard(i, shard)
                        .map_err(|e| io::Error::other(format!("Failed to add original shard for reconstruction: {e:?}")))?;
                } else {
                    decoder
                        .add_recovery_shard(i - self.data_shards, shard)
                        .map_err(|e| io::Error::other(format!("Failed to add recovery shard for reconstruction: {e:?}")))?;
                }
            }
        }

        let result = decoder
            .decode()
            .map_err(|e| io::Error::other(format!("SIMD decode error: {e:?}")))?;

        for (restored_index, restored_data) in result.restored_original_iter() {
            if let Some(slot) = shards.get_mut(restored_index) {
                if slot.is_none() {
                    *slot = Some(restored_data.to_vec());
                }
            }
        }

        drop(result);

        *self
            .decoder_cache
            .write()
            .map_err(|_| io::Error::other("Failed to return decoder to cache"))? = Some(decoder);

        Ok(())
    }
}

/// Shard size for `block_size` bytes split over `data_shards`, rounded up to an even length.
pub fn calc_shard_size(block_size: usize, data_shards: usize) -> usize {
    (block_size.div_ceil(data_shards) + 1) & !1
}

/// Erasure layout of one object: how many data and parity shards a part is cut into.
#[derive(Debug, Clone)]
pub struct Erasure {
    pub data_shards: usize,
    pub parity_shards: usize,
    encoder: Option<ReedSolomonEncoder>,
}

impl Erasure {
    pub fn new(data_shards: usize, parity_shards: usize) -> io::Result<Self> {
        if data_shards == 0 {
            return Err(io::Error::other("erasure layout needs at least one data shard"));
        }

        let encoder = if parity_shards > 0 {
            Some(ReedSolomonEncoder::new(data_shards, parity_shards)?)
        } else {
            None
        };

        Ok(Erasure {
            data_shards,
            parity_shards,
            encoder,
        })
    }

    pub fn total_shard_count(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Cut `data` into data shards and compute parity. Empty input yields empty shards.
    #[tracing::instrument(level = "debug", skip_all, fields(data_len = data.len()))]
    pub fn encode_data(&self, data: &[u8]) -> io::Result<Vec<Bytes>> {
        if data.is_empty() {
            return Ok(vec![Bytes::new(); self.total_shard_count()]);
        }

        let per_shard_size = calc_shard_size(data.len(), self.data_shards);
        let need_total_size = per_shard_size * self.total_shard_count();

        let mut data_buffer = BytesMut::with_capacity(need_total_size);
        data_buffer.extend_from_slice(data);
        data_buffer.resize(need_total_size, 0u8);

        if let Some(encoder) = self.encoder.as_ref() {
            let slices: SmallVec<[&mut [u8]; 16]> = data_buffer.chunks_exact_mut(per_shard_size).collect();
            encoder.encode(slices)?;
        }

        // All shards share the one buffer.
        let mut data_buffer = data_buffer.freeze();
        let mut shards = Vec::with_capacity(self.total_shard_count());
        for _ in 0..self.total_shard_count() {
            shards.push(data_buffer.split_to(per_shard_size));
        }

        Ok(shards)
    }

    /// Restore the missing data shards in place. Needs at least `data_shards` present shards.
    pub fn decode_data(&self, shards: &mut [Option<Vec<u8>>]) -> io::Result<()> {
        if shards.iter().take(self.data_shards).all(Option::is_some) {
            return Ok(());
        }

        let present = shards.iter().filter(|s| s.is_some()).count();
        if present < self.data_shards {
            return Err(io::Error::other(format!(
                "not enough shards to decode: have {present}, need {}",
                self.data_shards
            )));
        }

        match self.encoder.as_ref() {
            Some(encoder) => encoder.reconstruct(shards),
            None => Err(io::Error::other("missing data shard without parity")),
        }
    }

    /// Decode and concatenate the data shards, trimmed to `size` bytes.
    pub fn join_data(&self, shards: &mut [Option<Vec<u8>>], size: usize) -> io::Result<Bytes> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        self.decode_data(shards)?;

        let mut out = BytesMut::with_capacity(size);
        for shard in shards.iter().take(self.data_shards) {
            match shard {
                Some(s) => out.extend_from_slice(s),
                None => return Err(io::Error::other("data shard missing after decode")),
            }
        }

        if out.len() < size {
            return Err(io::Error::other(format!("decoded {} bytes, expected {size}", out.len())));
        }
        out.truncate(size);
        Ok(out.freeze())
    }

    /// Rebuild every shard, parity included, from whatever is present.
    pub fn reconstruct_all(&self, shards: &mut [Option<Vec<u8>>], size: usize) -> io::Result<Vec<Bytes>> {
        let data = self.join_data(shards, size)?;
        self.encode_data(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_calc_shard_size() {
        assert_eq!(calc_shard_size(5, 4), 2);
        assert_eq!(calc_shard_size(8, 4), 2);
        assert_eq!(calc_shard_size(9, 4), 4);
        assert_eq!(calc_shard_size(1024 * 1024, 12), 87382);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let erasure = Erasure::new(4, 2).unwrap();
        let data = sample(3000);

        let encoded = erasure.encode_data(&data).unwrap();
        assert_eq!(encoded.len(), 6);

        let mut shards: Vec<Option<Vec<u8>>> = encoded.iter().map(|s| Some(s.to_vec())).collect();
        shards[0] = None;
        shards[3] = None;

        let joined = erasure.join_data(&mut shards, data.len()).unwrap();
        assert_eq!(joined.as_ref(), data.as_slice());
    }

    #[test]
    fn test_reconstruct_all_restores_parity() {
        let erasure = Erasure::new(2, 2).unwrap();
        let data = sample(1025);
        let encoded = erasure.encode_data(&data).unwrap();

        let mut shards: Vec<Option<Vec<u8>>> = encoded.iter().map(|s| Some(s.to_vec())).collect();
        shards[1] = None;
        shards[2] = None;

        let rebuilt = erasure.reconstruct_all(&mut shards, data.len()).unwrap();
        assert_eq!(rebuilt, encoded);
    }

    #[test]
    fn test_decode_needs_enough_shards() {
        let erasure = Erasure::new(4, 2).unwrap();
        let encoded = erasure.encode_data(&sample(100)).unwrap();

        let mut shards: Vec<Option<Vec<u8>>> = encoded.iter().map(|s| Some(s.to_vec())).collect();
        shards[0] = None;
        shards[1] = None;
        shards[2] = None;
        assert!(erasure.decode_data(&mut shards).is_err());
    }

    #[test]
    fn test_no_parity_and_empty_input() {
        let erasure = Erasure::new(1, 0).unwrap();
        let encoded = erasure.encode_data(b"abc").unwrap();
        assert_eq!(encoded.len(), 1);

        let empty = Erasure::new(2, 2).unwrap().encode_data(&[]).unwrap();
        assert_eq!(empty.len(), 4);
        assert!(empty.iter().all(|s| s.is_empty()));

        assert!(Erasure::new(0, 2).is_err());
    }
}
