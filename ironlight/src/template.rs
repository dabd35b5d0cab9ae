/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::errors::ConfigError;

pub const NONCE_SIZE: usize = 4;

const PREV_ID_SIZE: usize = 32;
const HEADER_VARINTS: usize = 3;

/// A block hashing blob with a 4-byte little-endian nonce at `nonce_offset`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockTemplate {
    blob: Vec<u8>,
    nonce_offset: usize,
}

impl BlockTemplate {
    pub fn new(blob: Vec<u8>, nonce_offset: usize) -> Result<Self, ConfigError> {
        if nonce_offset
            .checked_add(NONCE_SIZE)
            .map_or(true, |end| end > blob.len())
        {
            return Err(ConfigError::MalformedTemplate {
                offset: nonce_offset,
                blob_len: blob.len(),
            });
        }

        Ok(Self { blob, nonce_offset })
    }

    /// Locates the nonce of a Monero-style hashing blob: it follows the
    /// major version, minor version and timestamp varints and the 32-byte
    /// previous block id.
    pub fn from_hashing_blob(blob: Vec<u8>) -> Result<Self, ConfigError> {
        let mut offset = 0;
        for _ in 0..HEADER_VARINTS {
            offset = skip_varint(&blob, offset)?;
        }
        let nonce_offset = offset + PREV_ID_SIZE;

        Self::new(blob, nonce_offset)
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn nonce_offset(&self) -> usize {
        self.nonce_offset
    }

    pub fn nonce(&self) -> u32 {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&self.blob[self.nonce_range()]);
        u32::from_le_bytes(nonce)
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        let range = self.nonce_range();
        self.blob[range].copy_from_slice(&nonce.to_le_bytes());
    }

    /// Copy of the blob with `nonce` written in.
    pub fn with_nonce(&self, nonce: u32) -> Vec<u8> {
        let mut blob = self.blob.clone();
        blob[self.nonce_range()].copy_from_slice(&nonce.to_le_bytes());
        blob
    }

    pub fn into_blob(self) -> Vec<u8> {
        self.blob
    }

    fn nonce_range(&self) -> std::ops::Range<usize> {
        self.nonce_offset..self.nonce_offset + NONCE_SIZE
    }
}

/// Returns the offset right after the varint starting at `offset`.
fn skip_varint(blob: &[u8], mut offset: usize) -> Result<usize, ConfigError> {
    loop {
        let byte = *blob
            .get(offset)
            .ok_or(ConfigError::TruncatedHashingBlob { offset })?;
        offset += 1;
        if byte & 0x80 == 0 {
            return Ok(offset);
        }
    }
}
