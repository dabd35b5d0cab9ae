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

use blake2b_simd::Params;

pub const BLAKE2B_OUTBYTES: usize = 64;

const GENERATOR_SEED_SIZE: usize = 60;

/// Blake2b producing `out_len` (1..=64) bytes, optionally keyed with up to 64 bytes.
pub fn blake2b(data: &[u8], out_len: usize, key: Option<&[u8]>) -> Vec<u8> {
    let mut params = Params::new();
    params.hash_length(out_len);
    if let Some(key) = key {
        params.key(key);
    }

    params.hash(data).as_bytes().to_vec()
}

/// Variable length Blake2b (H' from Argon2), any output length.
pub fn blake2b_long(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    blake2b_long_into(&[data], &mut out);
    out
}

/// Same as [`blake2b_long`], but hashes the concatenation of `inputs` into `out`.
pub(crate) fn blake2b_long_into(inputs: &[&[u8]], out: &mut [u8]) {
    let out_len = out.len();
    let out_len_bytes = (out_len as u32).to_le_bytes();

    if out_len <= BLAKE2B_OUTBYTES {
        let mut state = Params::new().hash_length(out_len).to_state();
        state.update(&out_len_bytes);
        for input in inputs {
            state.update(input);
        }
        out.copy_from_slice(state.finalize().as_bytes());
        return;
    }

    let half = BLAKE2B_OUTBYTES / 2;
    let mut state = Params::new().to_state();
    state.update(&out_len_bytes);
    for input in inputs {
        state.update(input);
    }
    let mut digest = state.finalize();
    out[..half].copy_from_slice(&digest.as_bytes()[..half]);

    let mut position = half;
    while out_len - position > BLAKE2B_OUTBYTES {
        digest = blake2b_simd::blake2b(digest.as_bytes());
        out[position..position + half].copy_from_slice(&digest.as_bytes()[..half]);
        position += half;
    }

    let tail = Params::new()
        .hash_length(out_len - position)
        .hash(digest.as_bytes());
    out[position..].copy_from_slice(tail.as_bytes());
}

/// Deterministic byte stream: a 64-byte state rehashed with Blake2b-512
/// whenever a read would cross its end.
#[derive(Clone, Debug)]
pub struct Blake2Generator {
    data: [u8; BLAKE2B_OUTBYTES],
    index: usize,
}

impl Blake2Generator {
    pub fn new(seed: &[u8], nonce: u32) -> Self {
        let mut data = [0u8; BLAKE2B_OUTBYTES];
        let seed_len = seed.len().min(GENERATOR_SEED_SIZE);
        data[..seed_len].copy_from_slice(&seed[..seed_len]);
        data[GENERATOR_SEED_SIZE..].copy_from_slice(&nonce.to_le_bytes());

        Self {
            data,
            index: BLAKE2B_OUTBYTES,
        }
    }

    pub fn get_byte(&mut self) -> u8 {
        self.check_data(1);
        let byte = self.data[self.index];
        self.index += 1;
        byte
    }

    pub fn get_u32(&mut self) -> u32 {
        self.check_data(4);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.index..self.index + 4]);
        self.index += 4;
        u32::from_le_bytes(bytes)
    }

    fn check_data(&mut self, bytes_needed: usize) {
        if self.index + bytes_needed > self.data.len() {
            let digest = blake2b_simd::blake2b(&self.data);
            self.data.copy_from_slice(digest.as_bytes());
            self.index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_matches_known_digest() {
        // RFC 7693 Appendix A
        let digest = blake2b(b"abc", 64, None);
        assert_eq!(
            hex::encode(digest),
            "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d1\
             7d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"
        );
    }

    #[test]
    fn output_length_is_a_parameter_not_a_truncation() {
        let long = blake2b(b"randomx", 64, None);
        let short = blake2b(b"randomx", 32, None);

        assert_eq!(short.len(), 32);
        assert_ne!(&long[..32], &short[..]);
    }

    #[test]
    fn keyed_differs_from_unkeyed() {
        let keyed = blake2b(b"data", 32, Some(b"key"));
        let unkeyed = blake2b(b"data", 32, None);
        assert_ne!(keyed, unkeyed);
    }

    #[test]
    fn long_hash_short_output_is_prefixed_blake2b() {
        let mut prefixed = 32u32.to_le_bytes().to_vec();
        prefixed.extend_from_slice(b"input");

        assert_eq!(blake2b_long(b"input", 32), blake2b(&prefixed, 32, None));
    }

    #[test]
    fn long_hash_chains_half_digests() {
        let out = blake2b_long(b"input", 1024);
        assert_eq!(out.len(), 1024);

        let mut prefixed = 1024u32.to_le_bytes().to_vec();
        prefixed.extend_from_slice(b"input");
        let v1 = blake2b(&prefixed, 64, None);
        let v2 = blake2b(&v1, 64, None);

        assert_eq!(&out[..32], &v1[..32]);
        assert_eq!(&out[32..64], &v2[..32]);

        let mut last = v1;
        for _ in 0..29 {
            last = blake2b(&last, 64, None);
        }
        assert_eq!(&out[960..], &blake2b(&last, 64, None)[..]);
    }

    #[test]
    fn split_inputs_hash_like_concatenation() {
        let mut joined = [0u8; 100];
        blake2b_long_into(&[b"hello ", b"world"], &mut joined);

        assert_eq!(joined.to_vec(), blake2b_long(b"hello world", 100));
    }

    #[test]
    fn generator_rehashes_on_exhaustion() {
        let mut generator = Blake2Generator::new(b"test key 000", 0);

        let mut state = [0u8; 64];
        state[..12].copy_from_slice(b"test key 000");
        let first = blake2b(&state, 64, None);

        assert_eq!(generator.get_byte(), first[0]);
        assert_eq!(generator.get_u32(), u32::from_le_bytes([first[1], first[2], first[3], first[4]]));

        for _ in 5..62 {
            generator.get_byte();
        }
        // two bytes left, a 4-byte read triggers a rehash
        let second = blake2b(&first, 64, None);
        assert_eq!(
            generator.get_u32(),
            u32::from_le_bytes([second[0], second[1], second[2], second[3]])
        );
    }

    #[test]
    fn generator_seed_is_truncated_and_nonce_appended() {
        let long_seed = [7u8; 80];
        let mut truncated = Blake2Generator::new(&long_seed, 5);
        let mut exact = Blake2Generator::new(&long_seed[..60], 5);
        let mut other_nonce = Blake2Generator::new(&long_seed[..60], 6);

        let a = truncated.get_u32();
        assert_eq!(a, exact.get_u32());
        assert_ne!(a, other_nonce.get_u32());
    }
}
