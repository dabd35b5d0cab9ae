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

//! Argon2d (version 1.3) memory filling, used to derive the RandomX cache.

use crate::entropy::blake2b_long_into;
use crate::errors::RandomXError;
use crate::RResult;

pub const ARGON2_BLOCK_WORDS: usize = 128;
pub const ARGON2_SYNC_POINTS: u32 = 4;
pub const ARGON2_VERSION: u32 = 0x13;

const ARGON2_TYPE_D: u32 = 0;
const ARGON2_BLOCK_BYTES: usize = ARGON2_BLOCK_WORDS * 8;

/// 1 KiB Argon2 memory block.
#[derive(Clone, Copy)]
#[repr(C, align(64))]
pub struct Block(pub(crate) [u64; ARGON2_BLOCK_WORDS]);

impl Block {
    pub const ZERO: Block = Block([0; ARGON2_BLOCK_WORDS]);

    fn from_bytes(bytes: &[u8; ARGON2_BLOCK_BYTES]) -> Self {
        let mut block = Self::ZERO;
        for (word, chunk) in block.0.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut le = [0u8; 8];
            le.copy_from_slice(chunk);
            *word = u64::from_le_bytes(le);
        }
        block
    }

    fn to_bytes(&self) -> [u8; ARGON2_BLOCK_BYTES] {
        let mut bytes = [0u8; ARGON2_BLOCK_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(self.0.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    #[inline(always)]
    fn xor_with(&mut self, other: &Block) {
        for (dst, src) in self.0.iter_mut().zip(other.0.iter()) {
            *dst ^= *src;
        }
    }

    pub fn words(&self) -> &[u64; ARGON2_BLOCK_WORDS] {
        &self.0
    }

    /// Blake2 permutation applied to the eight 16-word columns, then to the eight rows.
    fn permute(&mut self) {
        let v = &mut self.0;
        for i in 0..8 {
            let mut state = [0u64; 16];
            state.copy_from_slice(&v[16 * i..16 * i + 16]);
            blake2_round_nomsg(&mut state);
            v[16 * i..16 * i + 16].copy_from_slice(&state);
        }

        for i in 0..8 {
            let mut state = [0u64; 16];
            for j in 0..8 {
                state[2 * j] = v[2 * i + 16 * j];
                state[2 * j + 1] = v[2 * i + 16 * j + 1];
            }
            blake2_round_nomsg(&mut state);
            for j in 0..8 {
                v[2 * i + 16 * j] = state[2 * j];
                v[2 * i + 16 * j + 1] = state[2 * j + 1];
            }
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block({:#018x}, ..)", self.0[0])
    }
}

#[inline(always)]
fn fblamka(x: u64, y: u64) -> u64 {
    let product = (x & 0xffff_ffff) * (y & 0xffff_ffff);
    x.wrapping_add(y).wrapping_add(product.wrapping_mul(2))
}

#[inline(always)]
fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize) {
    v[a] = fblamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = fblamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = fblamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = fblamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

fn blake2_round_nomsg(v: &mut [u64; 16]) {
    g(v, 0, 4, 8, 12);
    g(v, 1, 5, 9, 13);
    g(v, 2, 6, 10, 14);
    g(v, 3, 7, 11, 15);
    g(v, 0, 5, 10, 15);
    g(v, 1, 6, 11, 12);
    g(v, 2, 7, 8, 13);
    g(v, 3, 4, 9, 14);
}

/// Argon2d parameters. `memory_kib` is the number of 1 KiB blocks.
#[derive(Clone, Debug)]
pub struct Argon2Params<'a> {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
    pub salt: &'a [u8],
    pub secret: &'a [u8],
    pub associated_data: &'a [u8],
    pub tag_length: u32,
}

impl Argon2Params<'static> {
    /// Parameters of the RandomX cache: no secret, no associated data and no tag.
    pub fn randomx() -> Self {
        use crate::constants::*;

        Self {
            memory_kib: RANDOMX_ARGON_MEMORY,
            iterations: RANDOMX_ARGON_ITERATIONS,
            lanes: RANDOMX_ARGON_LANES,
            salt: RANDOMX_ARGON_SALT,
            secret: &[],
            associated_data: &[],
            tag_length: 0,
        }
    }
}

/// Position of the block being filled.
#[derive(Clone, Copy, Debug)]
struct Position {
    pass: u32,
    lane: u32,
    slice: u32,
    index: u32,
}

struct Instance<'m> {
    memory: &'m mut [Block],
    passes: u32,
    lanes: u32,
    lane_length: u32,
    segment_length: u32,
}

/// Number of blocks actually used for the given parameters.
pub fn memory_blocks(params: &Argon2Params<'_>) -> usize {
    let lanes = params.lanes.max(1);
    let minimum = 2 * ARGON2_SYNC_POINTS * lanes;
    let segment_length = params.memory_kib.max(minimum) / (lanes * ARGON2_SYNC_POINTS);
    (segment_length * lanes * ARGON2_SYNC_POINTS) as usize
}

fn initial_hash(password: &[u8], params: &Argon2Params<'_>) -> [u8; 64] {
    let mut state = blake2b_simd::Params::new().to_state();
    let le = |value: usize| (value as u32).to_le_bytes();

    state.update(&params.lanes.to_le_bytes());
    state.update(&params.tag_length.to_le_bytes());
    state.update(&params.memory_kib.to_le_bytes());
    state.update(&params.iterations.to_le_bytes());
    state.update(&ARGON2_VERSION.to_le_bytes());
    state.update(&ARGON2_TYPE_D.to_le_bytes());
    state.update(&le(password.len()));
    state.update(password);
    state.update(&le(params.salt.len()));
    state.update(params.salt);
    state.update(&le(params.secret.len()));
    state.update(params.secret);
    state.update(&le(params.associated_data.len()));
    state.update(params.associated_data);

    let mut h0 = [0u8; 64];
    h0.copy_from_slice(state.finalize().as_bytes());
    h0
}

/// Allocates and fills the Argon2d memory. `progress` is called after every
/// (pass, slice) with the number of finished and total slices.
pub fn fill_memory(
    password: &[u8],
    params: &Argon2Params<'_>,
    progress: &mut dyn FnMut(u32, u32),
) -> RResult<Vec<Block>> {
    let block_count = memory_blocks(params);
    let mut memory = Vec::new();
    memory
        .try_reserve_exact(block_count)
        .map_err(|_| RandomXError::CacheAllocationFailed {
            size: block_count * ARGON2_BLOCK_BYTES,
        })?;
    memory.resize(block_count, Block::ZERO);

    let lanes = params.lanes.max(1);
    let segment_length = block_count as u32 / (lanes * ARGON2_SYNC_POINTS);
    let mut instance = Instance {
        memory: &mut memory,
        passes: params.iterations.max(1),
        lanes,
        lane_length: segment_length * ARGON2_SYNC_POINTS,
        segment_length,
    };

    instance.fill_first_blocks(&initial_hash(password, params));
    instance.fill_memory_blocks(progress);

    Ok(memory)
}

/// Full Argon2d computing a `params.tag_length` bytes tag.
pub fn hash(password: &[u8], params: &Argon2Params<'_>) -> RResult<Vec<u8>> {
    let memory = fill_memory(password, params, &mut |_, _| {})?;
    let lanes = params.lanes.max(1) as usize;
    let lane_length = memory.len() / lanes;

    let mut last = memory[lane_length - 1];
    for lane in 1..lanes {
        last.xor_with(&memory[lane * lane_length + lane_length - 1]);
    }

    let mut tag = vec![0u8; params.tag_length as usize];
    blake2b_long_into(&[&last.to_bytes()], &mut tag);
    Ok(tag)
}

impl Instance<'_> {
    fn fill_first_blocks(&mut self, h0: &[u8; 64]) {
        let mut bytes = [0u8; ARGON2_BLOCK_BYTES];
        for lane in 0..self.lanes {
            for block in 0..2u32 {
                blake2b_long_into(&[h0, &block.to_le_bytes(), &lane.to_le_bytes()], &mut bytes);
                let offset = (lane * self.lane_length + block) as usize;
                self.memory[offset] = Block::from_bytes(&bytes);
            }
        }
    }

    fn fill_memory_blocks(&mut self, progress: &mut dyn FnMut(u32, u32)) {
        let total = self.passes * ARGON2_SYNC_POINTS;
        for pass in 0..self.passes {
            for slice in 0..ARGON2_SYNC_POINTS {
                for lane in 0..self.lanes {
                    self.fill_segment(Position {
                        pass,
                        lane,
                        slice,
                        index: 0,
                    });
                }
                progress(pass * ARGON2_SYNC_POINTS + slice + 1, total);
            }
        }
    }

    fn fill_segment(&mut self, mut position: Position) {
        let starting_index = if position.pass == 0 && position.slice == 0 {
            2
        } else {
            0
        };

        let mut curr_offset = position.lane * self.lane_length
            + position.slice * self.segment_length
            + starting_index;
        let mut prev_offset = if curr_offset % self.lane_length == 0 {
            curr_offset + self.lane_length - 1
        } else {
            curr_offset - 1
        };

        for index in starting_index..self.segment_length {
            if curr_offset % self.lane_length == 1 {
                prev_offset = curr_offset - 1;
            }

            let pseudo_rand = self.memory[prev_offset as usize].0[0];
            let ref_lane = if position.pass == 0 && position.slice == 0 {
                position.lane
            } else {
                ((pseudo_rand >> 32) % self.lanes as u64) as u32
            };

            position.index = index;
            let ref_index = self.index_alpha(position, pseudo_rand as u32, ref_lane == position.lane);
            let ref_offset = self.lane_length * ref_lane + ref_index;

            fill_block(
                self.memory,
                prev_offset as usize,
                ref_offset as usize,
                curr_offset as usize,
                position.pass != 0,
            );

            curr_offset += 1;
            prev_offset += 1;
        }
    }

    fn index_alpha(&self, position: Position, pseudo_rand: u32, same_lane: bool) -> u32 {
        let segment = self.segment_length;
        let index = position.index;
        let unfinished = u32::from(index == 0);

        let reference_area_size = if position.pass == 0 {
            if position.slice == 0 {
                index - 1
            } else if same_lane {
                position.slice * segment + index - 1
            } else {
                position.slice * segment - unfinished
            }
        } else if same_lane {
            self.lane_length - segment + index - 1
        } else {
            self.lane_length - segment - unfinished
        };

        let mut relative_position = pseudo_rand as u64;
        relative_position = (relative_position * relative_position) >> 32;
        let relative_position = reference_area_size as u64
            - 1
            - ((reference_area_size as u64 * relative_position) >> 32);

        let start_position = if position.pass != 0 && position.slice != ARGON2_SYNC_POINTS - 1 {
            (position.slice + 1) * segment
        } else {
            0
        };

        ((start_position as u64 + relative_position) % self.lane_length as u64) as u32
    }
}

fn fill_block(memory: &mut [Block], prev: usize, reference: usize, current: usize, with_xor: bool) {
    let mut mixed = memory[reference];
    mixed.xor_with(&memory[prev]);

    let mut next = mixed;
    if with_xor {
        next.xor_with(&memory[current]);
    }

    mixed.permute();
    next.xor_with(&mixed);
    memory[current] = next;
}
