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

use std::fmt;

use crate::constants::RANDOMX_PROGRAM_SIZE;
use crate::entropy::fill_aes_4rx4;
use crate::instruction::Instruction;
use crate::instruction::INSTRUCTION_SIZE;
use crate::intrinsics::get_float_mask;

pub const PROGRAM_ENTROPY_WORDS: usize = 16;
pub const PROGRAM_BYTES: usize = PROGRAM_ENTROPY_WORDS * 8 + RANDOMX_PROGRAM_SIZE * INSTRUCTION_SIZE;

/// Per-program settings derived from the entropy block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramConfiguration {
    pub e_mask: [u64; 2],
    pub read_reg0: usize,
    pub read_reg1: usize,
    pub read_reg2: usize,
    pub read_reg3: usize,
}

impl ProgramConfiguration {
    pub fn new_with_entropy(e_mask_0: u64, e_mask_1: u64, address_registers: u64) -> Self {
        let mut address_registers = address_registers as usize;
        let read_reg0 = address_registers & 1;
        address_registers >>= 1;
        let read_reg1 = 2 + (address_registers & 1);
        address_registers >>= 1;
        let read_reg2 = 4 + (address_registers & 1);
        address_registers >>= 1;
        let read_reg3 = 6 + (address_registers & 1);

        Self {
            e_mask: [get_float_mask(e_mask_0), get_float_mask(e_mask_1)],
            read_reg0,
            read_reg1,
            read_reg2,
            read_reg3,
        }
    }
}

/// A VM program: 128 bytes of entropy followed by 256 instructions, all
/// produced by `fill_aes_4rx4` from a 64-byte seed.
#[derive(Debug, Clone)]
pub struct Program {
    pub entropy_buffer: [u64; PROGRAM_ENTROPY_WORDS],
    pub program_buffer: [Instruction; RANDOMX_PROGRAM_SIZE],
}

impl Program {
    pub fn with_seed(seed: &[u8; 64]) -> Self {
        let mut bytes = [0u8; PROGRAM_BYTES];
        fill_aes_4rx4(seed, &mut bytes);
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8; PROGRAM_BYTES]) -> Self {
        let (entropy, code) = bytes.split_at(PROGRAM_ENTROPY_WORDS * 8);

        let mut entropy_buffer = [0u64; PROGRAM_ENTROPY_WORDS];
        for (word, chunk) in entropy_buffer.iter_mut().zip(entropy.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }

        let mut program_buffer = [Instruction::default(); RANDOMX_PROGRAM_SIZE];
        for (instr, chunk) in program_buffer.iter_mut().zip(code.chunks_exact(INSTRUCTION_SIZE)) {
            let mut raw = [0u8; INSTRUCTION_SIZE];
            raw.copy_from_slice(chunk);
            *instr = Instruction::from_bytes(raw);
        }

        Self {
            entropy_buffer,
            program_buffer,
        }
    }

    pub fn get_entropy(&self, i: usize) -> u64 {
        self.entropy_buffer[i]
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.program_buffer
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in self.program_buffer.iter() {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}
