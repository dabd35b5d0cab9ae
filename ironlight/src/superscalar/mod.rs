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

mod generator;

pub use generator::ExecutionPort;

use crate::constants::RANDOMX_CACHE_ACCESSES;
use crate::constants::REGISTER_COUNT;
use crate::entropy::Blake2Generator;
use crate::instruction::Instruction;
use crate::instruction::INSTRUCTION_SIZE;
use crate::intrinsics::mulh;
use crate::intrinsics::sign_extend_2s_compl;
use crate::intrinsics::smulh;

/// Superscalar instruction set. The discriminant is the serialized opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SuperscalarKind {
    IsubR = 0,
    IxorR = 1,
    IaddRs = 2,
    ImulR = 3,
    IrorC = 4,
    IaddC7 = 5,
    IxorC7 = 6,
    IaddC8 = 7,
    IxorC8 = 8,
    IaddC9 = 9,
    IxorC9 = 10,
    ImulhR = 11,
    IsmulhR = 12,
    ImulRcp = 13,
}

impl SuperscalarKind {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        use SuperscalarKind::*;

        let kind = match opcode {
            0 => IsubR,
            1 => IxorR,
            2 => IaddRs,
            3 => ImulR,
            4 => IrorC,
            5 => IaddC7,
            6 => IxorC7,
            7 => IaddC8,
            8 => IxorC8,
            9 => IaddC9,
            10 => IxorC9,
            11 => ImulhR,
            12 => IsmulhR,
            13 => ImulRcp,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_multiplication(self) -> bool {
        matches!(
            self,
            Self::ImulR | Self::ImulhR | Self::IsmulhR | Self::ImulRcp
        )
    }
}

/// Branch-free integer program used to expand cache lines into dataset items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperscalarProgram {
    instructions: Vec<Instruction>,
    address_register: usize,
}

impl SuperscalarProgram {
    /// Generates the next program from `gen`. Consecutive calls on one
    /// generator yield the programs of a cache.
    pub fn generate(gen: &mut Blake2Generator) -> Self {
        generator::generate(gen)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Register whose final value selects the next cache line.
    pub fn address_register(&self) -> usize {
        self.address_register
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.instructions.len() * INSTRUCTION_SIZE);
        for instr in &self.instructions {
            bytes.extend_from_slice(&instr.to_bytes());
        }
        bytes
    }

    /// Runs the program over `registers`. `IMUL_RCP` immediates are indices
    /// into `reciprocals`.
    pub fn execute(&self, registers: &mut [u64; REGISTER_COUNT], reciprocals: &[u64]) {
        for instr in &self.instructions {
            let Some(kind) = SuperscalarKind::from_opcode(instr.opcode) else {
                continue;
            };
            let dst = instr.dst as usize;
            let src = registers[instr.src as usize];

            registers[dst] = match kind {
                SuperscalarKind::IsubR => registers[dst].wrapping_sub(src),
                SuperscalarKind::IxorR => registers[dst] ^ src,
                SuperscalarKind::IaddRs => {
                    registers[dst].wrapping_add(src << instr.get_mod_shift())
                }
                SuperscalarKind::ImulR => registers[dst].wrapping_mul(src),
                SuperscalarKind::IrorC => registers[dst].rotate_right(instr.imm32),
                SuperscalarKind::IaddC7 | SuperscalarKind::IaddC8 | SuperscalarKind::IaddC9 => {
                    registers[dst].wrapping_add(sign_extend_2s_compl(instr.imm32))
                }
                SuperscalarKind::IxorC7 | SuperscalarKind::IxorC8 | SuperscalarKind::IxorC9 => {
                    registers[dst] ^ sign_extend_2s_compl(instr.imm32)
                }
                SuperscalarKind::ImulhR => mulh(registers[dst], src),
                SuperscalarKind::IsmulhR => smulh(registers[dst] as i64, src as i64) as u64,
                SuperscalarKind::ImulRcp => {
                    registers[dst].wrapping_mul(reciprocals[instr.imm32 as usize])
                }
            };
        }
    }

    /// Replaces every `IMUL_RCP` divisor with the index of its reciprocal,
    /// appended to `reciprocals`.
    fn index_reciprocals(&mut self, reciprocals: &mut Vec<u64>) {
        for instr in &mut self.instructions {
            if SuperscalarKind::from_opcode(instr.opcode) == Some(SuperscalarKind::ImulRcp) {
                let index = reciprocals.len() as u32;
                reciprocals.push(reciprocal(instr.imm32));
                instr.imm32 = index;
            }
        }
    }
}

/// `floor(2^(63 + bits) / divisor)` where `bits` is the bit length of the
/// divisor. Always fits in 64 bits for a divisor that is not a power of two.
pub fn reciprocal(divisor: u32) -> u64 {
    debug_assert!(divisor != 0 && !divisor.is_power_of_two());

    let bits = u32::BITS - divisor.leading_zeros();
    ((1u128 << (63 + bits)) / divisor as u128) as u64
}

/// The superscalar programs of one cache key together with the reciprocal
/// table their `IMUL_RCP` instructions point into.
#[derive(Debug, Clone)]
pub struct ProgramSet {
    programs: Vec<SuperscalarProgram>,
    reciprocals: Vec<u64>,
}

impl ProgramSet {
    pub fn generate(key: &[u8]) -> Self {
        let mut gen = Blake2Generator::new(key, 0);
        let mut programs = Vec::with_capacity(RANDOMX_CACHE_ACCESSES);
        let mut reciprocals = Vec::new();

        for _ in 0..RANDOMX_CACHE_ACCESSES {
            let mut program = SuperscalarProgram::generate(&mut gen);
            program.index_reciprocals(&mut reciprocals);
            programs.push(program);
        }

        Self {
            programs,
            reciprocals,
        }
    }

    pub fn programs(&self) -> &[SuperscalarProgram] {
        &self.programs
    }

    pub fn reciprocals(&self) -> &[u64] {
        &self.reciprocals
    }
}
