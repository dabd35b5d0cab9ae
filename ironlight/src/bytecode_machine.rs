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

//! Compiles VM programs into register-resolved bytecode and interprets it.

use crate::constants::CONDITION_MASK;
use crate::constants::CONDITION_OFFSET;
use crate::constants::RANDOMX_PROGRAM_SIZE;
use crate::constants::REGISTER_COUNT;
use crate::constants::REGISTER_COUNT_FLT;
use crate::constants::REGISTER_NEEDS_DISPLACEMENT;
use crate::constants::SCRATCHPAD_L1_MASK;
use crate::constants::SCRATCHPAD_L2_MASK;
use crate::constants::SCRATCHPAD_L3_MASK;
use crate::constants::STORE_L3_CONDITION;
use crate::instruction::Instruction;
use crate::instruction::InstructionKind;
use crate::intrinsics;
use crate::intrinsics::is_zero_or_power_of_2;
use crate::intrinsics::mask_register_exponent_mantissa;
use crate::intrinsics::mulh;
use crate::intrinsics::sign_extend_2s_compl;
use crate::intrinsics::smulh;
use crate::intrinsics::RoundingMode;
use crate::intrinsics::SCALE_MASK;
use crate::registers::FpuRegister;
use crate::registers::IntRegisterArray;
use crate::superscalar::reciprocal;

/// Registers as seen by the bytecode during one program execution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NativeRegisterFile {
    pub r: IntRegisterArray,
    pub f: [FpuRegister; REGISTER_COUNT_FLT],
    pub e: [FpuRegister; REGISTER_COUNT_FLT],
    pub a: [FpuRegister; REGISTER_COUNT_FLT],
}

impl NativeRegisterFile {
    pub(crate) fn from_fp_registers(a: &[FpuRegister; REGISTER_COUNT_FLT]) -> Self {
        Self {
            a: *a,
            ..Self::default()
        }
    }
}

/// Second operand of an integer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSource {
    Register(usize),
    Immediate(u64),
}

impl IntSource {
    #[inline(always)]
    fn value(self, r: &IntRegisterArray) -> u64 {
        match self {
            IntSource::Register(src) => r[src],
            IntSource::Immediate(imm) => imm,
        }
    }
}

/// Scratchpad operand `(base + imm) & mask`. A missing base reads as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperand {
    pub base: Option<usize>,
    pub imm: u64,
    pub mask: u32,
}

impl MemoryOperand {
    #[inline(always)]
    fn address(&self, r: &IntRegisterArray) -> usize {
        let base = self.base.map_or(0, |src| r[src]);
        (base.wrapping_add(self.imm) & self.mask as u64) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatRegister {
    F(usize),
    E(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstructionByteCode {
    IaddRs { dst: usize, src: usize, shift: u32, imm: u64 },
    IaddM { dst: usize, mem: MemoryOperand },
    IsubR { dst: usize, src: IntSource },
    IsubM { dst: usize, mem: MemoryOperand },
    ImulR { dst: usize, src: IntSource },
    ImulM { dst: usize, mem: MemoryOperand },
    ImulhR { dst: usize, src: usize },
    ImulhM { dst: usize, mem: MemoryOperand },
    IsmulhR { dst: usize, src: usize },
    IsmulhM { dst: usize, mem: MemoryOperand },
    InegR { dst: usize },
    IxorR { dst: usize, src: IntSource },
    IxorM { dst: usize, mem: MemoryOperand },
    IrorR { dst: usize, src: IntSource },
    IrolR { dst: usize, src: IntSource },
    IswapR { dst: usize, src: usize },
    FswapR { dst: FloatRegister },
    FaddR { dst: usize, src: usize },
    FaddM { dst: usize, mem: MemoryOperand },
    FsubR { dst: usize, src: usize },
    FsubM { dst: usize, mem: MemoryOperand },
    FscalR { dst: usize },
    FmulR { dst: usize, src: usize },
    FdivM { dst: usize, mem: MemoryOperand },
    FsqrtR { dst: usize },
    /// `target` is the index of the instruction executed when the branch is taken.
    Cbranch { dst: usize, imm: u64, mask: u64, target: usize },
    Cfround { src: usize, rotate: u32 },
    Istore { dst: usize, src: usize, imm: u64, mask: u32 },
    #[default]
    Nop,
}

pub type BytecodeStorage = [InstructionByteCode; RANDOMX_PROGRAM_SIZE];

#[derive(Debug, Clone)]
pub struct BytecodeMachine {
    bytecode: BytecodeStorage,
}

impl BytecodeMachine {
    pub fn compile(program: &[Instruction; RANDOMX_PROGRAM_SIZE]) -> Self {
        // index to resume from when a CBRANCH on that register is taken
        let mut branch_targets = [0usize; REGISTER_COUNT];
        let mut bytecode = [InstructionByteCode::Nop; RANDOMX_PROGRAM_SIZE];

        for (i, instr) in program.iter().enumerate() {
            bytecode[i] = compile_instruction(i, instr, &mut branch_targets);
        }

        Self { bytecode }
    }

    pub fn bytecode(&self) -> &BytecodeStorage {
        &self.bytecode
    }

    pub fn execute(
        &self,
        nreg: &mut NativeRegisterFile,
        scratchpad: &mut [u8],
        e_mask: &[u64; 2],
        rounding: &mut RoundingMode,
    ) {
        use InstructionByteCode::*;

        let mut pc = 0;
        while pc < self.bytecode.len() {
            let mode = *rounding;
            let r = &mut nreg.r;

            match self.bytecode[pc] {
                IaddRs { dst, src, shift, imm } => {
                    r[dst] = r[dst].wrapping_add((r[src] << shift).wrapping_add(imm));
                }
                IaddM { dst, mem } => {
                    r[dst] = r[dst].wrapping_add(load64(scratchpad, mem.address(r)));
                }
                IsubR { dst, src } => r[dst] = r[dst].wrapping_sub(src.value(r)),
                IsubM { dst, mem } => {
                    r[dst] = r[dst].wrapping_sub(load64(scratchpad, mem.address(r)));
                }
                ImulR { dst, src } => r[dst] = r[dst].wrapping_mul(src.value(r)),
                ImulM { dst, mem } => {
                    r[dst] = r[dst].wrapping_mul(load64(scratchpad, mem.address(r)));
                }
                ImulhR { dst, src } => r[dst] = mulh(r[dst], r[src]),
                ImulhM { dst, mem } => r[dst] = mulh(r[dst], load64(scratchpad, mem.address(r))),
                IsmulhR { dst, src } => r[dst] = smulh(r[dst] as i64, r[src] as i64) as u64,
                IsmulhM { dst, mem } => {
                    let value = load64(scratchpad, mem.address(r));
                    r[dst] = smulh(r[dst] as i64, value as i64) as u64;
                }
                InegR { dst } => r[dst] = r[dst].wrapping_neg(),
                IxorR { dst, src } => {
                    let value = src.value(r);
                    r[dst] ^= value;
                }
                IxorM { dst, mem } => {
                    let value = load64(scratchpad, mem.address(r));
                    r[dst] ^= value;
                }
                IrorR { dst, src } => r[dst] = r[dst].rotate_right((src.value(r) & 63) as u32),
                IrolR { dst, src } => r[dst] = r[dst].rotate_left((src.value(r) & 63) as u32),
                IswapR { dst, src } => r.swap(dst, src),
                FswapR { dst } => {
                    let register = match dst {
                        FloatRegister::F(i) => &mut nreg.f[i],
                        FloatRegister::E(i) => &mut nreg.e[i],
                    };
                    *register = FpuRegister::new(register.hi, register.lo);
                }
                FaddR { dst, src } => {
                    nreg.f[dst] = nreg.f[dst].zip_with(nreg.a[src], |x, y| intrinsics::add(x, y, mode));
                }
                FaddM { dst, mem } => {
                    let value = load_packed(scratchpad, mem.address(r));
                    nreg.f[dst] = nreg.f[dst].zip_with(value, |x, y| intrinsics::add(x, y, mode));
                }
                FsubR { dst, src } => {
                    nreg.f[dst] = nreg.f[dst].zip_with(nreg.a[src], |x, y| intrinsics::sub(x, y, mode));
                }
                FsubM { dst, mem } => {
                    let value = load_packed(scratchpad, mem.address(r));
                    nreg.f[dst] = nreg.f[dst].zip_with(value, |x, y| intrinsics::sub(x, y, mode));
                }
                FscalR { dst } => {
                    nreg.f[dst] = nreg.f[dst].xor(FpuRegister::from_bits(SCALE_MASK, SCALE_MASK));
                }
                FmulR { dst, src } => {
                    nreg.e[dst] = nreg.e[dst].zip_with(nreg.a[src], |x, y| intrinsics::mul(x, y, mode));
                }
                FdivM { dst, mem } => {
                    let value = load_packed(scratchpad, mem.address(r));
                    let divisor = FpuRegister::new(
                        mask_register_exponent_mantissa(value.lo, e_mask[0]),
                        mask_register_exponent_mantissa(value.hi, e_mask[1]),
                    );
                    nreg.e[dst] = nreg.e[dst].zip_with(divisor, |x, y| intrinsics::div(x, y, mode));
                }
                FsqrtR { dst } => nreg.e[dst] = nreg.e[dst].map(|x| intrinsics::sqrt(x, mode)),
                Cbranch { dst, imm, mask, target } => {
                    r[dst] = r[dst].wrapping_add(imm);
                    if r[dst] & mask == 0 {
                        pc = target;
                        continue;
                    }
                }
                Cfround { src, rotate } => {
                    *rounding = RoundingMode::from_bits(r[src].rotate_right(rotate));
                }
                Istore { dst, src, imm, mask } => {
                    let address = (r[dst].wrapping_add(imm) & mask as u64) as usize;
                    store64(scratchpad, address, r[src]);
                }
                Nop => {}
            }

            pc += 1;
        }
    }
}

fn compile_instruction(
    i: usize,
    instr: &Instruction,
    branch_targets: &mut [usize; REGISTER_COUNT],
) -> InstructionByteCode {
    use InstructionByteCode::*;

    let dst = instr.dst as usize % REGISTER_COUNT;
    let src = instr.src as usize % REGISTER_COUNT;
    let imm = sign_extend_2s_compl(instr.imm32);
    let register_or_imm = if src != dst {
        IntSource::Register(src)
    } else {
        IntSource::Immediate(imm)
    };

    let bytecode = match instr.kind() {
        InstructionKind::IaddRs => IaddRs {
            dst,
            src,
            shift: instr.get_mod_shift() as u32,
            imm: if dst == REGISTER_NEEDS_DISPLACEMENT { imm } else { 0 },
        },
        InstructionKind::IaddM => IaddM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::IsubR => IsubR { dst, src: register_or_imm },
        InstructionKind::IsubM => IsubM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::ImulR => ImulR { dst, src: register_or_imm },
        InstructionKind::ImulM => ImulM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::ImulhR => ImulhR { dst, src },
        InstructionKind::ImulhM => ImulhM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::IsmulhR => IsmulhR { dst, src },
        InstructionKind::IsmulhM => IsmulhM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::ImulRcp => {
            if is_zero_or_power_of_2(instr.imm32 as u64) {
                return Nop;
            }
            ImulR {
                dst,
                src: IntSource::Immediate(reciprocal(instr.imm32)),
            }
        }
        InstructionKind::InegR => InegR { dst },
        InstructionKind::IxorR => IxorR { dst, src: register_or_imm },
        InstructionKind::IxorM => IxorM { dst, mem: integer_memory_operand(instr, dst, src) },
        InstructionKind::IrorR | InstructionKind::IrolR => {
            // rotation immediates are not sign extended
            let src = if src != dst {
                IntSource::Register(src)
            } else {
                IntSource::Immediate(instr.imm32 as u64)
            };
            if instr.kind() == InstructionKind::IrorR {
                IrorR { dst, src }
            } else {
                IrolR { dst, src }
            }
        }
        InstructionKind::IswapR => {
            if src == dst {
                return Nop;
            }
            branch_targets[src] = i + 1;
            IswapR { dst, src }
        }
        InstructionKind::FswapR => {
            let register = if dst < REGISTER_COUNT_FLT {
                FloatRegister::F(dst)
            } else {
                FloatRegister::E(dst - REGISTER_COUNT_FLT)
            };
            return FswapR { dst: register };
        }
        InstructionKind::FaddR => return FaddR { dst: dst % REGISTER_COUNT_FLT, src: src % REGISTER_COUNT_FLT },
        InstructionKind::FaddM => return FaddM { dst: dst % REGISTER_COUNT_FLT, mem: float_memory_operand(instr, src) },
        InstructionKind::FsubR => return FsubR { dst: dst % REGISTER_COUNT_FLT, src: src % REGISTER_COUNT_FLT },
        InstructionKind::FsubM => return FsubM { dst: dst % REGISTER_COUNT_FLT, mem: float_memory_operand(instr, src) },
        InstructionKind::FscalR => return FscalR { dst: dst % REGISTER_COUNT_FLT },
        InstructionKind::FmulR => return FmulR { dst: dst % REGISTER_COUNT_FLT, src: src % REGISTER_COUNT_FLT },
        InstructionKind::FdivM => return FdivM { dst: dst % REGISTER_COUNT_FLT, mem: float_memory_operand(instr, src) },
        InstructionKind::FsqrtR => return FsqrtR { dst: dst % REGISTER_COUNT_FLT },
        InstructionKind::Cbranch => {
            let shift = instr.get_mod_cond() as u32 + CONDITION_OFFSET;
            let imm = (imm | (1u64 << shift)) & !(1u64 << (shift - 1));
            let target = branch_targets[dst];
            *branch_targets = [i + 1; REGISTER_COUNT];

            return Cbranch {
                dst,
                imm,
                mask: CONDITION_MASK << shift,
                target,
            };
        }
        InstructionKind::Cfround => return Cfround { src, rotate: instr.imm32 & 63 },
        InstructionKind::Istore => {
            let mask = if instr.get_mod_cond() < STORE_L3_CONDITION {
                l1_or_l2_mask(instr)
            } else {
                SCRATCHPAD_L3_MASK
            };
            return Istore { dst, src, imm, mask };
        }
        InstructionKind::Nop => return Nop,
    };

    // integer instructions that reach this point write `dst`
    branch_targets[dst] = i + 1;
    bytecode
}

fn l1_or_l2_mask(instr: &Instruction) -> u32 {
    if instr.get_mod_mem() != 0 {
        SCRATCHPAD_L1_MASK
    } else {
        SCRATCHPAD_L2_MASK
    }
}

fn integer_memory_operand(instr: &Instruction, dst: usize, src: usize) -> MemoryOperand {
    let imm = sign_extend_2s_compl(instr.imm32);
    if src != dst {
        MemoryOperand {
            base: Some(src),
            imm,
            mask: l1_or_l2_mask(instr),
        }
    } else {
        MemoryOperand {
            base: None,
            imm,
            mask: SCRATCHPAD_L3_MASK,
        }
    }
}

fn float_memory_operand(instr: &Instruction, src: usize) -> MemoryOperand {
    MemoryOperand {
        base: Some(src),
        imm: sign_extend_2s_compl(instr.imm32),
        mask: l1_or_l2_mask(instr),
    }
}

#[inline(always)]
pub(crate) fn load64(memory: &[u8], address: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&memory[address..address + 8]);
    u64::from_le_bytes(bytes)
}

#[inline(always)]
pub(crate) fn store64(memory: &mut [u8], address: usize, value: u64) {
    memory[address..address + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline(always)]
pub(crate) fn load_packed(memory: &[u8], address: usize) -> FpuRegister {
    FpuRegister::from_packed_i32(&memory[address..address + 8])
}

#[cfg(test)]
mod tests {
    use super::*;

    const IADD_RS: u8 = 0;
    const IADD_M: u8 = 16;
    const ISUB_R: u8 = 23;
    const IMUL_RCP: u8 = 76;
    const IXOR_R: u8 = 86;
    const IROR_R: u8 = 106;
    const ISWAP_R: u8 = 116;
    const FSWAP_R: u8 = 120;
    const FSCAL_R: u8 = 166;
    const CBRANCH: u8 = 214;
    const CFROUND: u8 = 239;
    const ISTORE: u8 = 240;

    fn nop_program() -> [Instruction; RANDOMX_PROGRAM_SIZE] {
        // ISWAP_R r0, r0 compiles to a no-op
        [Instruction::new(ISWAP_R, 0, 0, 0, 0); RANDOMX_PROGRAM_SIZE]
    }

    fn run(program: &[Instruction; RANDOMX_PROGRAM_SIZE], nreg: &mut NativeRegisterFile) -> Vec<u8> {
        let mut scratchpad = vec![0u8; crate::constants::RANDOMX_SCRATCHPAD_L3];
        let mut rounding = RoundingMode::Nearest;
        BytecodeMachine::compile(program).execute(nreg, &mut scratchpad, &[0, 0], &mut rounding);
        scratchpad
    }

    #[test]
    fn displacement_only_for_r5() {
        let mut program = nop_program();
        program[0] = Instruction::new(IADD_RS, 5, 1, 0b0100, 0xffff_fff0);
        program[1] = Instruction::new(IADD_RS, 4, 1, 0b0100, 0xffff_fff0);
        let machine = BytecodeMachine::compile(&program);

        assert_eq!(
            machine.bytecode()[0],
            InstructionByteCode::IaddRs { dst: 5, src: 1, shift: 1, imm: (-16i64) as u64 }
        );
        assert_eq!(
            machine.bytecode()[1],
            InstructionByteCode::IaddRs { dst: 4, src: 1, shift: 1, imm: 0 }
        );
    }

    #[test]
    fn same_register_operands_use_immediates() {
        let mut program = nop_program();
        program[0] = Instruction::new(ISUB_R, 2, 2, 0, 0xffff_ffff);
        program[1] = Instruction::new(IROR_R, 3, 3, 0, 0xffff_ffff);
        program[2] = Instruction::new(IADD_M, 1, 1, 0, 8);
        let machine = BytecodeMachine::compile(&program);

        assert_eq!(
            machine.bytecode()[0],
            InstructionByteCode::IsubR { dst: 2, src: IntSource::Immediate(u64::MAX) }
        );
        assert_eq!(
            machine.bytecode()[1],
            InstructionByteCode::IrorR { dst: 3, src: IntSource::Immediate(0xffff_ffff) }
        );
        assert_eq!(
            machine.bytecode()[2],
            InstructionByteCode::IaddM {
                dst: 1,
                mem: MemoryOperand { base: None, imm: 8, mask: SCRATCHPAD_L3_MASK },
            }
        );
    }

    #[test]
    fn reciprocal_multiplication() {
        let mut program = nop_program();
        program[0] = Instruction::new(IMUL_RCP, 0, 0, 0, 3);
        program[1] = Instruction::new(IMUL_RCP, 1, 0, 0, 1 << 20);
        program[2] = Instruction::new(IMUL_RCP, 2, 0, 0, 0);
        let machine = BytecodeMachine::compile(&program);

        assert_eq!(
            machine.bytecode()[0],
            InstructionByteCode::ImulR { dst: 0, src: IntSource::Immediate(reciprocal(3)) }
        );
        assert_eq!(machine.bytecode()[1], InstructionByteCode::Nop);
        assert_eq!(machine.bytecode()[2], InstructionByteCode::Nop);
    }

    #[test]
    fn branch_targets_follow_register_usage() {
        let mut program = nop_program();
        program[3] = Instruction::new(IXOR_R, 6, 1, 0, 0);
        program[7] = Instruction::new(CBRANCH, 6, 0, 0, 0);
        program[9] = Instruction::new(CBRANCH, 2, 0, 0, 0);
        program[10] = Instruction::new(CBRANCH, 6, 0, 0, 0);
        let machine = BytecodeMachine::compile(&program);

        let target = |pc: usize| match machine.bytecode()[pc] {
            InstructionByteCode::Cbranch { target, .. } => target,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(target(7), 4);
        assert_eq!(target(9), 8);
        assert_eq!(target(10), 10);
    }

    #[test]
    fn branch_immediate_and_mask() {
        let mut program = nop_program();
        program[0] = Instruction::new(CBRANCH, 0, 0, 0x30, 0xffff_ffff);
        let machine = BytecodeMachine::compile(&program);

        // shift = 3 + 8: bit 11 set, bit 10 cleared
        assert_eq!(
            machine.bytecode()[0],
            InstructionByteCode::Cbranch {
                dst: 0,
                imm: u64::MAX & !(1 << 10),
                mask: 0xff << 11,
                target: 0,
            }
        );
    }

    #[test]
    fn taken_branch_jumps_back() {
        let mut program = nop_program();
        program[0] = Instruction::new(IADD_RS, 0, 2, 0, 0);
        program[1] = Instruction::new(CBRANCH, 1, 0, 0, 0);
        let mut nreg = NativeRegisterFile::default();
        nreg.r[2] = 1;
        // the first `r1 += 0x100` clears bits 8..16 and jumps back to 0,
        // the second one leaves bit 8 set and falls through
        nreg.r[1] = 0xff00;
        run(&program, &mut nreg);

        assert_eq!(nreg.r[0], 2);
        assert_eq!(nreg.r[1], 0x10100);
    }

    #[test]
    fn store_and_swap() {
        let mut program = nop_program();
        program[0] = Instruction::new(ISWAP_R, 0, 1, 0, 0);
        program[1] = Instruction::new(ISTORE, 2, 0, 0xf0, 16);
        let mut nreg = NativeRegisterFile::default();
        nreg.r[1] = 0xdead_beef;
        nreg.r[2] = 64;
        let scratchpad = run(&program, &mut nreg);

        assert_eq!(nreg.r[0], 0xdead_beef);
        assert_eq!(load64(&scratchpad, 80), 0xdead_beef);
    }

    #[test]
    fn float_register_manipulation() {
        let mut program = nop_program();
        program[0] = Instruction::new(FSWAP_R, 5, 0, 0, 0);
        program[1] = Instruction::new(FSCAL_R, 4, 0, 0, 0);
        let mut nreg = NativeRegisterFile::default();
        nreg.e[1] = FpuRegister::new(1.0, 2.0);
        nreg.f[0] = FpuRegister::new(1.0, -1.0);
        run(&program, &mut nreg);

        assert_eq!(nreg.e[1], FpuRegister::new(2.0, 1.0));
        assert_eq!(nreg.f[0].lo.to_bits(), 1.0f64.to_bits() ^ SCALE_MASK);
        assert_eq!(nreg.f[0].hi.to_bits(), (-1.0f64).to_bits() ^ SCALE_MASK);
    }

    #[test]
    fn cfround_sets_rounding_mode() {
        let mut program = nop_program();
        program[0] = Instruction::new(CFROUND, 0, 3, 0, 62);
        let mut nreg = NativeRegisterFile::default();
        nreg.r[3] = 1;
        let mut scratchpad = vec![0u8; 64];
        let mut rounding = RoundingMode::Nearest;
        BytecodeMachine::compile(&program).execute(&mut nreg, &mut scratchpad, &[0, 0], &mut rounding);

        // rotr(1, 62) == 4
        assert_eq!(rounding, RoundingMode::Nearest);

        nreg.r[3] = 0b1100;
        BytecodeMachine::compile(&program).execute(&mut nreg, &mut scratchpad, &[0, 0], &mut rounding);
        // rotr(0b1100, 62) == 0b110000
        assert_eq!(rounding, RoundingMode::Nearest);

        program[0] = Instruction::new(CFROUND, 0, 3, 0, 2);
        nreg.r[3] = 0b1000;
        BytecodeMachine::compile(&program).execute(&mut nreg, &mut scratchpad, &[0, 0], &mut rounding);
        assert_eq!(rounding, RoundingMode::Up);
    }
}
