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

pub const INSTRUCTION_SIZE: usize = 8;

/// Encoded instruction, shared by VM programs and superscalar programs:
/// `opcode, dst, src, mod` bytes followed by a little-endian `imm32`.
#[repr(C, align(8))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: u8,
    pub dst: u8,
    pub src: u8,
    pub mod_: u8,
    pub imm32: u32,
}

/// VM operations, in opcode order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    IaddRs,
    IaddM,
    IsubR,
    IsubM,
    ImulR,
    ImulM,
    ImulhR,
    ImulhM,
    IsmulhR,
    IsmulhM,
    ImulRcp,
    InegR,
    IxorR,
    IxorM,
    IrorR,
    IrolR,
    IswapR,
    FswapR,
    FaddR,
    FaddM,
    FsubR,
    FsubM,
    FscalR,
    FmulR,
    FdivM,
    FsqrtR,
    Cbranch,
    Cfround,
    Istore,
    Nop,
}

pub const NAMES_FREQS: [(InstructionKind, &str, u8); 30] = [
    (InstructionKind::IaddRs,  "IADD_RS",  16),
    (InstructionKind::IaddM,   "IADD_M",    7),
    (InstructionKind::IsubR,   "ISUB_R",   16),
    (InstructionKind::IsubM,   "ISUB_M",    7),
    (InstructionKind::ImulR,   "IMUL_R",   16),
    (InstructionKind::ImulM,   "IMUL_M",    4),
    (InstructionKind::ImulhR,  "IMULH_R",   4),
    (InstructionKind::ImulhM,  "IMULH_M",   1),
    (InstructionKind::IsmulhR, "ISMULH_R",  4),
    (InstructionKind::IsmulhM, "ISMULH_M",  1),
    (InstructionKind::ImulRcp, "IMUL_RCP",  8),
    (InstructionKind::InegR,   "INEG_R",    2),
    (InstructionKind::IxorR,   "IXOR_R",   15),
    (InstructionKind::IxorM,   "IXOR_M",    5),
    (InstructionKind::IrorR,   "IROR_R",    8),
    (InstructionKind::IrolR,   "IROL_R",    2),
    (InstructionKind::IswapR,  "ISWAP_R",   4),
    (InstructionKind::FswapR,  "FSWAP_R",   4),
    (InstructionKind::FaddR,   "FADD_R",   16),
    (InstructionKind::FaddM,   "FADD_M",    5),
    (InstructionKind::FsubR,   "FSUB_R",   16),
    (InstructionKind::FsubM,   "FSUB_M",    5),
    (InstructionKind::FscalR,  "FSCAL_R",   6),
    (InstructionKind::FmulR,   "FMUL_R",   32),
    (InstructionKind::FdivM,   "FDIV_M",    4),
    (InstructionKind::FsqrtR,  "FSQRT_R",   6),
    (InstructionKind::Cbranch, "CBRANCH",  25),
    (InstructionKind::Cfround, "CFROUND",   1),
    (InstructionKind::Istore,  "ISTORE",   16),
    (InstructionKind::Nop,     "NOP",       0),
];

const fn build_instruction_array() -> [(InstructionKind, &'static str); 256] {
    let mut arr = [(InstructionKind::Nop, "NOP"); 256];
    let mut idx = 0;
    let mut i = 0;
    while i < NAMES_FREQS.len() {
        let (kind, name, freq) = NAMES_FREQS[i];
        let mut j = 0;
        while j < freq {
            arr[idx] = (kind, name);
            idx += 1;
            j += 1;
        }
        i += 1;
    }
    assert!(idx == 256, "opcode frequencies must cover every opcode");
    arr
}

const OPCODE_TABLE: [(InstructionKind, &str); 256] = build_instruction_array();

impl Instruction {
    pub fn new(opcode: u8, dst: u8, src: u8, mod_: u8, imm32: u32) -> Self {
        Self {
            opcode,
            dst,
            src,
            mod_,
            imm32,
        }
    }

    pub fn from_bytes(bytes: [u8; INSTRUCTION_SIZE]) -> Self {
        Self {
            opcode: bytes[0],
            dst: bytes[1],
            src: bytes[2],
            mod_: bytes[3],
            imm32: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; INSTRUCTION_SIZE] {
        let imm = self.imm32.to_le_bytes();
        [self.opcode, self.dst, self.src, self.mod_, imm[0], imm[1], imm[2], imm[3]]
    }

    pub fn kind(&self) -> InstructionKind {
        OPCODE_TABLE[self.opcode as usize].0
    }

    pub fn get_imm32(&self) -> u32 {
        self.imm32
    }

    pub fn get_mod_mem(&self) -> u8 {
        self.mod_ & 0b11
    }

    pub fn get_mod_shift(&self) -> u8 {
        (self.mod_ >> 2) & 0b11
    }

    pub fn get_mod_cond(&self) -> u8 {
        self.mod_ >> 4
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} r{}, r{}, mod {:#04x}, imm {:#010x}",
            OPCODE_TABLE[self.opcode as usize].1,
            self.dst,
            self.src,
            self.mod_,
            self.imm32
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_ranges_follow_frequencies() {
        let kind = |opcode: u8| Instruction::new(opcode, 0, 0, 0, 0).kind();

        assert_eq!(kind(0), InstructionKind::IaddRs);
        assert_eq!(kind(15), InstructionKind::IaddRs);
        assert_eq!(kind(16), InstructionKind::IaddM);
        assert_eq!(kind(23), InstructionKind::IsubR);
        assert_eq!(kind(83), InstructionKind::ImulRcp);
        assert_eq!(kind(84), InstructionKind::InegR);
        assert_eq!(kind(86), InstructionKind::IxorR);
        assert_eq!(kind(119), InstructionKind::IswapR);
        assert_eq!(kind(120), InstructionKind::FswapR);
        assert_eq!(kind(203), InstructionKind::FmulR);
        assert_eq!(kind(204), InstructionKind::FdivM);
        assert_eq!(kind(214), InstructionKind::Cbranch);
        assert_eq!(kind(239), InstructionKind::Cfround);
        assert_eq!(kind(240), InstructionKind::Istore);
        assert_eq!(kind(255), InstructionKind::Istore);
    }

    #[test]
    fn mod_fields() {
        let instr = Instruction::new(0, 0, 0, 0b1011_0110, 0);

        assert_eq!(instr.get_mod_mem(), 0b10);
        assert_eq!(instr.get_mod_shift(), 0b01);
        assert_eq!(instr.get_mod_cond(), 0b1011);
    }

    #[test]
    fn byte_layout_is_little_endian() {
        let instr = Instruction::new(1, 2, 3, 4, 0x0a0b0c0d);
        let bytes = instr.to_bytes();

        assert_eq!(bytes, [1, 2, 3, 4, 0x0d, 0x0c, 0x0b, 0x0a]);
        assert_eq!(Instruction::from_bytes(bytes), instr);
    }

    #[test]
    fn display_uses_mnemonic() {
        let instr = Instruction::new(240, 1, 2, 0, 7);
        assert!(instr.to_string().starts_with("ISTORE r1, r2"));
    }
}
