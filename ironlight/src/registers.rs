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

use crate::constants::CACHE_LINE_ALIGN_MASK;
use crate::constants::REGISTER_COUNT;
use crate::constants::REGISTER_COUNT_FLT;
use crate::intrinsics::get_small_positive_float_bits;

pub type IntRegister = u64;
pub type IntRegisterArray = [IntRegister; REGISTER_COUNT];
type Addr = u32;

pub const REGISTER_FILE_SIZE: usize = 256;

/// A pair of doubles processed together by every floating point instruction.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FpuRegister {
    pub lo: f64,
    pub hi: f64,
}

impl FpuRegister {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn from_bits(lo: u64, hi: u64) -> Self {
        Self::new(f64::from_bits(lo), f64::from_bits(hi))
    }

    /// Converts two little-endian signed 32-bit integers.
    pub fn from_packed_i32(bytes: &[u8]) -> Self {
        let lo = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let hi = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self::new(lo as f64, hi as f64)
    }

    pub fn xor(self, other: Self) -> Self {
        Self::from_bits(
            self.lo.to_bits() ^ other.lo.to_bits(),
            self.hi.to_bits() ^ other.hi.to_bits(),
        )
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.lo), f(self.hi))
    }

    pub fn zip_with(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::new(f(self.lo, other.lo), f(self.hi, other.hi))
    }

    pub fn write_to(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.lo.to_bits().to_le_bytes());
        out[8..16].copy_from_slice(&self.hi.to_bits().to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegisterFile {
    pub r: IntRegisterArray,
    pub f: [FpuRegister; REGISTER_COUNT_FLT],
    pub e: [FpuRegister; REGISTER_COUNT_FLT],
    pub a: [FpuRegister; REGISTER_COUNT_FLT],
}

impl RegisterFile {
    /// `a` registers get fixed small positive values from the program
    /// entropy, two words per register.
    pub fn initialise_fpu_a(&mut self, entropy: &[u64]) {
        for (i, a) in self.a.iter_mut().enumerate() {
            *a = FpuRegister::from_bits(
                get_small_positive_float_bits(entropy[2 * i]),
                get_small_positive_float_bits(entropy[2 * i + 1]),
            );
        }
    }

    /// Overwrites `a` with the 64-byte scratchpad digest.
    pub fn set_a_from_bytes(&mut self, bytes: &[u8; 64]) {
        for (a, chunk) in self.a.iter_mut().zip(bytes.chunks_exact(16)) {
            let mut lo = [0u8; 8];
            let mut hi = [0u8; 8];
            lo.copy_from_slice(&chunk[..8]);
            hi.copy_from_slice(&chunk[8..]);
            *a = FpuRegister::from_bits(u64::from_le_bytes(lo), u64::from_le_bytes(hi));
        }
    }

    /// Serialized as `r`, `f`, `e`, `a`, every word little-endian.
    pub fn to_bytes(&self) -> [u8; REGISTER_FILE_SIZE] {
        let mut bytes = [0u8; REGISTER_FILE_SIZE];
        for (chunk, r) in bytes[..64].chunks_exact_mut(8).zip(self.r.iter()) {
            chunk.copy_from_slice(&r.to_le_bytes());
        }

        let fpu = self.f.iter().chain(self.e.iter()).chain(self.a.iter());
        for (chunk, register) in bytes[64..].chunks_exact_mut(16).zip(fpu) {
            register.write_to(chunk);
        }
        bytes
    }
}

/// Dataset read (`ma`) and prefetch (`mx`) addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRegisters {
    pub mx: Addr,
    pub ma: Addr,
}

impl MemoryRegisters {
    pub fn initialise_mem(&mut self, ma: u64, mx: u64) {
        self.ma = ma as Addr & CACHE_LINE_ALIGN_MASK;
        self.mx = mx as Addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_file_layout() {
        let mut reg = RegisterFile::default();
        reg.r[1] = 0x0102030405060708;
        reg.f[0] = FpuRegister::new(1.0, -2.0);
        reg.a[3] = FpuRegister::from_bits(u64::MAX, 7);

        let bytes = reg.to_bytes();
        assert_eq!(&bytes[8..16], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&bytes[64..72], &1.0f64.to_bits().to_le_bytes());
        assert_eq!(&bytes[72..80], &(-2.0f64).to_bits().to_le_bytes());
        assert_eq!(&bytes[240..248], &[0xff; 8]);
        assert_eq!(&bytes[248..256], &7u64.to_le_bytes());
    }

    #[test]
    fn a_registers_use_consecutive_entropy_words() {
        let entropy: Vec<u64> = (0..8).map(|i| i << 59).collect();
        let mut reg = RegisterFile::default();
        reg.initialise_fpu_a(&entropy);

        assert_eq!(reg.a[0], FpuRegister::new(1.0, 2.0));
        assert_eq!(reg.a[1], FpuRegister::new(4.0, 8.0));
        assert_eq!(reg.a[3].hi, 128.0);
    }

    #[test]
    fn packed_integers_convert_exactly() {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&(-5i32).to_le_bytes());
        bytes[4..].copy_from_slice(&i32::MAX.to_le_bytes());

        let register = FpuRegister::from_packed_i32(&bytes);
        assert_eq!(register, FpuRegister::new(-5.0, i32::MAX as f64));
    }

    #[test]
    fn memory_registers_align_ma() {
        let mut mem = MemoryRegisters::default();
        mem.initialise_mem(u64::MAX, 0x1_2345_6789);

        assert_eq!(mem.ma, 0x7fff_ffc0);
        assert_eq!(mem.mx, 0x2345_6789);
    }
}
