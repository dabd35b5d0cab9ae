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

use ironlight_types::ResultHash;
use ironlight_types::RANDOMX_RESULT_SIZE;

use crate::bytecode_machine::load64;
use crate::bytecode_machine::store64;
use crate::bytecode_machine::BytecodeMachine;
use crate::bytecode_machine::NativeRegisterFile;
use crate::cache::Cache;
use crate::cache::CacheHandle;
use crate::cache::CacheRawAPI;
use crate::constants::CACHE_LINE_ALIGN_MASK;
use crate::constants::CACHE_LINE_SIZE;
use crate::constants::DATASET_EXTRA_ITEMS;
use crate::constants::RANDOMX_PROGRAM_COUNT;
use crate::constants::RANDOMX_PROGRAM_ITERATIONS;
use crate::constants::RANDOMX_SCRATCHPAD_L3;
use crate::constants::REGISTER_COUNT_FLT;
use crate::constants::SCRATCHPAD_L3_MASK64;
use crate::dataset::Dataset;
use crate::dataset::DatasetHandle;
use crate::dataset::DatasetRawAPI;
use crate::entropy::blake2b;
use crate::entropy::fill_aes_1rx4;
use crate::entropy::hash_aes_1rx4;
use crate::entropy::AesGenerator1R;
use crate::entropy::AesHasher1R;
use crate::errors::RandomXError;
use crate::errors::VmCreationError;
use crate::flags::RandomXFlags;
use crate::intrinsics::mask_register_exponent_mantissa;
use crate::intrinsics::RoundingMode;
use crate::program::Program;
use crate::program::ProgramConfiguration;
use crate::registers::FpuRegister;
use crate::registers::IntRegisterArray;
use crate::registers::MemoryRegisters;
use crate::registers::RegisterFile;
use crate::RResult;

type Seed = [u8; 64];

/// Where the VM main loop takes its dataset items from.
pub trait ItemSource {
    /// XORs dataset item `item_number` into `r`.
    fn xor_item(&self, item_number: u64, r: &mut IntRegisterArray);
}

fn xor_words(r: &mut IntRegisterArray, item: &[u64]) {
    for (register, word) in r.iter_mut().zip(item) {
        *register ^= word;
    }
}

impl ItemSource for Cache {
    fn xor_item(&self, item_number: u64, r: &mut IntRegisterArray) {
        xor_words(r, &self.raw().init_dataset_item(item_number));
    }
}

impl ItemSource for CacheHandle {
    fn xor_item(&self, item_number: u64, r: &mut IntRegisterArray) {
        xor_words(r, &self.raw().init_dataset_item(item_number));
    }
}

impl ItemSource for Dataset {
    fn xor_item(&self, item_number: u64, r: &mut IntRegisterArray) {
        xor_words(r, self.raw().item(item_number));
    }
}

impl ItemSource for DatasetHandle {
    fn xor_item(&self, item_number: u64, r: &mut IntRegisterArray) {
        xor_words(r, self.raw().item(item_number));
    }
}

/// A RandomX virtual machine with its own scratchpad. Light VMs hold a cache
/// and compute every item they read, fast VMs hold the full dataset.
pub struct RandomXVM<T> {
    reg: RegisterFile,
    mem: MemoryRegisters,
    config: ProgramConfiguration,
    scratchpad: Vec<u8>,
    temp_hash: Seed,
    dataset_offset: u64,
    rounding: RoundingMode,
    // a hash started by `hash_first` or `hash_next` still waits for its result
    pending: bool,
    state: T,
}

impl<T: std::fmt::Debug> std::fmt::Debug for RandomXVM<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomXVM")
            .field("reg", &self.reg)
            .field("mem", &self.mem)
            .field("pending", &self.pending)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T> RandomXVM<T>
where
    T: CacheRawAPI + ItemSource,
{
    pub fn light(cache: T, flags: RandomXFlags) -> RResult<Self> {
        if !flags.is_light_mode() {
            return Err(VmCreationError::IncorrectLightModeFlag { flags })?;
        }

        Self::with_state(cache)
    }
}

impl<T> RandomXVM<T>
where
    T: DatasetRawAPI + ItemSource,
{
    pub fn fast(dataset: T, flags: RandomXFlags) -> RResult<Self> {
        if !flags.is_fast_mode() {
            return Err(VmCreationError::IncorrectFastModeFlag { flags })?;
        }

        Self::with_state(dataset)
    }
}

impl<T: ItemSource> RandomXVM<T> {
    fn with_state(state: T) -> RResult<Self> {
        let mut scratchpad = Vec::new();
        scratchpad
            .try_reserve_exact(RANDOMX_SCRATCHPAD_L3)
            .map_err(|_| RandomXError::ScratchpadAllocationFailed {
                size: RANDOMX_SCRATCHPAD_L3,
            })?;
        scratchpad.resize(RANDOMX_SCRATCHPAD_L3, 0);

        Ok(Self {
            reg: RegisterFile::default(),
            mem: MemoryRegisters::default(),
            config: ProgramConfiguration::default(),
            scratchpad,
            temp_hash: [0; 64],
            dataset_offset: 0,
            rounding: RoundingMode::default(),
            pending: false,
            state,
        })
    }

    /// Calculates a RandomX hash value.
    pub fn hash(&mut self, local_nonce: &[u8]) -> ResultHash {
        self.temp_hash = blake2b_64(local_nonce);
        fill_aes_1rx4(&mut self.temp_hash, &mut self.scratchpad);
        self.pending = false;

        self.run_chain();
        self.reg.set_a_from_bytes(&hash_aes_1rx4(&self.scratchpad));
        self.final_result()
    }

    /// Begins a RandomX hash calculation.
    pub fn hash_first(&mut self, local_nonce: &[u8]) {
        self.temp_hash = blake2b_64(local_nonce);
        fill_aes_1rx4(&mut self.temp_hash, &mut self.scratchpad);
        self.pending = true;
    }

    /// Output the hash value of the previous input
    /// and begin the calculation of the next hash.
    /// Must follow `hash_first` or another `hash_next`.
    pub fn hash_next(&mut self, local_nonce: &[u8]) -> ResultHash {
        self.run_chain();

        self.temp_hash = blake2b_64(local_nonce);
        let digest = hash_and_fill(&mut self.temp_hash, &mut self.scratchpad);
        self.reg.set_a_from_bytes(&digest);
        self.pending = true;

        self.final_result()
    }

    /// Output the hash value of the previous input.
    /// Returns `None` when no hash was started.
    pub fn hash_last(&mut self) -> Option<ResultHash> {
        if !self.pending {
            return None;
        }

        self.pending = false;
        self.run_chain();
        self.reg.set_a_from_bytes(&hash_aes_1rx4(&self.scratchpad));
        Some(self.final_result())
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    /// Runs the eight chained programs of one hash from `temp_hash`.
    fn run_chain(&mut self) {
        self.rounding = RoundingMode::Nearest;

        for _ in 0..RANDOMX_PROGRAM_COUNT - 1 {
            self.run();
            self.temp_hash = blake2b_64(&self.reg.to_bytes());
        }
        self.run();
    }

    fn run(&mut self) {
        let program = Program::with_seed(&self.temp_hash);
        self.initialize(&program);
        self.execute(&program);
    }

    fn initialize(&mut self, program: &Program) {
        self.reg.initialise_fpu_a(&program.entropy_buffer[..2 * REGISTER_COUNT_FLT]);
        self.mem
            .initialise_mem(program.get_entropy(8), program.get_entropy(10));
        self.config = ProgramConfiguration::new_with_entropy(
            program.get_entropy(14),
            program.get_entropy(15),
            program.get_entropy(12),
        );
        self.dataset_offset = program.get_entropy(13) % (DATASET_EXTRA_ITEMS + 1) * CACHE_LINE_SIZE;
    }

    fn execute(&mut self, program: &Program) {
        let machine = BytecodeMachine::compile(&program.program_buffer);
        let mut nreg = NativeRegisterFile::from_fp_registers(&self.reg.a);
        let config = self.config;

        let mut sp_addr0 = self.mem.mx;
        let mut sp_addr1 = self.mem.ma;

        for _ in 0..RANDOMX_PROGRAM_ITERATIONS {
            let sp_mix = nreg.r[config.read_reg0] ^ nreg.r[config.read_reg1];
            sp_addr0 ^= sp_mix as u32;
            sp_addr0 &= SCRATCHPAD_L3_MASK64;
            sp_addr1 ^= (sp_mix >> 32) as u32;
            sp_addr1 &= SCRATCHPAD_L3_MASK64;

            let (sp0, sp1) = (sp_addr0 as usize, sp_addr1 as usize);
            for (i, r) in nreg.r.iter_mut().enumerate() {
                *r ^= load64(&self.scratchpad, sp0 + 8 * i);
            }
            for i in 0..REGISTER_COUNT_FLT {
                nreg.f[i] = FpuRegister::from_packed_i32(&self.scratchpad[sp1 + 8 * i..]);
                let e = FpuRegister::from_packed_i32(
                    &self.scratchpad[sp1 + 8 * (REGISTER_COUNT_FLT + i)..],
                );
                nreg.e[i] = FpuRegister::new(
                    mask_register_exponent_mantissa(e.lo, config.e_mask[0]),
                    mask_register_exponent_mantissa(e.hi, config.e_mask[1]),
                );
            }

            machine.execute(&mut nreg, &mut self.scratchpad, &config.e_mask, &mut self.rounding);

            self.mem.mx ^= (nreg.r[config.read_reg2] ^ nreg.r[config.read_reg3]) as u32;
            self.mem.mx &= CACHE_LINE_ALIGN_MASK;
            let item_number = (self.dataset_offset + self.mem.ma as u64) / CACHE_LINE_SIZE;
            self.state.xor_item(item_number, &mut nreg.r);
            std::mem::swap(&mut self.mem.mx, &mut self.mem.ma);

            for (i, r) in nreg.r.iter().enumerate() {
                store64(&mut self.scratchpad, sp1 + 8 * i, *r);
            }
            for i in 0..REGISTER_COUNT_FLT {
                nreg.f[i] = nreg.f[i].xor(nreg.e[i]);
                nreg.f[i].write_to(&mut self.scratchpad[sp0 + 16 * i..]);
            }

            sp_addr0 = 0;
            sp_addr1 = 0;
        }

        self.reg.r = nreg.r;
        self.reg.f = nreg.f;
        self.reg.e = nreg.e;
    }

    fn final_result(&self) -> ResultHash {
        let mut hash = ResultHash::empty();
        hash.as_mut()
            .copy_from_slice(&blake2b(&self.reg.to_bytes(), RANDOMX_RESULT_SIZE, None));
        hash
    }
}

fn blake2b_64(data: &[u8]) -> Seed {
    let digest = blake2b(data, 64, None);
    let mut seed = [0u8; 64];
    seed.copy_from_slice(&digest);
    seed
}

/// Hashes the current scratchpad while refilling it from `seed`, block by
/// block, as one pass.
fn hash_and_fill(seed: &mut Seed, scratchpad: &mut [u8]) -> [u8; 64] {
    let mut hasher = AesHasher1R::new();
    let mut generator = AesGenerator1R::new(seed);
    let mut block = [0u8; 64];

    for chunk in scratchpad.chunks_exact_mut(64) {
        block.copy_from_slice(chunk);
        hasher.absorb(&block);
        generator.next_block(&mut block);
        chunk.copy_from_slice(&block);
    }

    generator.store(seed);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_cache;

    #[test]
    fn seed_is_the_512_bit_digest() {
        let input = b"This is a test";
        let seed = blake2b_64(input);

        assert_eq!(seed.to_vec(), blake2b(input, 64, None));
        assert_ne!(seed, blake2b_64(b"This is a tesu"));
    }

    #[test]
    fn light_no_creates_with_full_mem() {
        let flags = RandomXFlags::recommended_full_mem();
        let vm = RandomXVM::light(test_cache().handle(), flags);

        assert!(matches!(
            vm,
            Err(RandomXError::VMCreationFailed(
                VmCreationError::IncorrectLightModeFlag { .. }
            ))
        ));
    }

    #[test]
    fn fast_no_creates_without_full_mem() {
        let dataset = Dataset::from_items(vec![0; 8]);
        let vm = RandomXVM::fast(dataset.handle(), RandomXFlags::recommended());

        assert!(matches!(
            vm,
            Err(RandomXError::VMCreationFailed(
                VmCreationError::IncorrectFastModeFlag { .. }
            ))
        ));
    }

    #[test]
    fn hash_and_fill_matches_separate_passes() {
        let mut scratchpad: Vec<u8> = (0..4096u32).map(|i| (i * 7) as u8).collect();
        let mut seed = [3u8; 64];

        let mut expected_pad = vec![0u8; scratchpad.len()];
        let mut expected_seed = seed;
        let expected_digest = hash_aes_1rx4(&scratchpad);
        fill_aes_1rx4(&mut expected_seed, &mut expected_pad);

        let digest = hash_and_fill(&mut seed, &mut scratchpad);

        assert_eq!(digest, expected_digest);
        assert_eq!(scratchpad, expected_pad);
        assert_eq!(seed, expected_seed);
    }

    #[test]
    fn hash_last_without_first_is_none() {
        let mut vm = RandomXVM::light(test_cache().handle(), RandomXFlags::default()).unwrap();
        assert!(vm.hash_last().is_none());
    }

    #[test]
    fn pipelined_hashes_match_sequential() {
        let mut vm = RandomXVM::light(test_cache().handle(), RandomXFlags::default()).unwrap();
        let inputs: [&[u8]; 3] = [b"first", b"second", b"third"];
        let sequential: Vec<ResultHash> = inputs.iter().map(|input| vm.hash(input)).collect();

        vm.hash_first(inputs[0]);
        let first = vm.hash_next(inputs[1]);
        let second = vm.hash_next(inputs[2]);
        let third = vm.hash_last().unwrap();

        assert_eq!(vec![first, second, third], sequential);
        assert!(vm.hash_last().is_none());
    }
}
