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

//! Superscalar program generator. Instructions are picked by simulating a
//! three port out-of-order core decoding 16 bytes per cycle, so every program
//! is emitted in exactly the order the scheduler accepted its macro-ops.

use bitflags::bitflags;

use super::SuperscalarKind;
use super::SuperscalarProgram;
use crate::constants::REGISTER_COUNT;
use crate::constants::REGISTER_NEEDS_DISPLACEMENT;
use crate::constants::RANDOMX_SUPERSCALAR_LATENCY;
use crate::constants::SUPERSCALAR_MAX_SIZE;
use crate::entropy::Blake2Generator;
use crate::instruction::Instruction;
use crate::intrinsics::is_zero_or_power_of_2;

const CYCLE_MAP_SIZE: usize = RANDOMX_SUPERSCALAR_LATENCY + 4;
const LOOK_FORWARD_CYCLES: usize = 4;
const MAX_THROWAWAY_COUNT: usize = 256;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ExecutionPort: u8 {
        const P0 = 1;
        const P1 = 2;
        const P5 = 4;
        const P01 = Self::P0.bits() | Self::P1.bits();
        const P05 = Self::P0.bits() | Self::P5.bits();
        const P015 = Self::P0.bits() | Self::P1.bits() | Self::P5.bits();
    }
}

/// An x86 macro-op, made of up to two uops. A macro-op with no uops is
/// eliminated by register renaming.
#[derive(Clone, Copy, Debug)]
struct MacroOp {
    latency: usize,
    uop1: ExecutionPort,
    uop2: ExecutionPort,
    dependent: bool,
}

impl MacroOp {
    const fn new(latency: usize, uop1: ExecutionPort, uop2: ExecutionPort) -> Self {
        Self {
            latency,
            uop1,
            uop2,
            dependent: false,
        }
    }

    const fn simple(latency: usize, uop: ExecutionPort) -> Self {
        Self::new(latency, uop, ExecutionPort::empty())
    }

    const fn dependent(self) -> Self {
        Self {
            dependent: true,
            ..self
        }
    }

    fn is_eliminated(&self) -> bool {
        self.uop1.is_empty()
    }

    fn is_simple(&self) -> bool {
        self.uop2.is_empty()
    }
}

const ADD_RI: MacroOp = MacroOp::simple(1, ExecutionPort::P015);
const LEA_SIB: MacroOp = MacroOp::simple(1, ExecutionPort::P01);
const SUB_RR: MacroOp = MacroOp::simple(1, ExecutionPort::P015);
const XOR_RR: MacroOp = MacroOp::simple(1, ExecutionPort::P015);
const XOR_RI: MacroOp = MacroOp::simple(1, ExecutionPort::P015);
const MOV_RR: MacroOp = MacroOp::new(0, ExecutionPort::empty(), ExecutionPort::empty());
const MUL_R: MacroOp = MacroOp::new(4, ExecutionPort::P1, ExecutionPort::P5);
const IMUL_R: MacroOp = MacroOp::new(4, ExecutionPort::P1, ExecutionPort::P5);
const MOV_RI64: MacroOp = MacroOp::simple(1, ExecutionPort::P015);
const ROR_RI: MacroOp = MacroOp::simple(1, ExecutionPort::P05);
const IMUL_RR: MacroOp = MacroOp::simple(3, ExecutionPort::P1);

/// Macro-op decomposition of an instruction and the indices of the ops that
/// read the source, pick the destination and produce the result.
#[derive(Debug)]
struct InstructionInfo {
    ops: &'static [MacroOp],
    result_op: usize,
    dst_op: usize,
    src_op: Option<usize>,
}

impl InstructionInfo {
    const fn single(op: &'static [MacroOp], src_op: Option<usize>) -> Self {
        Self {
            ops: op,
            result_op: 0,
            dst_op: 0,
            src_op,
        }
    }
}

const ISUB_R_INFO: InstructionInfo = InstructionInfo::single(&[SUB_RR], Some(0));
const IXOR_R_INFO: InstructionInfo = InstructionInfo::single(&[XOR_RR], Some(0));
const IADD_RS_INFO: InstructionInfo = InstructionInfo::single(&[LEA_SIB], Some(0));
const IMUL_R_INFO: InstructionInfo = InstructionInfo::single(&[IMUL_RR], Some(0));
const IROR_C_INFO: InstructionInfo = InstructionInfo::single(&[ROR_RI], None);
const IADD_C_INFO: InstructionInfo = InstructionInfo::single(&[ADD_RI], None);
const IXOR_C_INFO: InstructionInfo = InstructionInfo::single(&[XOR_RI], None);
const IMULH_R_INFO: InstructionInfo = InstructionInfo {
    ops: &[MOV_RR, MUL_R, MOV_RR],
    result_op: 1,
    dst_op: 0,
    src_op: Some(1),
};
const ISMULH_R_INFO: InstructionInfo = InstructionInfo {
    ops: &[MOV_RR, IMUL_R, MOV_RR],
    result_op: 1,
    dst_op: 0,
    src_op: Some(1),
};
const IMUL_RCP_INFO: InstructionInfo = InstructionInfo {
    ops: &[MOV_RI64, IMUL_RR.dependent()],
    result_op: 1,
    dst_op: 1,
    src_op: None,
};

fn info_of(kind: SuperscalarKind) -> &'static InstructionInfo {
    use SuperscalarKind::*;

    match kind {
        IsubR => &ISUB_R_INFO,
        IxorR => &IXOR_R_INFO,
        IaddRs => &IADD_RS_INFO,
        ImulR => &IMUL_R_INFO,
        IrorC => &IROR_C_INFO,
        IaddC7 | IaddC8 | IaddC9 => &IADD_C_INFO,
        IxorC7 | IxorC8 | IxorC9 => &IXOR_C_INFO,
        ImulhR => &IMULH_R_INFO,
        IsmulhR => &ISMULH_R_INFO,
        ImulRcp => &IMUL_RCP_INFO,
    }
}

/// One decode cycle: the instruction sizes the 16-byte fetch window is split
/// into.
#[derive(Debug)]
struct DecoderBuffer {
    index: usize,
    counts: &'static [usize],
}

const BUFFER_484: DecoderBuffer = DecoderBuffer { index: 0, counts: &[4, 8, 4] };
const BUFFER_7333: DecoderBuffer = DecoderBuffer { index: 1, counts: &[7, 3, 3, 3] };
const BUFFER_3733: DecoderBuffer = DecoderBuffer { index: 2, counts: &[3, 7, 3, 3] };
const BUFFER_493: DecoderBuffer = DecoderBuffer { index: 3, counts: &[4, 9, 3] };
const BUFFER_4444: DecoderBuffer = DecoderBuffer { index: 4, counts: &[4, 4, 4, 4] };
const BUFFER_3310: DecoderBuffer = DecoderBuffer { index: 5, counts: &[3, 3, 10] };

const RANDOM_BUFFERS: [&DecoderBuffer; 4] = [&BUFFER_484, &BUFFER_7333, &BUFFER_3733, &BUFFER_493];

impl DecoderBuffer {
    fn fetch_next(
        previous: Option<SuperscalarKind>,
        decode_cycle: usize,
        mul_count: usize,
        gen: &mut Blake2Generator,
    ) -> &'static DecoderBuffer {
        if matches!(previous, Some(SuperscalarKind::ImulhR | SuperscalarKind::IsmulhR)) {
            return &BUFFER_3310;
        }
        if mul_count < decode_cycle + 1 {
            return &BUFFER_4444;
        }
        if previous == Some(SuperscalarKind::ImulRcp) {
            return if gen.get_byte() & 1 == 1 {
                &BUFFER_484
            } else {
                &BUFFER_493
            };
        }
        RANDOM_BUFFERS[(gen.get_byte() & 3) as usize]
    }
}

#[derive(Clone, Copy, Debug)]
struct RegisterInfo {
    latency: usize,
    last_group: Option<SuperscalarKind>,
    last_par: i32,
}

impl Default for RegisterInfo {
    fn default() -> Self {
        Self {
            latency: 0,
            last_group: None,
            last_par: -1,
        }
    }
}

/// Instruction under construction.
#[derive(Debug)]
struct Candidate {
    kind: SuperscalarKind,
    info: &'static InstructionInfo,
    src: Option<usize>,
    // assigned at `info.dst_op`, which never comes after `info.result_op`
    dst: usize,
    mod_: u8,
    imm32: u32,
    group: SuperscalarKind,
    group_par: i32,
    can_reuse: bool,
    group_par_is_source: bool,
}

impl Candidate {
    fn for_slot(gen: &mut Blake2Generator, slot_size: usize, fetch_type: usize, is_last: bool) -> Self {
        use SuperscalarKind::*;

        let kind = match slot_size {
            3 if is_last => [IsubR, IxorR, ImulhR, IsmulhR][(gen.get_byte() & 3) as usize],
            3 => [IsubR, IxorR][(gen.get_byte() & 1) as usize],
            4 if fetch_type == BUFFER_4444.index && !is_last => ImulR,
            4 => [IrorC, IaddRs][(gen.get_byte() & 1) as usize],
            7 => [IxorC7, IaddC7][(gen.get_byte() & 1) as usize],
            8 => [IxorC8, IaddC8][(gen.get_byte() & 1) as usize],
            9 => [IxorC9, IaddC9][(gen.get_byte() & 1) as usize],
            _ => ImulRcp,
        };

        Self::create(kind, gen)
    }

    fn create(kind: SuperscalarKind, gen: &mut Blake2Generator) -> Self {
        use SuperscalarKind::*;

        let mut candidate = Self {
            kind,
            info: info_of(kind),
            src: None,
            dst: 0,
            mod_: 0,
            imm32: 0,
            group: kind,
            group_par: 0,
            can_reuse: false,
            group_par_is_source: false,
        };

        match kind {
            IsubR => {
                candidate.group = IaddRs;
                candidate.group_par_is_source = true;
            }
            IxorR | ImulR => candidate.group_par_is_source = true,
            IaddRs => {
                candidate.mod_ = gen.get_byte();
                candidate.group_par_is_source = true;
            }
            IrorC => {
                while candidate.imm32 == 0 {
                    candidate.imm32 = (gen.get_byte() & 63) as u32;
                }
                candidate.group_par = -1;
            }
            IaddC7 | IaddC8 | IaddC9 => {
                candidate.imm32 = gen.get_u32();
                candidate.group = IaddC7;
                candidate.group_par = -1;
            }
            IxorC7 | IxorC8 | IxorC9 => {
                candidate.imm32 = gen.get_u32();
                candidate.group = IxorC7;
                candidate.group_par = -1;
            }
            ImulhR | IsmulhR => {
                candidate.can_reuse = true;
                candidate.group_par = gen.get_u32() as i32;
            }
            ImulRcp => {
                candidate.imm32 = gen.get_u32();
                while is_zero_or_power_of_2(candidate.imm32 as u64) {
                    candidate.imm32 = gen.get_u32();
                }
                candidate.group_par = -1;
            }
        }

        candidate
    }

    fn select_source(
        &mut self,
        cycle: usize,
        registers: &[RegisterInfo; REGISTER_COUNT],
        gen: &mut Blake2Generator,
    ) -> bool {
        let available: Vec<usize> = (0..REGISTER_COUNT)
            .filter(|&i| registers[i].latency <= cycle)
            .collect();

        if available.len() == 2
            && self.kind == SuperscalarKind::IaddRs
            && available.contains(&REGISTER_NEEDS_DISPLACEMENT)
        {
            self.src = Some(REGISTER_NEEDS_DISPLACEMENT);
            self.group_par = REGISTER_NEEDS_DISPLACEMENT as i32;
            return true;
        }

        match select_register(&available, gen) {
            Some(src) => {
                self.src = Some(src);
                if self.group_par_is_source {
                    self.group_par = src as i32;
                }
                true
            }
            None => false,
        }
    }

    fn select_destination(
        &mut self,
        cycle: usize,
        allow_chained_mul: bool,
        registers: &[RegisterInfo; REGISTER_COUNT],
        gen: &mut Blake2Generator,
    ) -> bool {
        let available: Vec<usize> = (0..REGISTER_COUNT)
            .filter(|&i| {
                let reg = &registers[i];
                reg.latency <= cycle
                    && (self.can_reuse || self.src != Some(i))
                    && (allow_chained_mul
                        || self.group != SuperscalarKind::ImulR
                        || reg.last_group != Some(SuperscalarKind::ImulR))
                    && (reg.last_group != Some(self.group) || reg.last_par != self.group_par)
                    && (self.kind != SuperscalarKind::IaddRs || i != REGISTER_NEEDS_DISPLACEMENT)
            })
            .collect();

        match select_register(&available, gen) {
            Some(dst) => {
                self.dst = dst;
                true
            }
            None => false,
        }
    }

    fn to_instruction(&self) -> Instruction {
        Instruction::new(
            self.kind as u8,
            self.dst as u8,
            self.src.unwrap_or(self.dst) as u8,
            self.mod_,
            self.imm32,
        )
    }
}

fn select_register(available: &[usize], gen: &mut Blake2Generator) -> Option<usize> {
    match available.len() {
        0 => None,
        1 => Some(available[0]),
        len => Some(available[gen.get_u32() as usize % len]),
    }
}

/// Occupancy of ports P0, P1 and P5 for each simulated cycle.
struct PortScheduler {
    busy: [[bool; 3]; CYCLE_MAP_SIZE],
}

impl PortScheduler {
    fn new() -> Self {
        Self {
            busy: [[false; 3]; CYCLE_MAP_SIZE],
        }
    }

    fn schedule_uop(&mut self, uop: ExecutionPort, mut cycle: usize, commit: bool) -> Option<usize> {
        // P5 first, so that P0 and P1 stay free for the ops that need them
        const ORDER: [(ExecutionPort, usize); 3] = [
            (ExecutionPort::P5, 2),
            (ExecutionPort::P0, 0),
            (ExecutionPort::P1, 1),
        ];

        while cycle < CYCLE_MAP_SIZE {
            for (port, slot) in ORDER {
                if uop.contains(port) && !self.busy[cycle][slot] {
                    if commit {
                        self.busy[cycle][slot] = true;
                    }
                    return Some(cycle);
                }
            }
            cycle += 1;
        }
        None
    }

    fn schedule_mop(
        &mut self,
        mop: &MacroOp,
        cycle: usize,
        dep_cycle: usize,
        commit: bool,
    ) -> Option<usize> {
        let mut cycle = if mop.dependent { cycle.max(dep_cycle) } else { cycle };

        if mop.is_eliminated() {
            return Some(cycle);
        }
        if mop.is_simple() {
            return self.schedule_uop(mop.uop1, cycle, commit);
        }

        // both uops have to issue in the same cycle
        while cycle < CYCLE_MAP_SIZE {
            let first = self.schedule_uop(mop.uop1, cycle, false);
            let second = self.schedule_uop(mop.uop2, cycle, false);
            if let Some(scheduled) = first {
                if first == second {
                    if commit {
                        self.schedule_uop(mop.uop1, scheduled, true);
                        self.schedule_uop(mop.uop2, scheduled, true);
                    }
                    return Some(scheduled);
                }
            }
            cycle += 1;
        }
        None
    }
}

pub(super) fn generate(gen: &mut Blake2Generator) -> SuperscalarProgram {
    let mut ports = PortScheduler::new();
    let mut registers = [RegisterInfo::default(); REGISTER_COUNT];
    let mut instructions = Vec::with_capacity(SUPERSCALAR_MAX_SIZE);

    let mut current: Option<Candidate> = None;
    let mut macro_op_index = 0;
    let mut cycle = 0;
    let mut dep_cycle = 0;
    let mut ports_saturated = false;
    let mut mul_count = 0;
    let mut throw_away_count = 0;

    let mut decode_cycle = 0;
    while decode_cycle < RANDOMX_SUPERSCALAR_LATENCY
        && !ports_saturated
        && instructions.len() < SUPERSCALAR_MAX_SIZE
    {
        let previous = current.as_ref().map(|candidate| candidate.kind);
        let buffer = DecoderBuffer::fetch_next(previous, decode_cycle, mul_count, gen);

        let mut buffer_index = 0;
        while buffer_index < buffer.counts.len() {
            let top_cycle = cycle;

            let op_count = current.as_ref().map_or(0, |candidate| candidate.info.ops.len());
            if macro_op_index >= op_count {
                if ports_saturated || instructions.len() >= SUPERSCALAR_MAX_SIZE {
                    break;
                }
                let is_last = buffer.counts.len() == buffer_index + 1;
                current = Some(Candidate::for_slot(
                    gen,
                    buffer.counts[buffer_index],
                    buffer.index,
                    is_last,
                ));
                macro_op_index = 0;
            }
            let Some(candidate) = current.as_mut() else {
                break;
            };

            let mop = candidate.info.ops[macro_op_index];
            let Some(mut schedule_cycle) = ports.schedule_mop(&mop, cycle, dep_cycle, false) else {
                ports_saturated = true;
                break;
            };

            if candidate.info.src_op == Some(macro_op_index) {
                let mut forward = 0;
                while forward < LOOK_FORWARD_CYCLES
                    && !candidate.select_source(schedule_cycle, &registers, gen)
                {
                    schedule_cycle += 1;
                    cycle += 1;
                    forward += 1;
                }
                if forward == LOOK_FORWARD_CYCLES {
                    if throw_away_count < MAX_THROWAWAY_COUNT {
                        throw_away_count += 1;
                        macro_op_index = candidate.info.ops.len();
                        continue;
                    }
                    current = None;
                    break;
                }
            }

            if candidate.info.dst_op == macro_op_index {
                let allow_chained_mul = throw_away_count > 0;
                let mut forward = 0;
                while forward < LOOK_FORWARD_CYCLES
                    && !candidate.select_destination(
                        schedule_cycle,
                        allow_chained_mul,
                        &registers,
                        gen,
                    )
                {
                    schedule_cycle += 1;
                    cycle += 1;
                    forward += 1;
                }
                if forward == LOOK_FORWARD_CYCLES {
                    if throw_away_count < MAX_THROWAWAY_COUNT {
                        throw_away_count += 1;
                        macro_op_index = candidate.info.ops.len();
                        continue;
                    }
                    current = None;
                    break;
                }
            }
            throw_away_count = 0;

            let Some(schedule_cycle) =
                ports.schedule_mop(&mop, schedule_cycle, schedule_cycle, true)
            else {
                ports_saturated = true;
                break;
            };
            dep_cycle = schedule_cycle + mop.latency;

            if macro_op_index == candidate.info.result_op {
                let register = &mut registers[candidate.dst];
                register.latency = dep_cycle;
                register.last_group = Some(candidate.group);
                register.last_par = candidate.group_par;
            }

            buffer_index += 1;
            macro_op_index += 1;
            if schedule_cycle >= RANDOMX_SUPERSCALAR_LATENCY {
                ports_saturated = true;
            }
            cycle = top_cycle;

            if macro_op_index >= candidate.info.ops.len() {
                instructions.push(candidate.to_instruction());
                if candidate.kind.is_multiplication() {
                    mul_count += 1;
                }
            }
        }

        cycle += 1;
        decode_cycle += 1;
    }

    let address_register = address_register(&instructions);
    SuperscalarProgram {
        instructions,
        address_register,
    }
}

/// Register with the longest dependency chain assuming every instruction
/// takes a single cycle. Ties go to the lowest index.
fn address_register(instructions: &[Instruction]) -> usize {
    let mut latencies = [0usize; REGISTER_COUNT];
    for instr in instructions {
        let dst = instr.dst as usize;
        let src = instr.src as usize;
        let dst_latency = latencies[dst] + 1;
        let src_latency = if dst != src { latencies[src] + 1 } else { 0 };
        latencies[dst] = dst_latency.max(src_latency);
    }

    let mut address_register = 0;
    let mut max_latency = 0;
    for (register, &latency) in latencies.iter().enumerate() {
        if latency > max_latency {
            max_latency = latency;
            address_register = register;
        }
    }
    address_register
}
