// SPDX-License-Identifier: AGPL-3.0-or-later

/// PCIe-runtime instruction opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Device-to-host copy.
    D2H,
    /// Device-to-device copy.
    D2D,
    /// Host-to-device copy.
    H2D,
    /// Host-to-host reduce (accumulate one host chunk into another).
    H2HReduce,
}

/// One step of a PCIe instruction graph.
///
/// `deps` and `effects` are opaque lists interpreted entirely by the PCIe
/// runtime (out of scope, §1) — this crate only needs to reproduce their
/// exact values, never their meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub src_numa: i32,
    pub src_chunk_idx: i32,
    pub dst_chunk_idx: i32,
    pub deps: Vec<Vec<i32>>,
    pub effects: Vec<Vec<i32>>,
}

/// A PCIe backend payload: chunk counts plus an ordered instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrProgram {
    pub input_chunk_count: u32,
    pub output_chunk_count: u32,
    pub instructions: Vec<Instruction>,
}
