// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::ir::program::{Instruction, IrProgram, OpCode};

/// Builds the fixed 2-rank AllReduce instruction graph.
///
/// Ported field-for-field from `backend/pcie_backend.cc`'s
/// `BuildAllReduceIR`: rank 0 stages its chunk to host and waits for the
/// reduce; rank 1 stages its chunk to host, reduces into rank 0's host
/// chunk, then both converge on rank 0's `H2D` (rank 1 keeps a copy to
/// mirror the original's instruction count, though only rank 0's `H2D`
/// feeds the caller's recv buffer on the 2-rank topology).
pub fn build_allreduce_ir(rank: i32) -> IrProgram {
    let mut program = IrProgram {
        input_chunk_count: 1,
        output_chunk_count: 1,
        instructions: Vec::new(),
    };

    if rank == 0 {
        program.instructions.push(Instruction {
            op: OpCode::D2H,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![],
            effects: vec![vec![0]],
        });
        program.instructions.push(Instruction {
            op: OpCode::H2D,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![vec![0, 0, 2]],
            effects: vec![],
        });
    } else {
        program.instructions.push(Instruction {
            op: OpCode::D2H,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 1,
            deps: vec![],
            effects: vec![vec![1]],
        });
        program.instructions.push(Instruction {
            op: OpCode::H2HReduce,
            src_numa: 0,
            src_chunk_idx: 1,
            dst_chunk_idx: 0,
            deps: vec![vec![0, 0, 1]],
            effects: vec![vec![0]],
        });
        program.instructions.push(Instruction {
            op: OpCode::H2D,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![vec![0, 0, 2]],
            effects: vec![],
        });
    }

    program
}

/// Builds the fixed 2-rank AllGather instruction graph: one input chunk,
/// two output chunks per rank. Ported from `BuildAllGatherIR`.
pub fn build_allgather_ir(rank: i32) -> IrProgram {
    let mut program = IrProgram {
        input_chunk_count: 1,
        output_chunk_count: 2,
        instructions: Vec::new(),
    };

    if rank == 0 {
        program.instructions.push(Instruction {
            op: OpCode::D2H,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![],
            effects: vec![vec![0]],
        });
        program.instructions.push(Instruction {
            op: OpCode::D2D,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![],
            effects: vec![],
        });
        program.instructions.push(Instruction {
            op: OpCode::H2D,
            src_numa: 0,
            src_chunk_idx: 1,
            dst_chunk_idx: 1,
            deps: vec![vec![0, 1, 1]],
            effects: vec![],
        });
    } else {
        program.instructions.push(Instruction {
            op: OpCode::D2H,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 1,
            deps: vec![],
            effects: vec![vec![1]],
        });
        program.instructions.push(Instruction {
            op: OpCode::D2D,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 1,
            deps: vec![],
            effects: vec![],
        });
        program.instructions.push(Instruction {
            op: OpCode::H2D,
            src_numa: 0,
            src_chunk_idx: 0,
            dst_chunk_idx: 0,
            deps: vec![vec![0, 0, 1]],
            effects: vec![],
        });
    }

    program
}
