// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
    backend::common::BackendResult,
    core::domain::{Domain, PcieComm, StreamHandle},
    ir::{
        builder::{build_allgather_ir, build_allreduce_ir},
        program::IrProgram,
    },
};

/// The PCIe CCL runtime that actually executes instruction graphs — out of
/// this crate's scope (§1). Modeled as a trait so the backend can be tested
/// without linking one.
pub trait PcieRuntime: Send + Sync {
    fn submit(
        &self,
        comm: PcieComm,
        program: &IrProgram,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        count: usize,
    ) -> bool;

    /// Blocks until `stream` has drained, mirroring `pcclSynchronizeStream`
    /// (`core/stream_sync.cc`). The stream-sync handler calls this before
    /// reading timer elapsed values.
    fn synchronize_stream(&self, stream: StreamHandle) -> bool;

    /// Creates the PCIe communicator and stream for one rank of a group,
    /// mirroring `pcclInit` (`core/comm_init.cc`'s `InitPCIeForDomain`).
    /// Returns `None` on failure, leaving the domain fast-only.
    fn init_comm(&self, rank: i32, world_size: i32) -> Option<StreamHandle>;
}

static RUNTIME: OnceCell<Box<dyn PcieRuntime>> = OnceCell::new();

pub fn install_runtime(runtime: Box<dyn PcieRuntime>) -> Result<(), Box<dyn PcieRuntime>> {
    RUNTIME.set(runtime)
}

fn runtime() -> Option<&'static dyn PcieRuntime> {
    RUNTIME.get().map(|b| b.as_ref())
}

/// Synchronizes `stream` on the installed PCIe runtime, if any. Returns
/// `true` when there is no runtime installed (nothing to wait on).
pub fn synchronize_pcie_stream(stream: StreamHandle) -> bool {
    runtime().map(|rt| rt.synchronize_stream(stream)).unwrap_or(true)
}

/// Initializes the PCIe communicator for `(rank, world_size)` on the
/// installed runtime, if any. `None` when no runtime is installed — the
/// domain then stays fast-only, same as `AMPCCL_ENABLE_PCIE=0` (§7).
pub fn init_pcie_comm(rank: i32, world_size: i32) -> Option<StreamHandle> {
    runtime()?.init_comm(rank, world_size)
}

/// Host-memory-staged transport driven by the two-rank instruction graph
/// builders in [`crate::ir::builder`] (§4.7).
#[derive(Debug, Default, Clone, Copy)]
pub struct PcieBackend;

impl PcieBackend {
    fn two_rank_comm(domain: &Arc<Domain>) -> Option<PcieComm> {
        domain.pcie_comm().filter(|c| c.world_size == 2)
    }

    pub fn all_reduce(
        &self,
        domain: &Arc<Domain>,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        count: usize,
    ) -> BackendResult {
        let Some(comm) = Self::two_rank_comm(domain) else {
            return BackendResult::Success;
        };
        let Some(rt) = runtime() else {
            return BackendResult::Success;
        };
        let program = build_allreduce_ir(comm.rank);
        if rt.submit(comm, &program, sendbuf, recvbuf, count) {
            BackendResult::Success
        } else {
            BackendResult::UnhandledError
        }
    }

    pub fn all_gather(
        &self,
        domain: &Arc<Domain>,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        count: usize,
    ) -> BackendResult {
        let Some(comm) = Self::two_rank_comm(domain) else {
            return BackendResult::Success;
        };
        let Some(rt) = runtime() else {
            return BackendResult::Success;
        };
        let program = build_allgather_ir(comm.rank);
        if rt.submit(comm, &program, sendbuf, recvbuf, count) {
            BackendResult::Success
        } else {
            BackendResult::UnhandledError
        }
    }

    /// Stub: the PCIe backend is never exercised for `ReduceScatter` (§4.5,
    /// Open Question (a)).
    pub fn reduce_scatter(&self, _domain: &Arc<Domain>) -> BackendResult {
        BackendResult::Success
    }

    /// Stub: the PCIe backend is never exercised for `Broadcast` (§4.5,
    /// Open Question (a)).
    pub fn broadcast(&self, _domain: &Arc<Domain>) -> BackendResult {
        BackendResult::Success
    }
}
