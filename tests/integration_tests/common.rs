// SPDX-License-Identifier: AGPL-3.0-or-later

use ampccl_shim::{
    backend::pcie::{install_runtime, PcieRuntime},
    core::domain::{PcieComm, StreamHandle},
    intercept::vendor::{install, VendorCollectives},
    ir::program::IrProgram,
    backend::common::BackendResult,
    core::op_key::DataType,
};

/// Deterministic vendor double: every collective and lifecycle call
/// succeeds, `comm_init_rank` hands out sequential handles.
#[derive(Default)]
pub struct AlwaysOkVendor {
    next_handle: std::sync::atomic::AtomicUsize,
}

impl VendorCollectives for AlwaysOkVendor {
    fn all_reduce(&self, _: &[u8], _: &mut [u8], _: DataType, _: i32, _: StreamHandle) -> BackendResult {
        BackendResult::Success
    }

    fn all_gather(&self, _: &[u8], _: &mut [u8], _: DataType, _: StreamHandle) -> BackendResult {
        BackendResult::Success
    }

    fn reduce_scatter(&self, _: &[u8], _: &mut [u8], _: DataType, _: i32, _: StreamHandle) -> BackendResult {
        BackendResult::Success
    }

    fn broadcast(&self, _: &[u8], _: &mut [u8], _: DataType, _: i32, _: StreamHandle) -> BackendResult {
        BackendResult::Success
    }

    fn get_unique_id(&self) -> Vec<u8> {
        b"integration-test-unique-id".to_vec()
    }

    fn comm_init_rank(&self, _nranks: i32, _unique_id: &[u8], _rank: i32) -> usize {
        self.next_handle
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }

    fn comm_destroy(&self, _comm: usize) {}

    fn synchronize_stream(&self, _stream: StreamHandle) -> bool {
        true
    }
}

/// Deterministic PCIe runtime double: every `submit`/`synchronize_stream`
/// succeeds, `init_comm` hands back a fixed stream per call.
#[derive(Default)]
pub struct AlwaysOkPcieRuntime;

impl PcieRuntime for AlwaysOkPcieRuntime {
    fn submit(&self, _comm: PcieComm, _program: &IrProgram, _sendbuf: &[u8], _recvbuf: &mut [u8], _count: usize) -> bool {
        true
    }

    fn synchronize_stream(&self, _stream: StreamHandle) -> bool {
        true
    }

    fn init_comm(&self, _rank: i32, _world_size: i32) -> Option<StreamHandle> {
        Some(StreamHandle(0xcafe))
    }
}

/// Installs the test vendor/PCIe-runtime doubles if nothing else in this
/// test binary has already done so. Both seams are one-shot `OnceCell`s
/// shared by the whole integration-test process, so a second install from
/// another scenario module is expected to fail and is ignored.
pub fn ensure_doubles_installed() {
    let _ = install(Box::new(AlwaysOkVendor::default()));
    let _ = install_runtime(Box::new(AlwaysOkPcieRuntime));
}
