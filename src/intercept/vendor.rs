// SPDX-License-Identifier: AGPL-3.0-or-later

use once_cell::sync::OnceCell;

use crate::{
    backend::common::BackendResult,
    core::{domain::StreamHandle, op_key::DataType},
};

/// The resolved "original" vendor entry points a production LD_PRELOAD shim
/// would obtain via `dlopen`/`dlsym` (`hook/nccl_hook.cc`'s
/// `LoadOriginalFunctions`). Real symbol resolution is out of this crate's
/// scope (§1) — this trait is the seam a host process fills in once, and
/// the fast backend (§4.7) calls through it unconditionally.
pub trait VendorCollectives: Send + Sync {
    fn all_reduce(
        &self,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        dtype: DataType,
        op: i32,
        stream: StreamHandle,
    ) -> BackendResult;

    fn all_gather(
        &self,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        dtype: DataType,
        stream: StreamHandle,
    ) -> BackendResult;

    fn reduce_scatter(
        &self,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        dtype: DataType,
        op: i32,
        stream: StreamHandle,
    ) -> BackendResult;

    fn broadcast(
        &self,
        sendbuf: &[u8],
        recvbuf: &mut [u8],
        dtype: DataType,
        root: i32,
        stream: StreamHandle,
    ) -> BackendResult;

    fn get_unique_id(&self) -> Vec<u8>;

    fn comm_init_rank(&self, nranks: i32, unique_id: &[u8], rank: i32) -> usize;

    fn comm_destroy(&self, comm: usize);

    /// Returns whether the vendor's stream sync reported success.
    fn synchronize_stream(&self, stream: StreamHandle) -> bool;
}

static ORIGINAL: OnceCell<Box<dyn VendorCollectives>> = OnceCell::new();

/// Installs the resolved vendor entry points. Must be called exactly once
/// by the host process before any intercepted call arrives; a second call
/// is rejected (returns `Err`) rather than silently replacing the first —
/// matching the "record original function pointers once" non-reentrance
/// rule in §5.
pub fn install(vendor: Box<dyn VendorCollectives>) -> Result<(), Box<dyn VendorCollectives>> {
    ORIGINAL.set(vendor)
}

pub fn original() -> Option<&'static dyn VendorCollectives> {
    ORIGINAL.get().map(|b| b.as_ref())
}
