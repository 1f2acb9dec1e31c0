// SPDX-License-Identifier: AGPL-3.0-or-later

use once_cell::sync::OnceCell;

use crate::{
    backend::{common::BackendResult, pcie::init_pcie_comm},
    cfg::Config,
    core::{
        domain::{PcieComm, RawHandle, StreamHandle},
        domain_key::DomainKey,
        domain_manager::DomainManager,
        op_key::DataType,
    },
    dispatch::{stream_sync::on_stream_synchronized, virtual_collective},
    intercept::vendor,
};

static CONFIG: OnceCell<Config> = OnceCell::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

fn backend_result_to_code(result: BackendResult) -> i32 {
    if result.is_success() { 0 } else { -1 }
}

/// Builds a buffer `DomainKey` from a vendor unique-id blob, assigning rank
/// indices `0..nranks` as the rank set (§4.1's `BuildKeyFromNcclInit`
/// equivalent).
fn domain_key_from_init(nranks: i32, unique_id: &[u8]) -> DomainKey {
    DomainKey::new(nranks, (0..nranks).collect(), unique_id)
}

/// Fetches the calling rank's unique-id blob from the vendor library.
///
/// # Safety
/// `out_ptr` must be valid for writes of `out_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ampccl_get_unique_id(out_ptr: *mut u8, out_len: usize) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let id = vendor.get_unique_id();
    let n = id.len().min(out_len);
    if out_ptr.is_null() {
        return -1;
    }
    // SAFETY: caller guarantees `out_ptr` is valid for `out_len` writes; `n <= out_len`.
    unsafe { std::ptr::copy_nonoverlapping(id.as_ptr(), out_ptr, n) };
    0
}

/// Initializes a communicator, registering its Domain on success.
///
/// # Safety
/// `comm_out` must be valid for one `usize` write; `unique_id_ptr` must be
/// valid for reads of `unique_id_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ampccl_comm_init_rank(
    comm_out: *mut usize,
    nranks: i32,
    unique_id_ptr: *const u8,
    unique_id_len: usize,
    rank: i32,
) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    if comm_out.is_null() {
        return -1;
    }
    // SAFETY: caller guarantees `unique_id_ptr` is valid for `unique_id_len` reads.
    let unique_id = unsafe { std::slice::from_raw_parts(unique_id_ptr, unique_id_len) };

    let raw = vendor.comm_init_rank(nranks, unique_id, rank);
    // SAFETY: caller guarantees `comm_out` is valid for one write.
    unsafe { *comm_out = raw };

    let cfg = config();
    if !cfg.enabled {
        return 0;
    }

    let key = domain_key_from_init(nranks, unique_id);
    let domain = DomainManager::global().register_raw_comm(RawHandle(raw), key);

    if cfg.pcie_enabled && nranks > 1 {
        if let Some(stream) = init_pcie_comm(rank, nranks) {
            domain.set_pcie_comm(PcieComm {
                rank,
                world_size: nranks,
                stream,
            });
        }
    }

    0
}

#[unsafe(no_mangle)]
pub extern "C" fn ampccl_comm_destroy(comm: usize) -> i32 {
    DomainManager::global().unregister_raw_comm(RawHandle(comm));
    match vendor::original() {
        Some(vendor) => {
            vendor.comm_destroy(comm);
            0
        }
        None => -1,
    }
}

/// # Safety
/// `sendbuf`/`recvbuf` must be valid for `count * datatype size` bytes of
/// read/write respectively, and must not alias.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ampccl_all_reduce(
    sendbuf: *const u8,
    recvbuf: *mut u8,
    count: usize,
    datatype: i32,
    op: i32,
    comm: usize,
    stream: usize,
) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let dtype = DataType::from_wire_code(datatype);
    let nbytes = count * dtype.size_bytes();
    let stream_handle = StreamHandle(stream);

    let Some(domain) = DomainManager::global().get_domain_by_raw_comm(RawHandle(comm)) else {
        return backend_result_to_code(vendor.all_reduce(
            // SAFETY: caller guarantees validity for `nbytes` bytes.
            unsafe { std::slice::from_raw_parts(sendbuf, nbytes) },
            // SAFETY: same as above.
            unsafe { std::slice::from_raw_parts_mut(recvbuf, nbytes) },
            dtype,
            op,
            stream_handle,
        ));
    };

    // SAFETY: caller guarantees validity for `nbytes` bytes; buffers don't alias.
    let send = unsafe { std::slice::from_raw_parts(sendbuf, nbytes) };
    // SAFETY: same as above.
    let recv = unsafe { std::slice::from_raw_parts_mut(recvbuf, nbytes) };

    let result = virtual_collective::all_reduce(
        &domain, vendor, send, recv, count, dtype, op, stream_handle, config(),
    );
    backend_result_to_code(result)
}

/// # Safety
/// Same buffer-validity contract as [`ampccl_all_reduce`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ampccl_all_gather(
    sendbuf: *const u8,
    recvbuf: *mut u8,
    sendcount: usize,
    datatype: i32,
    comm: usize,
    stream: usize,
) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let dtype = DataType::from_wire_code(datatype);
    let send_bytes = sendcount * dtype.size_bytes();
    let stream_handle = StreamHandle(stream);

    let Some(domain) = DomainManager::global().get_domain_by_raw_comm(RawHandle(comm)) else {
        return backend_result_to_code(vendor.all_gather(
            // SAFETY: caller guarantees validity for `send_bytes` bytes.
            unsafe { std::slice::from_raw_parts(sendbuf, send_bytes) },
            // SAFETY: recv buffer holds the gathered result across all ranks.
            unsafe { std::slice::from_raw_parts_mut(recvbuf, send_bytes) },
            dtype,
            stream_handle,
        ));
    };

    // SAFETY: caller guarantees validity for `send_bytes` bytes.
    let send = unsafe { std::slice::from_raw_parts(sendbuf, send_bytes) };
    // SAFETY: same as above.
    let recv = unsafe { std::slice::from_raw_parts_mut(recvbuf, send_bytes) };

    let result = virtual_collective::all_gather(
        &domain, vendor, send, recv, sendcount, dtype, stream_handle, config(),
    );
    backend_result_to_code(result)
}

/// # Safety
/// Same buffer-validity contract as [`ampccl_all_reduce`].
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ampccl_reduce_scatter(
    sendbuf: *const u8,
    recvbuf: *mut u8,
    recvcount: usize,
    datatype: i32,
    op: i32,
    comm: usize,
    stream: usize,
) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let dtype = DataType::from_wire_code(datatype);
    let recv_bytes = recvcount * dtype.size_bytes();
    let stream_handle = StreamHandle(stream);

    let Some(domain) = DomainManager::global().get_domain_by_raw_comm(RawHandle(comm)) else {
        return backend_result_to_code(vendor.reduce_scatter(
            // SAFETY: caller guarantees validity for the full send buffer.
            unsafe { std::slice::from_raw_parts(sendbuf, recv_bytes) },
            // SAFETY: caller guarantees validity for `recv_bytes` bytes.
            unsafe { std::slice::from_raw_parts_mut(recvbuf, recv_bytes) },
            dtype,
            op,
            stream_handle,
        ));
    };

    // SAFETY: caller guarantees validity for the full send buffer.
    let send = unsafe { std::slice::from_raw_parts(sendbuf, recv_bytes) };
    // SAFETY: caller guarantees validity for `recv_bytes` bytes.
    let recv = unsafe { std::slice::from_raw_parts_mut(recvbuf, recv_bytes) };

    let result = virtual_collective::reduce_scatter(
        &domain, vendor, send, recv, recvcount, dtype, op, stream_handle, config(),
    );
    backend_result_to_code(result)
}

/// # Safety
/// Same buffer-validity contract as [`ampccl_all_reduce`].
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ampccl_broadcast(
    sendbuf: *const u8,
    recvbuf: *mut u8,
    count: usize,
    datatype: i32,
    root: i32,
    comm: usize,
    stream: usize,
) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let dtype = DataType::from_wire_code(datatype);
    let nbytes = count * dtype.size_bytes();
    let stream_handle = StreamHandle(stream);

    let Some(domain) = DomainManager::global().get_domain_by_raw_comm(RawHandle(comm)) else {
        return backend_result_to_code(vendor.broadcast(
            // SAFETY: caller guarantees validity for `nbytes` bytes.
            unsafe { std::slice::from_raw_parts(sendbuf, nbytes) },
            // SAFETY: same as above.
            unsafe { std::slice::from_raw_parts_mut(recvbuf, nbytes) },
            dtype,
            root,
            stream_handle,
        ));
    };

    // SAFETY: caller guarantees validity for `nbytes` bytes.
    let send = unsafe { std::slice::from_raw_parts(sendbuf, nbytes) };
    // SAFETY: same as above.
    let recv = unsafe { std::slice::from_raw_parts_mut(recvbuf, nbytes) };

    let result = virtual_collective::broadcast(
        &domain, vendor, send, recv, count, dtype, root, stream_handle, config(),
    );
    backend_result_to_code(result)
}

/// Forwards to the vendor's own stream sync, then retires any pending
/// collective on this stream (§4.9) once that sync has succeeded.
#[unsafe(no_mangle)]
pub extern "C" fn ampccl_synchronize_stream(stream: usize) -> i32 {
    let Some(vendor) = vendor::original() else {
        return -1;
    };
    let stream_handle = StreamHandle(stream);
    if !vendor.synchronize_stream(stream_handle) {
        return -1;
    }
    on_stream_synchronized(stream_handle, config());
    0
}
