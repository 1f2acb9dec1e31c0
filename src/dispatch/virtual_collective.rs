// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use crate::{
    backend::{common::BackendResult, fast::FastBackend, pcie::PcieBackend},
    cfg::Config,
    core::{
        domain::{Domain, StreamHandle},
        domain_manager::DomainManager,
        op_key::{DataType, OpKey, OpKind},
        pending::PendingCollective,
        planner::{create_plan, PlannerConfig},
    },
    intercept::vendor::VendorCollectives,
};

/// Steps 1-4 of §4.2, shared by every collective: build the `OpKey`,
/// aggregate/republish shared stats when this domain is rank 0 of a
/// multi-rank PCIe group, read parameters into the local cache, ask the
/// controller to suggest α, and plan the split.
fn prepare(domain: &Arc<Domain>, kind: OpKind, count: usize, dtype: DataType, cfg: &Config) -> (OpKey, crate::core::planner::Plan) {
    let op_key = OpKey::new(kind, count, dtype);

    if domain.pcie_nranks() > 1 {
        if let Some(shm) = domain.shm_store() {
            if shm.is_rank0() {
                if let Some((stat, agg_key)) = shm.read_all_stats_and_aggregate() {
                    domain.controller.update(&domain.cache, agg_key, stat, cfg.pcie_enabled);
                    shm.write_params(&domain.cache);
                }
            }
            shm.read_params(&domain.cache);
        }
    }

    let alpha = domain.controller.suggest(&domain.cache, op_key);
    let param = domain.cache.get_or_default(op_key);
    let planner_cfg = PlannerConfig::from(cfg);
    let plan = create_plan(op_key.total_bytes, alpha, param.use_pcie, &planner_cfg);

    (op_key, plan)
}

fn register_pending(
    domain: &Arc<Domain>,
    caller_stream: StreamHandle,
    op_key: OpKey,
    plan: crate::core::planner::Plan,
    fast_result: BackendResult,
    pcie_result: BackendResult,
) -> BackendResult {
    DomainManager::global().register_stream_pending(caller_stream, PendingCollective {
        domain: domain.clone(),
        op_key,
        plan,
        fast_ok: fast_result.is_success(),
        pcie_ok: pcie_result.is_success(),
    });

    if fast_result.is_success() && pcie_result.is_success() {
        BackendResult::Success
    } else {
        BackendResult::UnhandledError
    }
}

/// AllReduce: splits `[0, fast_bytes)` to the fast backend and
/// `[fast_bytes, total)` to the 2-rank PCIe backend when the plan calls for
/// it, recording each half's timer on its own stream (§4.2 step 5).
#[allow(clippy::too_many_arguments)]
pub fn all_reduce(
    domain: &Arc<Domain>,
    vendor: &dyn VendorCollectives,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    count: usize,
    dtype: DataType,
    op: i32,
    caller_stream: StreamHandle,
    cfg: &Config,
) -> BackendResult {
    let (op_key, plan) = prepare(domain, OpKind::AllReduce, count, dtype, cfg);
    let elem_size = dtype.size_bytes();
    let pcie_stream = domain.pcie_comm().map(|c| c.stream);

    let (fast_result, pcie_result) = if plan.use_pcie && plan.pcie_bytes > 0 && pcie_stream.is_some() {
        let pcie_stream = pcie_stream.unwrap_or_else(|| unreachable!("checked is_some above"));
        let (send_fast, send_pcie) = sendbuf.split_at(plan.fast_bytes);
        let (recv_fast, recv_pcie) = recvbuf.split_at_mut(plan.fast_bytes);

        domain.timer_fast.start(caller_stream);
        let fast_result = FastBackend.all_reduce(vendor, send_fast, recv_fast, dtype, op, caller_stream);
        domain.timer_fast.stop(caller_stream);

        domain.timer_pcie.start(pcie_stream);
        let pcie_result = PcieBackend.all_reduce(domain, send_pcie, recv_pcie, plan.pcie_bytes / elem_size);
        domain.timer_pcie.stop(pcie_stream);

        (fast_result, pcie_result)
    } else {
        domain.timer_fast.start(caller_stream);
        let fast_result = FastBackend.all_reduce(vendor, sendbuf, recvbuf, dtype, op, caller_stream);
        domain.timer_fast.stop(caller_stream);
        (fast_result, BackendResult::Success)
    };

    register_pending(domain, caller_stream, op_key, plan, fast_result, pcie_result)
}

/// AllGather: `sendcount` is the per-rank input element count. The PCIe
/// half's recv buffer holds two chunks (this rank's plus its peer's), so
/// its per-chunk element count is `pcie_bytes / (2 * elem_size)`, ported
/// from `core/virtual_collective.h`'s `AllGather`.
pub fn all_gather(
    domain: &Arc<Domain>,
    vendor: &dyn VendorCollectives,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    sendcount: usize,
    dtype: DataType,
    caller_stream: StreamHandle,
    cfg: &Config,
) -> BackendResult {
    let (op_key, plan) = prepare(domain, OpKind::AllGather, sendcount, dtype, cfg);
    let elem_size = dtype.size_bytes();
    let pcie_stream = domain.pcie_comm().map(|c| c.stream);

    let (fast_result, pcie_result) = if plan.use_pcie && plan.pcie_bytes > 0 && pcie_stream.is_some() {
        let pcie_stream = pcie_stream.unwrap_or_else(|| unreachable!("checked is_some above"));
        let (send_fast, send_pcie) = sendbuf.split_at(plan.fast_bytes);
        let (recv_fast, recv_pcie) = recvbuf.split_at_mut(plan.fast_bytes);

        domain.timer_fast.start(caller_stream);
        let fast_result = FastBackend.all_gather(vendor, send_fast, recv_fast, dtype, caller_stream);
        domain.timer_fast.stop(caller_stream);

        domain.timer_pcie.start(pcie_stream);
        let pcie_chunk_elems = plan.pcie_bytes / (2 * elem_size);
        let pcie_result = PcieBackend.all_gather(domain, send_pcie, recv_pcie, pcie_chunk_elems);
        domain.timer_pcie.stop(pcie_stream);

        (fast_result, pcie_result)
    } else {
        domain.timer_fast.start(caller_stream);
        let fast_result = FastBackend.all_gather(vendor, sendbuf, recvbuf, dtype, caller_stream);
        domain.timer_fast.stop(caller_stream);
        (fast_result, BackendResult::Success)
    };

    register_pending(domain, caller_stream, op_key, plan, fast_result, pcie_result)
}

/// ReduceScatter is always fast-only: the PCIe backend for it is a stub
/// that ignores its buffers (§4.5, Open Question (a) — resolved here as
/// "never split", not merely "never submit a program").
pub fn reduce_scatter(
    domain: &Arc<Domain>,
    vendor: &dyn VendorCollectives,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    recvcount: usize,
    dtype: DataType,
    op: i32,
    caller_stream: StreamHandle,
    cfg: &Config,
) -> BackendResult {
    let (op_key, mut plan) = prepare(domain, OpKind::ReduceScatter, recvcount, dtype, cfg);
    plan.fast_bytes = op_key.total_bytes;
    plan.pcie_bytes = 0;
    plan.use_pcie = false;

    domain.timer_fast.start(caller_stream);
    let fast_result = FastBackend.reduce_scatter(vendor, sendbuf, recvbuf, dtype, op, caller_stream);
    domain.timer_fast.stop(caller_stream);
    let pcie_result = PcieBackend.reduce_scatter(domain);

    register_pending(domain, caller_stream, op_key, plan, fast_result, pcie_result)
}

/// Broadcast is always fast-only, same rationale as [`reduce_scatter`].
#[allow(clippy::too_many_arguments)]
pub fn broadcast(
    domain: &Arc<Domain>,
    vendor: &dyn VendorCollectives,
    sendbuf: &[u8],
    recvbuf: &mut [u8],
    count: usize,
    dtype: DataType,
    root: i32,
    caller_stream: StreamHandle,
    cfg: &Config,
) -> BackendResult {
    let (op_key, mut plan) = prepare(domain, OpKind::Broadcast, count, dtype, cfg);
    plan.fast_bytes = op_key.total_bytes;
    plan.pcie_bytes = 0;
    plan.use_pcie = false;

    domain.timer_fast.start(caller_stream);
    let fast_result = FastBackend.broadcast(vendor, sendbuf, recvbuf, dtype, root, caller_stream);
    domain.timer_fast.stop(caller_stream);
    let pcie_result = PcieBackend.broadcast(domain);

    register_pending(domain, caller_stream, op_key, plan, fast_result, pcie_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::{controller::Controller, policy::AdaptivePolicyKind},
        core::domain_key::DomainKey,
        intercept::vendor::mock::MockVendor,
    };

    fn single_rank_domain() -> Arc<Domain> {
        let key = DomainKey::new(1, vec![0], b"virtual-collective-test");
        Arc::new(Domain::new(key, Controller::new(AdaptivePolicyKind::Static)))
    }

    #[test]
    fn all_reduce_below_min_msg_size_stays_fast_only_and_registers_pending() {
        let domain = single_rank_domain();
        let vendor = MockVendor::default();
        let cfg = Config::default();
        let stream = StreamHandle(11);
        let send = vec![0u8; 1024];
        let mut recv = vec![0u8; 1024];

        let result = all_reduce(&domain, &vendor, &send, &mut recv, 256, DataType::Float32, 0, stream, &cfg);
        assert_eq!(result, BackendResult::Success);

        let pending = DomainManager::global()
            .take_stream_pending(stream)
            .expect("pending registered");
        assert_eq!(pending.plan.pcie_bytes, 0);
        assert!(!pending.plan.use_pcie);
    }

    #[test]
    fn reduce_scatter_never_splits_even_when_payload_is_large() {
        let domain = single_rank_domain();
        let vendor = MockVendor::default();
        let mut cfg = Config::default();
        cfg.pcie_enabled = true;
        let stream = StreamHandle(12);
        let send = vec![0u8; 1 << 20];
        let mut recv = vec![0u8; 1 << 20];

        let result = reduce_scatter(&domain, &vendor, &send, &mut recv, (1 << 20) / 4, DataType::Float32, 0, stream, &cfg);
        assert_eq!(result, BackendResult::Success);

        let pending = DomainManager::global()
            .take_stream_pending(stream)
            .expect("pending registered");
        assert!(!pending.plan.use_pcie);
        assert_eq!(pending.plan.pcie_bytes, 0);
        assert_eq!(pending.plan.fast_bytes, 1 << 20);
    }
}
