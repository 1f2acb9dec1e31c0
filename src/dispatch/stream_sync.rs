// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::{
    backend::pcie::synchronize_pcie_stream,
    cfg::Config,
    core::{domain::StreamHandle, domain_manager::DomainManager},
    telemetry::stats::ExecStat,
};

/// Retires the pending collective registered on `stream`, ported
/// line-for-line from `core/stream_sync.cc`'s `OnStreamSynchronized` (§4.9).
///
/// Called after the vendor's own stream-synchronize call has already
/// returned success; a no-op if nothing was pending on this stream.
pub fn on_stream_synchronized(stream: StreamHandle, cfg: &Config) {
    let Some(pending) = DomainManager::global().take_stream_pending(stream) else {
        return;
    };
    let domain = &pending.domain;

    if pending.plan.use_pcie {
        if let Some(comm) = domain.pcie_comm() {
            synchronize_pcie_stream(comm.stream);
        }
    }

    domain.timer_fast.synchronize();
    if pending.plan.use_pcie {
        domain.timer_pcie.synchronize();
    }

    let stat = ExecStat {
        fast_time_secs: domain.timer_fast.elapsed_seconds(),
        pcie_time_secs: if pending.plan.use_pcie {
            domain.timer_pcie.elapsed_seconds()
        } else {
            0.0
        },
        fast_bytes: pending.plan.fast_bytes,
        pcie_bytes: pending.plan.pcie_bytes,
        fast_success: pending.fast_ok,
        pcie_success: pending.pcie_ok,
    };

    let nranks = domain.pcie_nranks();
    match (nranks > 1, domain.shm_store()) {
        (true, Some(shm)) => {
            let rank = domain.pcie_comm().map(|c| c.rank).unwrap_or(0);
            shm.write_my_stat(rank, pending.op_key, &stat);
            tracing::info!(
                rank,
                bytes = pending.op_key.total_bytes,
                fast_time = stat.fast_time_secs,
                pcie_time = stat.pcie_time_secs,
                "stream sync: wrote stat to shared memory"
            );
        }
        _ => {
            domain
                .controller
                .update(&domain.cache, pending.op_key, stat, cfg.pcie_enabled);
            tracing::info!(
                bytes = pending.op_key.total_bytes,
                fast_time = stat.fast_time_secs,
                pcie_time = stat.pcie_time_secs,
                fast_bytes = stat.fast_bytes,
                pcie_bytes = stat.pcie_bytes,
                "stream sync: updated controller directly"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        backend::common::BackendResult,
        controller::{controller::Controller, policy::AdaptivePolicyKind},
        core::{
            domain::Domain,
            domain_key::DomainKey,
            op_key::{DataType, OpKind},
            pending::PendingCollective,
            planner::Plan,
        },
    };

    fn domain() -> Arc<Domain> {
        let key = DomainKey::new(1, vec![0], b"stream-sync-test");
        Arc::new(Domain::new(key, Controller::new(AdaptivePolicyKind::Aimd)))
    }

    #[test]
    fn missing_pending_is_a_no_op() {
        let cfg = Config::default();
        on_stream_synchronized(StreamHandle(9001), &cfg);
    }

    #[test]
    fn single_rank_sync_updates_controller_and_clears_pending() {
        let d = domain();
        let cfg = Config::default();
        let stream = StreamHandle(9002);

        d.timer_fast.start(stream);
        d.timer_fast.stop(stream);

        let op_key = crate::core::op_key::OpKey::new(OpKind::AllReduce, 4096, DataType::Float32);
        DomainManager::global().register_stream_pending(stream, PendingCollective {
            domain: d.clone(),
            op_key,
            plan: Plan {
                fast_bytes: op_key.total_bytes,
                pcie_bytes: 0,
                use_pcie: false,
            },
            fast_ok: true,
            pcie_ok: true,
        });

        on_stream_synchronized(stream, &cfg);
        assert!(DomainManager::global().take_stream_pending(stream).is_none());

        let value = d.cache.get_or_default(op_key);
        assert!(value.alpha > 0.0);
        let _ = BackendResult::Success;
    }
}
