// SPDX-License-Identifier: AGPL-3.0-or-later

//! spec.md §8 end-to-end scenario 2 (second half) and the `ShmParamStore`
//! testable properties: two independent `Domain`s standing in for two
//! separate rank processes, wired together only through the real
//! POSIX-shared-memory segment their shared `DomainKey` derives.

use std::sync::Arc;

use ampccl_shim::{
    controller::{controller::Controller, policy::AdaptivePolicyKind},
    core::{
        domain::{Domain, PcieComm, StreamHandle},
        domain_key::DomainKey,
        op_key::{DataType, OpKey, OpKind},
    },
    telemetry::stats::ExecStat,
};

fn rank_domain(key: &DomainKey, rank: i32) -> Arc<Domain> {
    let domain = Arc::new(Domain::new(key.clone(), Controller::new(AdaptivePolicyKind::Static)));
    domain.set_pcie_comm(PcieComm {
        rank,
        world_size: 2,
        stream: StreamHandle(0x5c10 + rank as usize),
    });
    domain
}

#[test]
fn rank0_aggregates_both_ranks_stats_and_republishes_params() {
    let key = DomainKey::new(2, vec![0, 1], b"scenario-shm-cross-rank-aggregation");
    let rank0 = rank_domain(&key, 0);
    let rank1 = rank_domain(&key, 1);

    let op_key = OpKey::new(OpKind::AllReduce, 1 << 18, DataType::Float32);

    let stat_rank0 = ExecStat {
        fast_time_secs: 0.010,
        pcie_time_secs: 0.004,
        fast_bytes: 1 << 17,
        pcie_bytes: 1 << 17,
        fast_success: true,
        pcie_success: true,
    };
    let stat_rank1 = ExecStat {
        fast_time_secs: 0.012,
        pcie_time_secs: 0.009,
        fast_bytes: 1 << 17,
        pcie_bytes: 1 << 17,
        fast_success: true,
        pcie_success: true,
    };

    let shm0 = rank0.shm_store().expect("rank 0 attaches the segment");
    shm0.write_my_stat(0, op_key, &stat_rank0);
    let shm1 = rank1.shm_store().expect("rank 1 attaches the same segment");
    shm1.write_my_stat(1, op_key, &stat_rank1);

    assert!(shm0.is_rank0());
    assert!(!shm1.is_rank0());

    let (aggregated, agg_key) = shm0
        .read_all_stats_and_aggregate()
        .expect("both slots are valid");
    assert_eq!(agg_key, op_key);
    // Per Open Question (c): bytes come from the last valid slot scanned,
    // not summed, since every rank issued the same plan.
    assert_eq!(aggregated.fast_bytes, 1 << 17);
    assert!(aggregated.fast_success);
    assert!(aggregated.pcie_success);
    // Max across ranks of each backend's own time.
    assert!((aggregated.fast_time_secs - 0.012).abs() < 1e-12);
    assert!((aggregated.pcie_time_secs - 0.009).abs() < 1e-12);

    rank0
        .controller
        .update(&rank0.cache, agg_key, aggregated, true);
    shm0.write_params(&rank0.cache);

    shm1.read_params(&rank1.cache);
    let propagated = rank1.cache.get_or_default(op_key);
    let local = rank0.cache.get_or_default(op_key);
    assert_eq!(propagated.alpha, local.alpha);
    assert_eq!(propagated.use_pcie, local.use_pcie);
}
