// SPDX-License-Identifier: AGPL-3.0-or-later

//! spec.md §8 end-to-end scenario 2: 2-rank PCIe AllReduce, even split.

use std::sync::Arc;

use ampccl_shim::{
    cfg::Config,
    controller::{controller::Controller, policy::AdaptivePolicyKind},
    core::{
        domain::{Domain, PcieComm, StreamHandle},
        domain_key::DomainKey,
        domain_manager::DomainManager,
        op_key::DataType,
    },
    dispatch::{stream_sync::on_stream_synchronized, virtual_collective::all_reduce},
};

use crate::integration_tests::common::{ensure_doubles_installed, AlwaysOkVendor};

#[test]
fn two_rank_pcie_allreduce_splits_evenly_and_runs_both_backends() {
    ensure_doubles_installed();

    let key = DomainKey::new(2, vec![0, 1], b"scenario-2-two-rank-pcie");
    let domain = Arc::new(Domain::new(key, Controller::new(AdaptivePolicyKind::Static)));
    domain.set_pcie_comm(PcieComm {
        rank: 0,
        world_size: 2,
        stream: StreamHandle(0x5c02),
    });

    let vendor = AlwaysOkVendor::default();
    let cfg = Config::default();
    let caller_stream = StreamHandle(0x5c03);

    let one_mib = 1 << 20;
    let count = one_mib / DataType::Float32.size_bytes();
    let send = vec![0u8; one_mib];
    let mut recv = vec![0u8; one_mib];

    let result = all_reduce(&domain, &vendor, &send, &mut recv, count, DataType::Float32, 0, caller_stream, &cfg);
    assert!(result.is_success());

    let pending = DomainManager::global()
        .take_stream_pending(caller_stream)
        .expect("pending registered for caller stream");
    assert_eq!(pending.plan.fast_bytes, one_mib / 2);
    assert_eq!(pending.plan.pcie_bytes, one_mib / 2);
    assert!(pending.plan.use_pcie);
    assert_eq!(pending.plan.fast_bytes % 4, 0);
    assert_eq!(pending.plan.pcie_bytes % 4, 0);

    DomainManager::global().register_stream_pending(caller_stream, pending);
    on_stream_synchronized(caller_stream, &cfg);
    assert!(DomainManager::global().take_stream_pending(caller_stream).is_none());
}
