// SPDX-License-Identifier: AGPL-3.0-or-later

//! spec.md §8 end-to-end scenario 1: 1-rank AllReduce, PCIe disabled.

use std::sync::Arc;

use ampccl_shim::{
    cfg::Config,
    controller::{controller::Controller, policy::AdaptivePolicyKind},
    core::{
        domain::{Domain, StreamHandle},
        domain_key::DomainKey,
        domain_manager::DomainManager,
        op_key::{DataType, OpKind},
    },
    dispatch::{stream_sync::on_stream_synchronized, virtual_collective::all_reduce},
};

use crate::integration_tests::common::{ensure_doubles_installed, AlwaysOkVendor};

#[test]
fn single_rank_pcie_disabled_allreduce_stays_fast_only_and_updates_controller() {
    ensure_doubles_installed();

    let key = DomainKey::new(1, vec![0], b"scenario-1-single-rank");
    let domain = Arc::new(Domain::new(key, Controller::new(AdaptivePolicyKind::Static)));
    let vendor = AlwaysOkVendor::default();
    let mut cfg = Config::default();
    cfg.pcie_enabled = false;
    let stream = StreamHandle(0x5c01);

    let one_mib = 1 << 20;
    let count = one_mib / DataType::Float32.size_bytes();
    let send = vec![0u8; one_mib];
    let mut recv = vec![0u8; one_mib];

    let result = all_reduce(&domain, &vendor, &send, &mut recv, count, DataType::Float32, 0, stream, &cfg);
    assert!(result.is_success());

    on_stream_synchronized(stream, &cfg);
    assert!(DomainManager::global().take_stream_pending(stream).is_none());

    let op_key = ampccl_shim::core::op_key::OpKey::new(OpKind::AllReduce, count, DataType::Float32);
    let value = domain.cache.get_or_default(op_key);
    // Static policy never adapts, but `update` still republishes the entry
    // with `use_pcie=false` since PCIe was globally disabled for this call.
    assert!(!value.use_pcie);
}
