// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::{
    cache::param_cache::ParamCache,
    controller::controller::Controller,
    core::domain_key::DomainKey,
    shm::store::ShmParamStore,
    telemetry::timer::Timer,
};

/// Opaque vendor communicator/stream handle.
///
/// Wraps whatever integer identity the vendor call gave us (typically a
/// pointer value) purely as a hash-map key; per §9 "Opaque handle mapping"
/// it carries no safety claim about the value it wraps and must never be
/// dereferenced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Opaque device-stream identity, same non-dereferencing contract as
/// [`RawHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub usize);

/// The PCIe-side communicator state a `Domain` needs once it is known to
/// participate in a multi-rank PCIe exchange. `None` until the first
/// collective launch populates it (domains start with "no PCIe handles
/// yet", §4.1).
#[derive(Debug, Clone, Copy)]
pub struct PcieComm {
    pub rank: i32,
    pub world_size: i32,
    pub stream: StreamHandle,
}

/// The library's logical, persistent view of a communicator.
///
/// Owned exclusively by [`crate::core::domain_manager::DomainManager`]
/// behind an `Arc`; created on first registration of a raw handle for a
/// given [`DomainKey`] and lives until process teardown (§3).
pub struct Domain {
    pub key: DomainKey,
    pub controller: Controller,
    pub cache: ParamCache,
    pcie_comm: Mutex<Option<PcieComm>>,
    pub timer_fast: Timer,
    pub timer_pcie: Timer,
    shm: OnceCell<ShmParamStore>,
}

impl Domain {
    pub fn new(key: DomainKey, controller: Controller) -> Self {
        Self {
            key,
            controller,
            cache: ParamCache::new(),
            pcie_comm: Mutex::new(None),
            timer_fast: Timer::new(),
            timer_pcie: Timer::new(),
            shm: OnceCell::new(),
        }
    }

    pub fn pcie_comm(&self) -> Option<PcieComm> {
        *self.pcie_comm.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_pcie_comm(&self, comm: PcieComm) {
        *self.pcie_comm.lock().unwrap_or_else(|e| e.into_inner()) = Some(comm);
    }

    pub fn pcie_nranks(&self) -> i32 {
        self.pcie_comm().map(|c| c.world_size).unwrap_or(1)
    }

    /// Attaches (or returns the already-attached) shared-memory store for
    /// this domain's key. Lazily created the first time a domain is found
    /// to have `pcie_nranks > 1` (§4.6). Returns `None` until a PCIe
    /// communicator has been established, since the rank/world_size the
    /// segment needs only become known at that point.
    pub fn shm_store(&self) -> Option<&ShmParamStore> {
        let comm = self.pcie_comm()?;
        self.shm
            .get_or_try_init(|| ShmParamStore::attach(&self.key, comm.rank, comm.world_size))
            .inspect_err(|err| {
                tracing::warn!(error = %err, "shared-memory attach failed, degrading to single-rank mode");
            })
            .ok()
    }
}
