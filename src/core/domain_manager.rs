// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::{
    cfg::Config,
    controller::{controller::Controller, policy::AdaptivePolicyKind},
    core::{
        domain::{Domain, RawHandle, StreamHandle},
        domain_key::DomainKey,
        pending::PendingCollective,
    },
};

/// Process-wide registry mapping raw vendor handles to persistent logical
/// domains.
///
/// Three independent `DashMap`s replace the single mutex over three
/// `HashMap`s that `core/domain_manager.h` uses — see DESIGN.md for why
/// that's a deliberate deviation rather than a missed requirement. No
/// operation here needs atomicity across more than one of the three tables.
pub struct DomainManager {
    by_key: DashMap<DomainKey, Arc<Domain>>,
    by_raw_handle: DashMap<RawHandle, DomainKey>,
    pending_by_stream: DashMap<StreamHandle, PendingCollective>,
    policy: AdaptivePolicyKind,
}

static INSTANCE: OnceCell<DomainManager> = OnceCell::new();

impl DomainManager {
    fn new(policy: AdaptivePolicyKind) -> Self {
        Self {
            by_key: DashMap::new(),
            by_raw_handle: DashMap::new(),
            pending_by_stream: DashMap::new(),
            policy,
        }
    }

    /// The process-wide singleton, configured from `AMPCCL_ALGO` on first
    /// access. Mirrors the `OnceCell` self-reference pattern
    /// `client::pool_sessions::Pool` uses for its own process-lifetime state.
    pub fn global() -> &'static DomainManager {
        INSTANCE.get_or_init(|| {
            let cfg = Config::from_env();
            DomainManager::new(AdaptivePolicyKind::from(cfg.algorithm))
        })
    }

    /// Returns the existing `Domain` for `key`, or constructs one with a
    /// fresh `Controller` and empty cache.
    pub fn get_or_create_by_key(&self, key: DomainKey) -> Arc<Domain> {
        self.by_key
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Domain::new(key, Controller::new(self.policy))))
            .clone()
    }

    /// Ensures a `Domain` exists for `key` and records `raw -> key`.
    pub fn register_raw_comm(&self, raw: RawHandle, key: DomainKey) -> Arc<Domain> {
        let domain = self.get_or_create_by_key(key.clone());
        self.by_raw_handle.insert(raw, key);
        domain
    }

    pub fn get_domain_by_raw_comm(&self, raw: RawHandle) -> Option<Arc<Domain>> {
        let key = self.by_raw_handle.get(&raw)?.clone();
        self.by_key.get(&key).map(|d| d.clone())
    }

    /// Removes `raw -> key` only; the `Domain` stays reachable via a
    /// subsequent registration of the same key (§4.1).
    pub fn unregister_raw_comm(&self, raw: RawHandle) {
        self.by_raw_handle.remove(&raw);
    }

    /// Unconditional overwrite of any previous pending record on this stream.
    pub fn register_stream_pending(&self, stream: StreamHandle, pending: PendingCollective) {
        self.pending_by_stream.insert(stream, pending);
    }

    /// Atomically returns and removes the pending record for this stream, if any.
    pub fn take_stream_pending(&self, stream: StreamHandle) -> Option<PendingCollective> {
        self.pending_by_stream.remove(&stream).map(|(_, v)| v)
    }
}
