// SPDX-License-Identifier: AGPL-3.0-or-later

use dashmap::DashMap;

use crate::core::op_key::OpKey;

/// Per-OpKey adaptive state.
///
/// Defaults on first lookup per §3: `alpha=0.5`, `use_pcie=true`, both
/// bandwidths zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamValue {
    pub alpha: f64,
    pub use_pcie: bool,
    pub fast_bw_gbps: f64,
    pub pcie_bw_gbps: f64,
}

impl Default for ParamValue {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            use_pcie: true,
            fast_bw_gbps: 0.0,
            pcie_bw_gbps: 0.0,
        }
    }
}

/// Maps an [`OpKey`] to its current [`ParamValue`].
///
/// `DashMap`-backed, capped implicitly at 512 live entries by the shared
/// snapshot format used over shared memory (`ShmParamStore`'s
/// `ParamEntry[512]` table, §3); the in-process cache itself is unbounded
/// but in practice a process launches a bounded number of distinct OpKeys.
pub struct ParamCache {
    entries: DashMap<OpKey, ParamValue>,
}

impl Default for ParamCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get_or_default(&self, key: OpKey) -> ParamValue {
        *self.entries.entry(key).or_default()
    }

    pub fn set(&self, key: OpKey, value: ParamValue) {
        self.entries.insert(key, value);
    }

    /// Snapshot of every live entry, in arbitrary order, for publication to
    /// shared memory.
    pub fn snapshot(&self) -> Vec<(OpKey, ParamValue)> {
        self.entries
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    pub fn load_snapshot(&self, entries: impl IntoIterator<Item = (OpKey, ParamValue)>) {
        for (k, v) in entries {
            self.entries.insert(k, v);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
