// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Mutex;

use crate::{
    cache::param_cache::{ParamCache, ParamValue},
    controller::policy::{AdaptivePolicy, AdaptivePolicyImpl, AdaptivePolicyKind},
    core::op_key::OpKey,
    telemetry::stats::ExecStat,
};

/// Owns one adaptive policy instance and mediates its interaction with a
/// domain's [`ParamCache`] (§4.4).
pub struct Controller {
    policy: Mutex<AdaptivePolicyImpl>,
}

impl Controller {
    pub fn new(kind: AdaptivePolicyKind) -> Self {
        Self {
            policy: Mutex::new(AdaptivePolicyImpl::new(kind)),
        }
    }

    /// Suggests α for `key`, clamped to the policy's bounds.
    pub fn suggest(&self, cache: &ParamCache, key: OpKey) -> f64 {
        let current = cache.get_or_default(key);
        let policy = self.policy.lock().unwrap_or_else(|e| e.into_inner());
        policy.suggest(current)
    }

    /// Folds `stat` into the policy and republishes the resulting
    /// [`ParamValue`] into `cache` for `key`, per §4.4: `use_pcie` becomes
    /// true only when PCIe is globally enabled, the PCIe half itself
    /// succeeded, and its measured bandwidth was positive.
    pub fn update(&self, cache: &ParamCache, key: OpKey, stat: ExecStat, pcie_enabled: bool) {
        let new_alpha = {
            let mut policy = self.policy.lock().unwrap_or_else(|e| e.into_inner());
            policy.update(stat);
            policy.suggest(cache.get_or_default(key))
        };

        let fast_bw = stat.fast_bw_gbps();
        let pcie_bw = stat.pcie_bw_gbps();
        let use_pcie = pcie_enabled && stat.pcie_success && pcie_bw > 0.0;

        cache.set(key, ParamValue {
            alpha: new_alpha,
            use_pcie,
            fast_bw_gbps: fast_bw,
            pcie_bw_gbps: pcie_bw,
        });
    }

    pub fn reset(&self) {
        self.policy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::op_key::{DataType, OpKind};

    fn key() -> OpKey {
        OpKey::new(OpKind::AllReduce, 1024, DataType::Float32)
    }

    #[test]
    fn update_republishes_param_value_into_cache() {
        let cache = ParamCache::new();
        let ctl = Controller::new(AdaptivePolicyKind::Aimd);
        let stat = ExecStat {
            fast_time_secs: 1.0,
            pcie_time_secs: 0.5,
            fast_bytes: 1 << 20,
            pcie_bytes: 1 << 20,
            fast_success: true,
            pcie_success: true,
        };
        ctl.update(&cache, key(), stat, true);
        let v = cache.get_or_default(key());
        assert!(v.use_pcie);
        assert!(v.alpha > 0.5);
    }

    #[test]
    fn update_clears_use_pcie_when_globally_disabled() {
        let cache = ParamCache::new();
        let ctl = Controller::new(AdaptivePolicyKind::Static);
        let stat = ExecStat {
            fast_time_secs: 1.0,
            pcie_time_secs: 1.0,
            fast_bytes: 1 << 20,
            pcie_bytes: 1 << 20,
            fast_success: true,
            pcie_success: true,
        };
        ctl.update(&cache, key(), stat, false);
        assert!(!cache.get_or_default(key()).use_pcie);
    }
}
