// SPDX-License-Identifier: AGPL-3.0-or-later

use enum_dispatch::enum_dispatch;

use crate::{cache::param_cache::ParamValue, cfg::config::Algorithm, telemetry::stats::ExecStat};

const ALPHA_MIN: f64 = 0.1;
const ALPHA_MAX: f64 = 0.9;

/// Which concrete policy a freshly created `Domain`'s `Controller` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptivePolicyKind {
    Static,
    Aimd,
    Pid,
}

impl From<Algorithm> for AdaptivePolicyKind {
    fn from(algo: Algorithm) -> Self {
        match algo {
            Algorithm::Tcp => AdaptivePolicyKind::Aimd,
            Algorithm::Dcqcn => AdaptivePolicyKind::Pid,
            Algorithm::Static => AdaptivePolicyKind::Static,
        }
    }
}

/// Suggest/update/reset interface shared by all split policies.
///
/// `#[enum_dispatch]` gives static dispatch over a closed set of concrete
/// policy structs, the same pattern `models::common::SendingData` uses for
/// PDU variants — no vtable on the hot `suggest` path.
#[enum_dispatch]
pub trait AdaptivePolicy {
    /// Fraction of bytes routed to the fast backend, clamped to `[0.1, 0.9]`.
    fn suggest(&self, current: ParamValue) -> f64;
    /// Folds one launch's measurement into the policy's internal state.
    fn update(&mut self, stat: ExecStat);
    fn reset(&mut self);
}

/// Fixed split, never adapts.
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicy {
    alpha: f64,
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl AdaptivePolicy for StaticPolicy {
    fn suggest(&self, _current: ParamValue) -> f64 {
        self.alpha
    }

    fn update(&mut self, _stat: ExecStat) {}

    fn reset(&mut self) {
        self.alpha = 0.5;
    }
}

/// TCP-style additive-increase/multiplicative-decrease policy.
#[derive(Debug, Clone, Copy)]
pub struct AimdPolicy {
    alpha: f64,
    increase: f64,
    decrease: f64,
}

impl Default for AimdPolicy {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            increase: 0.01,
            decrease: 0.5,
        }
    }
}

impl AdaptivePolicy for AimdPolicy {
    fn suggest(&self, _current: ParamValue) -> f64 {
        self.alpha.clamp(ALPHA_MIN, ALPHA_MAX)
    }

    fn update(&mut self, stat: ExecStat) {
        if !stat.fast_success || !stat.pcie_success {
            self.alpha = (self.alpha * self.decrease).max(ALPHA_MIN);
            return;
        }

        let (fast, pcie) = (stat.fast_time_secs, stat.pcie_time_secs);
        if pcie > 1.1 * fast {
            self.alpha = (self.alpha * self.decrease).max(ALPHA_MIN);
        } else if pcie < 0.9 * fast {
            self.alpha = (self.alpha + self.increase).min(ALPHA_MAX);
        } else {
            self.alpha = (self.alpha + 0.005).min(ALPHA_MAX);
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// DCQCN-style PID controller on the pcie/fast bandwidth ratio.
#[derive(Debug, Clone, Copy)]
pub struct PidPolicy {
    alpha: f64,
    target_ratio: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    integral_err: f64,
    last_err: f64,
}

impl Default for PidPolicy {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            target_ratio: 1.0,
            kp: 0.1,
            ki: 0.01,
            kd: 0.001,
            integral_err: 0.0,
            last_err: 0.0,
        }
    }
}

impl AdaptivePolicy for PidPolicy {
    fn suggest(&self, _current: ParamValue) -> f64 {
        self.alpha
    }

    fn update(&mut self, stat: ExecStat) {
        if !stat.fast_success || !stat.pcie_success {
            self.alpha = (self.alpha * 0.8).max(ALPHA_MIN);
            return;
        }

        let fast_bw = stat.fast_bw_gbps();
        let pcie_bw = stat.pcie_bw_gbps();
        if fast_bw <= 0.0 || pcie_bw <= 0.0 {
            return;
        }

        let err = self.target_ratio - pcie_bw / fast_bw;
        self.integral_err = (self.integral_err + err).clamp(-1.0, 1.0);
        let deriv = err - self.last_err;
        self.last_err = err;

        self.alpha = (self.alpha + self.kp * err + self.ki * self.integral_err + self.kd * deriv)
            .clamp(ALPHA_MIN, ALPHA_MAX);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[enum_dispatch(AdaptivePolicy)]
#[derive(Clone, Copy)]
pub enum AdaptivePolicyImpl {
    Static(StaticPolicy),
    Aimd(AimdPolicy),
    Pid(PidPolicy),
}

impl AdaptivePolicyImpl {
    pub fn new(kind: AdaptivePolicyKind) -> Self {
        match kind {
            AdaptivePolicyKind::Static => AdaptivePolicyImpl::Static(StaticPolicy::default()),
            AdaptivePolicyKind::Aimd => AdaptivePolicyImpl::Aimd(AimdPolicy::default()),
            AdaptivePolicyKind::Pid => AdaptivePolicyImpl::Pid(PidPolicy::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_stat(fast: f64, pcie: f64) -> ExecStat {
        ExecStat {
            fast_time_secs: fast,
            pcie_time_secs: pcie,
            fast_bytes: 1 << 20,
            pcie_bytes: 1 << 20,
            fast_success: true,
            pcie_success: true,
        }
    }

    #[test]
    fn static_policy_is_invariant_under_update() {
        let mut p = StaticPolicy::default();
        let before = p.suggest(ParamValue::default());
        p.update(ok_stat(1.0, 2.0));
        assert_eq!(p.suggest(ParamValue::default()), before);
    }

    #[test]
    fn aimd_three_updates_with_pcie_twice_fast_matches_spec_sequence() {
        let mut p = AimdPolicy::default();
        let expected = [0.25, 0.125, 0.1];
        for want in expected {
            p.update(ok_stat(1.0, 2.0));
            assert!((p.suggest(ParamValue::default()) - want).abs() < 1e-9);
        }
    }

    #[test]
    fn aimd_failure_shrinks_alpha_multiplicatively() {
        let mut p = AimdPolicy::default();
        let mut stat = ok_stat(1.0, 1.0);
        stat.fast_success = false;
        p.update(stat);
        assert!((p.suggest(ParamValue::default()) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn aimd_stays_within_bounds_after_many_updates() {
        let mut p = AimdPolicy::default();
        for i in 0..200 {
            let pcie = if i % 2 == 0 { 2.0 } else { 0.5 };
            p.update(ok_stat(1.0, pcie));
            let a = p.suggest(ParamValue::default());
            assert!((ALPHA_MIN..=ALPHA_MAX).contains(&a));
        }
    }

    #[test]
    fn pid_stays_within_bounds_after_many_updates() {
        let mut p = PidPolicy::default();
        for i in 0..200 {
            let pcie_bytes = if i % 3 == 0 { 1 << 20 } else { 1 << 10 };
            p.update(ExecStat {
                fast_time_secs: 1.0,
                pcie_time_secs: 1.0,
                fast_bytes: 1 << 20,
                pcie_bytes,
                fast_success: true,
                pcie_success: true,
            });
            let a = p.suggest(ParamValue::default());
            assert!((ALPHA_MIN..=ALPHA_MAX).contains(&a));
        }
    }

    #[test]
    fn pid_ignores_update_when_a_bandwidth_is_zero() {
        let mut p = PidPolicy::default();
        let before = p.suggest(ParamValue::default());
        p.update(ExecStat {
            fast_time_secs: 0.0,
            pcie_time_secs: 1.0,
            fast_bytes: 1 << 20,
            pcie_bytes: 1 << 20,
            fast_success: true,
            pcie_success: true,
        });
        assert_eq!(p.suggest(ParamValue::default()), before);
    }
}
