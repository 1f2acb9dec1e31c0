// SPDX-License-Identifier: AGPL-3.0-or-later

/// Configuration the planner needs; a view over [`crate::cfg::Config`]'s
/// relevant fields so the planner stays a pure function of its arguments.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub pcie_globally_enabled: bool,
    pub min_msg_size: usize,
    pub min_chunk_size: usize,
}

impl From<&crate::cfg::Config> for PlannerConfig {
    fn from(cfg: &crate::cfg::Config) -> Self {
        Self {
            pcie_globally_enabled: cfg.pcie_enabled,
            min_msg_size: cfg.min_msg_size,
            min_chunk_size: cfg.min_chunk_size,
        }
    }
}

/// Split decision for one collective launch.
///
/// Invariant: `fast_bytes + pcie_bytes <= total_bytes`, and every non-zero
/// chunk is `>= min_chunk_size`. If no valid split exists the whole payload
/// goes to the fast backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub fast_bytes: usize,
    pub pcie_bytes: usize,
    pub use_pcie: bool,
}

fn round_up_4(n: usize) -> usize {
    n.div_ceil(4) * 4
}

/// Derives the byte split for one collective launch.
///
/// Ported directly from `core/planner.h`, including its exact order of
/// operations: clamp checks first, then the α split, then the
/// too-small-chunk collapse, then 4-byte rounding, then a final shrink-and-
/// realign pass that restores `fast + pcie <= total_bytes` by shrinking
/// whichever side has headroom (falling back to the other side once the
/// first hits zero) and re-flooring it to a 4-byte boundary.
pub fn create_plan(
    total_bytes: usize,
    alpha: f64,
    use_pcie_hint: bool,
    cfg: &PlannerConfig,
) -> Plan {
    if !cfg.pcie_globally_enabled || total_bytes < cfg.min_msg_size || !use_pcie_hint {
        return Plan {
            fast_bytes: total_bytes,
            pcie_bytes: 0,
            use_pcie: false,
        };
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let mut fast = (total_bytes as f64 * alpha).floor() as usize;
    let mut pcie = total_bytes - fast;

    if fast > 0 && fast < cfg.min_chunk_size {
        pcie += fast;
        fast = 0;
    }
    if pcie > 0 && pcie < cfg.min_chunk_size {
        fast += pcie;
        pcie = 0;
    }

    let use_pcie;
    if pcie < cfg.min_chunk_size {
        fast = total_bytes;
        pcie = 0;
        use_pcie = false;
    } else if fast < cfg.min_chunk_size {
        fast = 0;
        pcie = total_bytes;
        use_pcie = true;
    } else {
        use_pcie = true;
    }

    if fast > 0 {
        fast = round_up_4(fast);
    }
    if pcie > 0 {
        pcie = round_up_4(pcie);
    }

    if fast + pcie > total_bytes {
        let overshoot = fast + pcie - total_bytes;
        if pcie >= overshoot {
            pcie -= overshoot;
            pcie -= pcie % 4;
        } else {
            let remaining = overshoot - pcie;
            pcie = 0;
            fast = fast.saturating_sub(remaining);
            fast -= fast % 4;
        }
    }

    Plan {
        fast_bytes: fast,
        pcie_bytes: pcie,
        use_pcie,
    }
}
