// SPDX-License-Identifier: AGPL-3.0-or-later

#![allow(clippy::all)]

mod integration_tests {
    pub mod common;

    pub mod scenario_allreduce_single_rank_fast_only;
    pub mod scenario_allreduce_two_rank_pcie_split;
    pub mod scenario_shm_backed_cross_rank_aggregation;
}
