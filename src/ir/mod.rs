//! Two-rank PCIe instruction-graph programs.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod builder;
pub mod program;
