//! Fast-interconnect and PCIe backend wrappers.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod common;
pub mod fast;
pub mod pcie;

pub use common::BackendResult;
