//! Vendor interception seam and the `extern "C"` entry points a host process
//! links against in place of the real NCCL/HCCL library.
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod entrypoints;
pub mod vendor;
