//! Core dispatch: lookup, plan, launch, and stream-sync retirement.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod stream_sync;
pub mod virtual_collective;
