//! OpKey-keyed adaptive parameter cache.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod param_cache;
