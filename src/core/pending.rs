// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use crate::{core::{domain::Domain, op_key::OpKey}, core::planner::Plan};

/// Record of an in-flight launch, tied to the caller stream that issued it.
///
/// Registered by `VirtualCollective` at launch time, consumed by the
/// stream-sync handler. At most one per caller stream; a second
/// registration on the same stream silently overwrites the first (§3).
#[derive(Clone)]
pub struct PendingCollective {
    pub domain: Arc<Domain>,
    pub op_key: OpKey,
    pub plan: Plan,
    pub fast_ok: bool,
    pub pcie_ok: bool,
}
