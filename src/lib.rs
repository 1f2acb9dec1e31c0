// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod backend;
pub mod cache;
pub mod cfg;
pub mod controller;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod intercept;
pub mod ir;
pub mod shm;
pub mod telemetry;
