// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

/// Internal error taxonomy for paths that stay inside the crate.
///
/// Entry points never propagate this type across the vendor ABI boundary —
/// see [`crate::backend::BackendResult`] for the C-ABI-shaped counterpart.
#[derive(Debug, Error)]
pub enum AmpcclError {
    #[error("invalid environment value for {var}: {value:?}")]
    InvalidConfig { var: &'static str, value: String },

    #[error("shared-memory segment {name} exists with size {existing}, expected {expected}")]
    ShmSizeMismatch {
        name: String,
        existing: usize,
        expected: usize,
    },

    #[error("shared-memory attach failed for {name}: {source}")]
    ShmAttach {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown collective datatype code: {0}")]
    UnknownDataType(i32),

    #[error("no domain registered for raw communicator handle")]
    UnknownDomain,

    #[error("invalid rank topology: rank {my_rank} of {nranks}")]
    ShmRankTopology { my_rank: i32, nranks: i32 },

    #[error("nranks {nranks} exceeds the shared-memory segment's {max} rank capacity")]
    ShmTooManyRanks { nranks: i32, max: usize },
}

pub type Result<T> = std::result::Result<T, AmpcclError>;
