// SPDX-License-Identifier: AGPL-3.0-or-later

/// The collective kind, used as part of an [`OpKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    AllReduce,
    AllGather,
    ReduceScatter,
    Broadcast,
    Reduce,
    AllToAll,
}

impl OpKind {
    /// Wire code used in `ShmParamStore`'s `StatSlot::op` / `ParamEntry::op`
    /// fields, ported from the original `CollectiveType` enum ordinal.
    pub const fn as_wire_code(self) -> i32 {
        match self {
            OpKind::AllReduce => 0,
            OpKind::AllGather => 1,
            OpKind::ReduceScatter => 2,
            OpKind::Broadcast => 3,
            OpKind::Reduce => 4,
            OpKind::AllToAll => 5,
        }
    }

    pub const fn from_wire_code(code: i32) -> Self {
        match code {
            1 => OpKind::AllGather,
            2 => OpKind::ReduceScatter,
            3 => OpKind::Broadcast,
            4 => OpKind::Reduce,
            5 => OpKind::AllToAll,
            _ => OpKind::AllReduce,
        }
    }
}

/// Vendor datatype code carried in the intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Float64,
    Float16,
    Int32,
    Int64,
    Unknown,
}

impl DataType {
    /// Element width in bytes; unknown types are treated as 4 bytes wide.
    pub const fn size_bytes(self) -> usize {
        match self {
            DataType::Float32 => 4,
            DataType::Float64 => 8,
            DataType::Float16 => 2,
            DataType::Int32 => 4,
            DataType::Int64 => 8,
            DataType::Unknown => 4,
        }
    }

    /// Wire code used in the shared-memory segment's `datatype` fields.
    pub const fn as_wire_code(self) -> i32 {
        match self {
            DataType::Float32 => 0,
            DataType::Float64 => 1,
            DataType::Float16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::Unknown => -1,
        }
    }

    pub const fn from_wire_code(code: i32) -> Self {
        match code {
            0 => DataType::Float32,
            1 => DataType::Float64,
            2 => DataType::Float16,
            3 => DataType::Int32,
            4 => DataType::Int64,
            _ => DataType::Unknown,
        }
    }
}

/// Identity of a collective launch, used to key the parameter cache.
///
/// Equality and hashing are componentwise and the type is immutable once
/// built, mirroring the original `OpKey` (one struct literal per launch, no
/// builder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub kind: OpKind,
    pub total_bytes: usize,
    pub dtype: DataType,
}

impl OpKey {
    pub fn new(kind: OpKind, count: usize, dtype: DataType) -> Self {
        Self {
            kind,
            total_bytes: count * dtype.size_bytes(),
            dtype,
        }
    }
}
