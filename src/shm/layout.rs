// SPDX-License-Identifier: AGPL-3.0-or-later

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// `"AMPCCL_S"` as a little-endian u64, ported byte-for-byte from
/// `core/shm_store.h`'s `kMagic`.
pub const MAGIC: u64 = 0x414d_5043_434c_5f53;
pub const MAX_RANKS: usize = 128;
pub const MAX_PARAM_ENTRIES: usize = 512;

/// Segment header. `param_version` here mirrors the original's field of the
/// same name, which the C++ source sets once at creation and never updates
/// again — the live version counter readers should actually trust is
/// [`ParamTableHeader::version`] (see DESIGN.md).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Header {
    pub magic: u64,
    pub nranks: i32,
    pub param_version: u32,
    pub pad: u32,
}

/// One rank's per-operation stat slot.
///
/// Field order and widths are ported exactly from `ShmParamStore::StatSlot`
/// (`static_assert(sizeof(StatSlot) == 56)`); `valid` is the trailing byte
/// writers set with release ordering and readers check with acquire
/// ordering (§9, DESIGN.md Open Question (d)).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct StatSlot {
    pub op: i32,
    pub bytes: u64,
    pub datatype: i32,
    pub fast_time: f64,
    pub pcie_time: f64,
    pub fast_bytes: u64,
    pub pcie_bytes: u64,
    pub fast_success: u8,
    pub pcie_success: u8,
    pub valid: u8,
    pub padding: [u8; 5],
}

const _: () = assert!(std::mem::size_of::<StatSlot>() == 56);

/// Header of the parameter table that follows the `StatSlot` array.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ParamTableHeader {
    pub version: u64,
    pub num_entries: u32,
}

/// One published `(OpKey, ParamValue)` pair.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ParamEntry {
    pub op: i32,
    pub bytes: u64,
    pub datatype: i32,
    pub alpha: f64,
    pub use_pcie: u8,
    pub pad: [u8; 4],
    pub fast_bw: f64,
    pub pcie_bw: f64,
}

/// Byte offsets and total size of the segment, computed once from the
/// `sizeof` of each section — mirrors `ShmParamStore::ShmSize`.
pub struct Layout;

impl Layout {
    pub const HEADER_OFFSET: usize = 0;
    pub const STAT_SLOTS_OFFSET: usize = size_of::<Header>();
    pub const PARAM_HEADER_OFFSET: usize =
        Self::STAT_SLOTS_OFFSET + MAX_RANKS * size_of::<StatSlot>();
    pub const PARAM_ENTRIES_OFFSET: usize =
        Self::PARAM_HEADER_OFFSET + size_of::<ParamTableHeader>();
    pub const TOTAL_SIZE: usize = Self::PARAM_ENTRIES_OFFSET + MAX_PARAM_ENTRIES * size_of::<ParamEntry>();

    pub const fn stat_slot_offset(rank: usize) -> usize {
        Self::STAT_SLOTS_OFFSET + rank * size_of::<StatSlot>()
    }

    pub const fn param_entry_offset(index: usize) -> usize {
        Self::PARAM_ENTRIES_OFFSET + index * size_of::<ParamEntry>()
    }
}
