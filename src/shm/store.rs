// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{
    ffi::CString,
    io,
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
};

use zerocopy::{FromBytes, IntoBytes};

use crate::{
    cache::param_cache::{ParamCache, ParamValue},
    core::{domain_key::DomainKey, op_key::{DataType, OpKey, OpKind}},
    error::{AmpcclError, Result},
    shm::layout::{Header, Layout, ParamEntry, ParamTableHeader, StatSlot, MAGIC, MAX_PARAM_ENTRIES, MAX_RANKS},
    telemetry::stats::ExecStat,
};

fn shm_name_for_key(key: &DomainKey) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    format!("/ampccl_{:x}", hasher.finish())
}

/// Per-DomainKey POSIX shared segment: per-rank stat slots plus a single
/// parameter table (§3, §4.6).
///
/// Uses raw `libc` `shm_open`/`mmap` rather than `memmap2` because the
/// segment must be *created* with `O_CREAT` and a precise size, which
/// `memmap2` doesn't manage on its own — the same tradeoff
/// `mstange-samply`'s `profiler-symbol-server` makes when it needs raw
/// control over segment creation.
pub struct ShmParamStore {
    base: *mut u8,
    fd: i32,
    my_rank: i32,
    nranks: i32,
}

// SAFETY: `base` points at a POSIX shared-memory mapping; all access to it
// goes through atomics (the `valid`/`version` fields) or plain field copies
// guarded by the same single-writer-per-rank contract the original assumes.
unsafe impl Send for ShmParamStore {}
unsafe impl Sync for ShmParamStore {}

impl ShmParamStore {
    /// Creates or attaches the segment for `key`. Fails if the rank
    /// topology is invalid, exceeds `MAX_RANKS`, or an existing segment has
    /// the wrong size (§4.6: "segment is considered incompatible").
    pub fn attach(key: &DomainKey, my_rank: i32, nranks: i32) -> Result<Self> {
        if nranks <= 0 || my_rank < 0 || my_rank >= nranks {
            return Err(AmpcclError::ShmRankTopology { my_rank, nranks });
        }
        if nranks as usize > MAX_RANKS {
            return Err(AmpcclError::ShmTooManyRanks {
                nranks,
                max: MAX_RANKS,
            });
        }

        let name = shm_name_for_key(key);
        let cname = CString::new(name.clone()).map_err(|_| AmpcclError::ShmAttach {
            name: name.clone(),
            source: io::Error::other("segment name contains a NUL byte"),
        })?;

        // SAFETY: `cname` is a valid NUL-terminated C string for the duration of the call.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o666) };
        if fd < 0 {
            return Err(AmpcclError::ShmAttach {
                name,
                source: io::Error::last_os_error(),
            });
        }

        if let Err(err) = Self::size_segment(fd, &name) {
            // SAFETY: `fd` was just opened above and is not yet shared.
            unsafe { libc::close(fd) };
            return Err(err);
        }

        // SAFETY: `fd` refers to a shared-memory object sized to `Layout::TOTAL_SIZE`.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                Layout::TOTAL_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            // SAFETY: `fd` is still owned by this call.
            unsafe { libc::close(fd) };
            return Err(AmpcclError::ShmAttach {
                name,
                source: io::Error::last_os_error(),
            });
        }
        let base = base as *mut u8;

        let store = Self {
            base,
            fd,
            my_rank,
            nranks,
        };
        store.ensure_header_initialized(nranks);
        Ok(store)
    }

    fn size_segment(fd: i32, name: &str) -> Result<()> {
        // SAFETY: `st` is fully initialized by `fstat` on success.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is a valid, open file descriptor.
        let existing_size = if unsafe { libc::fstat(fd, &mut st) } == 0 {
            st.st_size as usize
        } else {
            0
        };

        if existing_size == 0 {
            // SAFETY: `fd` is a valid, open file descriptor.
            if unsafe { libc::ftruncate(fd, Layout::TOTAL_SIZE as libc::off_t) } != 0 {
                return Err(AmpcclError::ShmAttach {
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
        } else if existing_size != Layout::TOTAL_SIZE {
            return Err(AmpcclError::ShmSizeMismatch {
                name: name.to_string(),
                existing: existing_size,
                expected: Layout::TOTAL_SIZE,
            });
        }
        Ok(())
    }

    fn ensure_header_initialized(&self, nranks: i32) {
        // SAFETY: `base` is mapped for at least `Layout::TOTAL_SIZE` bytes.
        let magic_bytes = unsafe { std::slice::from_raw_parts(self.base, 8) };
        let magic = u64::from_ne_bytes(magic_bytes.try_into().unwrap_or_else(|_| [0; 8]));
        if magic != MAGIC {
            let header = Header {
                magic: MAGIC,
                nranks,
                param_version: 0,
                pad: 0,
            };
            self.write_bytes(0, header.as_bytes());
        }
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        // SAFETY: `offset + bytes.len()` is always within `Layout::TOTAL_SIZE`
        // for every caller in this module.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), bytes.len()) };
    }

    fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        // SAFETY: same invariant as `write_bytes`.
        unsafe { std::slice::from_raw_parts(self.base.add(offset), len) }
    }

    fn valid_atomic(&self, rank: usize) -> &AtomicU8 {
        let offset = Layout::stat_slot_offset(rank) + std::mem::offset_of!(StatSlot, valid);
        // SAFETY: offset is within the mapped segment and naturally aligned for a u8.
        unsafe { &*(self.base.add(offset) as *const AtomicU8) }
    }

    fn version_atomic(&self) -> &AtomicU64 {
        let offset = Layout::PARAM_HEADER_OFFSET + std::mem::offset_of!(ParamTableHeader, version);
        // SAFETY: offset is 8-byte aligned because it is the first field of
        // `ParamTableHeader`, itself placed right after a `StatSlot` array
        // whose size is a multiple of 8.
        unsafe { &*(self.base.add(offset) as *const AtomicU64) }
    }

    pub fn nranks(&self) -> i32 {
        self.nranks
    }

    pub fn is_rank0(&self) -> bool {
        self.my_rank == 0
    }

    /// Writes the calling rank's slot; release-stores `valid` last so a
    /// concurrent acquire-load in another process never observes a
    /// half-written slot (§9, DESIGN.md Open Question (d)).
    pub fn write_my_stat(&self, rank: i32, op_key: OpKey, stat: &ExecStat) {
        if rank < 0 || rank >= self.nranks {
            return;
        }
        let slot = StatSlot {
            op: op_key.kind.as_wire_code(),
            bytes: op_key.total_bytes as u64,
            datatype: op_key.dtype.as_wire_code(),
            fast_time: stat.fast_time_secs,
            pcie_time: stat.pcie_time_secs,
            fast_bytes: stat.fast_bytes as u64,
            pcie_bytes: stat.pcie_bytes as u64,
            fast_success: stat.fast_success as u8,
            pcie_success: stat.pcie_success as u8,
            valid: 0,
            padding: [0; 5],
        };
        self.write_bytes(Layout::stat_slot_offset(rank as usize), slot.as_bytes());
        self.valid_atomic(rank as usize).store(1, Ordering::Release);
    }

    /// Scans every rank's slot. Per §4.6 / Open Question (c): bytes are
    /// taken from the last valid slot scanned, not summed — all ranks are
    /// assumed to have issued the same plan.
    pub fn read_all_stats_and_aggregate(&self) -> Option<(ExecStat, OpKey)> {
        let mut max_fast_time = 0.0;
        let mut max_pcie_time = 0.0;
        let mut fast_bytes = 0u64;
        let mut pcie_bytes = 0u64;
        let mut fast_ok = true;
        let mut pcie_ok = true;
        let mut any_valid = false;
        let mut op_key = None;

        for rank in 0..self.nranks as usize {
            if self.valid_atomic(rank).load(Ordering::Acquire) == 0 {
                continue;
            }
            any_valid = true;
            let bytes = self.read_bytes(Layout::stat_slot_offset(rank), size_of::<StatSlot>());
            let slot = StatSlot::read_from_bytes(bytes).unwrap_or_else(|_| unreachable!(
                "stat slot slice is always exactly sizeof::<StatSlot>()"
            ));

            if op_key.is_none() {
                op_key = Some(OpKey {
                    kind: OpKind::from_wire_code(slot.op),
                    total_bytes: slot.bytes as usize,
                    dtype: DataType::from_wire_code(slot.datatype),
                });
            }
            if slot.fast_time > max_fast_time {
                max_fast_time = slot.fast_time;
            }
            if slot.pcie_time > max_pcie_time {
                max_pcie_time = slot.pcie_time;
            }
            fast_bytes = slot.fast_bytes;
            pcie_bytes = slot.pcie_bytes;
            if slot.fast_success == 0 {
                fast_ok = false;
            }
            if slot.pcie_success == 0 {
                pcie_ok = false;
            }
        }

        if !any_valid {
            return None;
        }

        Some((
            ExecStat {
                fast_time_secs: max_fast_time,
                pcie_time_secs: max_pcie_time,
                fast_bytes: fast_bytes as usize,
                pcie_bytes: pcie_bytes as usize,
                fast_success: fast_ok,
                pcie_success: pcie_ok,
            },
            op_key.unwrap_or_else(|| unreachable!("any_valid implies op_key was set")),
        ))
    }

    /// Reads the published parameter table into `cache`, replacing its
    /// contents (every rank does this at the start of its next collective).
    pub fn read_params(&self, cache: &ParamCache) {
        // Acquire-load establishes happens-before with the release-store
        // `write_params` performs after publishing entries.
        let _fence = self.version_atomic().load(Ordering::Acquire);

        let num_offset = Layout::PARAM_HEADER_OFFSET + std::mem::offset_of!(ParamTableHeader, num_entries);
        let num_bytes = self.read_bytes(num_offset, 4);
        let num_entries = u32::from_ne_bytes(num_bytes.try_into().unwrap_or_else(|_| [0; 4])) as usize;
        let n = num_entries.min(MAX_PARAM_ENTRIES);

        let mut snapshot = Vec::with_capacity(n);
        for i in 0..n {
            let bytes = self.read_bytes(Layout::param_entry_offset(i), size_of::<ParamEntry>());
            let entry = ParamEntry::read_from_bytes(bytes).unwrap_or_else(|_| unreachable!(
                "param entry slice is always exactly sizeof::<ParamEntry>()"
            ));
            let key = OpKey {
                kind: OpKind::from_wire_code(entry.op),
                total_bytes: entry.bytes as usize,
                dtype: DataType::from_wire_code(entry.datatype),
            };
            let value = ParamValue {
                alpha: entry.alpha,
                use_pcie: entry.use_pcie != 0,
                fast_bw_gbps: entry.fast_bw,
                pcie_bw_gbps: entry.pcie_bw,
            };
            snapshot.push((key, value));
        }

        cache.clear();
        cache.load_snapshot(snapshot);
    }

    /// Publishes `cache`'s current contents, capped at `MAX_PARAM_ENTRIES`.
    /// Rank 0 is the only caller expected to invoke this (§4.6).
    pub fn write_params(&self, cache: &ParamCache) {
        let mut snapshot = cache.snapshot();
        if snapshot.len() > MAX_PARAM_ENTRIES {
            snapshot.truncate(MAX_PARAM_ENTRIES);
        }

        let num_offset = Layout::PARAM_HEADER_OFFSET + std::mem::offset_of!(ParamTableHeader, num_entries);
        self.write_bytes(num_offset, &(snapshot.len() as u32).to_ne_bytes());

        for (i, (key, value)) in snapshot.iter().enumerate() {
            let entry = ParamEntry {
                op: key.kind.as_wire_code(),
                bytes: key.total_bytes as u64,
                datatype: key.dtype.as_wire_code(),
                alpha: value.alpha,
                use_pcie: value.use_pcie as u8,
                pad: [0; 4],
                fast_bw: value.fast_bw_gbps,
                pcie_bw: value.pcie_bw_gbps,
            };
            self.write_bytes(Layout::param_entry_offset(i), entry.as_bytes());
        }

        self.version_atomic().fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for ShmParamStore {
    fn drop(&mut self) {
        // SAFETY: `base`/`fd` were established by a successful `attach` and
        // are not shared past this point.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, Layout::TOTAL_SIZE);
            libc::close(self.fd);
        }
    }
}
