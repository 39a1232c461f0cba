// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `Engine` façade: the public operations, combining the codec, free
//! list, index, scanner and file layout under the concurrency model of §5.
//!
//! Every operation: acquire the internal reader/writer lock, acquire the OS
//! file lock (shared for reads, exclusive for writes), run change detection,
//! execute, release both locks (the guards' `Drop` impls handle this on
//! every exit path, panics included).
//!
//! The OS lock handle (`Engine::lock_file`) is kept outside `RwLock<Inner>`
//! deliberately: change detection on a read operation may need to upgrade an
//! internal read guard to a write guard via `RwLockUpgradableReadGuard::upgrade`,
//! which consumes the guard by value. Nothing borrowed from that guard may
//! still be alive at that point, so the OS lock — acquired independently on
//! its own file descriptor — never enters into it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::compact;
use crate::error::{self, Error, Result};
use crate::file::FileLayout;
use crate::freelist::{self, FreeList};
use crate::index::KeyIndex;
use crate::lock;
use crate::options::{CompactionStrategy, Options};
use crate::record::{self, SizeTier, HEADER_LEN};
use crate::scanner;
use crate::stats::Stats;

const MAX_KEY_LEN: usize = 255;
/// Bounded chunk size used by the streaming read/write paths so a single
/// large value never requires buffering the whole thing in memory.
const STREAM_CHUNK: usize = 64 * 1024;

struct Inner {
	file: FileLayout,
	index: KeyIndex,
	free: FreeList,
	observed_size: u64,
}

impl Inner {
	fn open(file: FileLayout) -> Result<Inner> {
		let mut inner = Inner { file, index: KeyIndex::new(), free: FreeList::new(), observed_size: 0 };
		inner.rebuild()?;
		Ok(inner)
	}

	/// Full scan rebuild, per §4.7: index latest non-deleted occurrence of
	/// each key, register deleted records' byte length as holes.
	fn rebuild(&mut self) -> Result<()> {
		let mut records = Vec::new();
		scanner::scan(&self.file, |rec| {
			records.push(rec);
			Ok(())
		})?;

		self.index.clear();
		self.free.clear();
		for rec in records {
			if rec.deleted {
				self.free.register(rec.position, rec.record_len);
			} else {
				self.index.insert(rec.key, rec.position);
			}
		}
		self.observed_size = self.file.len()?;
		log::debug!(
			target: "skv",
			"rebuilt index: {} live keys, {} holes, observed_size={}",
			self.index.count(),
			self.free.len(),
			self.observed_size,
		);
		Ok(())
	}

	/// §4.7: compare current file length against the last-observed one;
	/// rebuild on mismatch.
	fn detect_changes(&mut self) -> Result<()> {
		let current = self.file.len()?;
		if current != self.observed_size {
			log::debug!(
				target: "skv",
				"change detected: observed_size={} current={}, rebuilding",
				self.observed_size,
				current,
			);
			self.rebuild()?;
		}
		Ok(())
	}

	/// Write a complete record for `(key, value)`, reusing a hole if the free
	/// list has one of sufficient length, otherwise appending. Returns the
	/// position the record was written at. The whole record — header and
	/// value — is assembled in memory first and committed with a single
	/// positioned write, per §4.6: a crash can never leave an active type
	/// byte pointing at a value that wasn't actually written.
	fn write_record(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
		let header = record::encode_header(key, value.len() as u64, false);
		let needed = record::record_len(key.len(), value.len() as u64, header.tier);
		let mut record_bytes = header.bytes;
		record_bytes.extend_from_slice(value);

		if let Some((position, hole_len)) = self.free.allocate(needed) {
			self.file.write_at(position, &record_bytes)?;
			match freelist::plan_leftover(needed, hole_len) {
				freelist::LeftoverPlan::None => {}
				freelist::LeftoverPlan::Hole(len) => self.free.register(position + needed, len),
				freelist::LeftoverPlan::Padding(len) => {
					let padding = vec![record::PADDING_BYTE; len as usize];
					self.file.write_at(position + needed, &padding)?;
				}
			}
			Ok(position)
		} else {
			self.file.append(&record_bytes)
		}
	}

	/// Delete the record at `position` for `key`: set the deleted bit and
	/// register the hole. Assumes the caller has already validated the type
	/// byte at `position` matches `key`.
	fn mark_deleted(&mut self, key: &[u8], position: u64) -> Result<()> {
		let decoded = record::decode_at(&self.file, position)?;
		if decoded.key != key {
			return Err(error::corrupt_index(key, position));
		}
		let mut type_byte = [0u8; 1];
		self.file.read_at(position, &mut type_byte)?;
		type_byte[0] |= 0x80;
		self.file.write_at(position, &type_byte)?;
		self.free.register(position, decoded.record_len);
		Ok(())
	}

	fn finish(&mut self) -> Result<()> {
		self.file.sync()?;
		self.observed_size = self.file.len()?;
		Ok(())
	}
}

/// An open store. One `Engine` per accessor; safe to share across threads
/// (internally synchronized), and safe to open concurrently from other
/// processes on the same file (coordinated via OS advisory locks).
pub struct Engine {
	inner: RwLock<Inner>,
	lock_file: File,
	path: PathBuf,
	compaction_strategy: CompactionStrategy,
}

impl Engine {
	/// Open (or create) the store at `path`, appending `.skv` if the path
	/// doesn't already carry it.
	pub fn open(path: impl AsRef<Path>) -> Result<Engine> {
		Engine::open_with(Options::new(path))
	}

	pub fn open_with(options: Options) -> Result<Engine> {
		let file = FileLayout::open(&options.path, options.create_if_missing)?;
		let lock_file = file.duplicate_handle()?;
		log::debug!(target: "skv", "opening store at {}", options.path.display());
		let inner = Inner::open(file)?;
		Ok(Engine {
			inner: RwLock::new(inner),
			lock_file,
			path: options.path,
			compaction_strategy: options.compaction_strategy,
		})
	}

	pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
		validate_key(key)?;
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.detect_changes()?;
		if inner.index.contains(key) {
			return Err(Error::KeyExists);
		}
		let position = inner.write_record(key, value)?;
		inner.index.insert(key.to_vec(), position);
		inner.finish()
	}

	pub fn update(&self, key: &[u8], value: &[u8]) -> Result<()> {
		validate_key(key)?;
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.detect_changes()?;
		let old_position = inner.index.get(key).ok_or(Error::KeyNotFound)?;
		inner.mark_deleted(key, old_position)?;
		let new_position = inner.write_record(key, value)?;
		inner.index.insert(key.to_vec(), new_position);
		inner.finish()
	}

	pub fn delete(&self, key: &[u8]) -> Result<()> {
		validate_key(key)?;
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.detect_changes()?;
		let position = inner.index.get(key).ok_or(Error::KeyNotFound)?;
		inner.mark_deleted(key, position)?;
		inner.index.remove(key);
		inner.finish()
	}

	/// Take the internal lock for a read operation, upgrading to run the
	/// change detector only if the file length has moved since this accessor
	/// last observed it, then downgrading back. Shared across every
	/// read-only operation so none of them ever blocks on the exclusive
	/// write guard without cause, per §5's single-writer/multiple-reader rule.
	fn read_guard(&self) -> Result<parking_lot::RwLockUpgradableReadGuard<'_, Inner>> {
		let mut inner = self.inner.upgradable_read();
		if inner.file.len()? != inner.observed_size {
			let mut upgraded = parking_lot::RwLockUpgradableReadGuard::upgrade(inner);
			upgraded.detect_changes()?;
			inner = parking_lot::RwLockWriteGuard::downgrade_to_upgradable(upgraded);
		}
		Ok(inner)
	}

	pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
		validate_key(key)?;
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;
		let position = inner.index.get(key).ok_or(Error::KeyNotFound)?;
		self.read_value_at(&inner, key, position)
	}

	fn read_value_at(&self, inner: &Inner, key: &[u8], position: u64) -> Result<Vec<u8>> {
		let decoded = record::decode_at(&inner.file, position)?;
		if decoded.deleted || decoded.key != key {
			return Err(error::corrupt_index(key, position));
		}
		let mut value = vec![0u8; decoded.value_len as usize];
		inner.file.read_at(decoded.value_pos, &mut value)?;
		Ok(value)
	}

	/// Copy the value for `key` into `sink` in bounded chunks, returning the
	/// total number of bytes written.
	pub fn get_stream(&self, key: &[u8], sink: &mut dyn std::io::Write) -> Result<u64> {
		validate_key(key)?;
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;

		let position = inner.index.get(key).ok_or(Error::KeyNotFound)?;
		let decoded = record::decode_at(&inner.file, position)?;
		if decoded.deleted || decoded.key != key {
			return Err(error::corrupt_index(key, position));
		}

		let mut remaining = decoded.value_len;
		let mut cursor = decoded.value_pos;
		let mut buf = vec![0u8; STREAM_CHUNK];
		while remaining > 0 {
			let chunk = remaining.min(STREAM_CHUNK as u64) as usize;
			inner.file.read_at(cursor, &mut buf[..chunk])?;
			sink.write_all(&buf[..chunk])?;
			cursor += chunk as u64;
			remaining -= chunk as u64;
		}
		Ok(decoded.value_len)
	}

	pub fn insert_stream(&self, key: &[u8], source: &mut dyn Read, declared_len: u64) -> Result<()> {
		validate_key(key)?;
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.detect_changes()?;
		if inner.index.contains(key) {
			return Err(Error::KeyExists);
		}
		let position = write_stream_record(&mut inner, key, source, declared_len)?;
		inner.index.insert(key.to_vec(), position);
		inner.finish()
	}

	pub fn update_stream(&self, key: &[u8], source: &mut dyn Read, declared_len: u64) -> Result<()> {
		validate_key(key)?;
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.detect_changes()?;
		let old_position = inner.index.get(key).ok_or(Error::KeyNotFound)?;
		inner.mark_deleted(key, old_position)?;
		let new_position = write_stream_record(&mut inner, key, source, declared_len)?;
		inner.index.insert(key.to_vec(), new_position);
		inner.finish()
	}

	pub fn iterate(&self, mut callback: impl FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;

		let entries: Vec<(Vec<u8>, u64)> = inner.index.iter().map(|(k, &p)| (k.clone(), p)).collect();
		for (key, position) in entries {
			let value = self.read_value_at(&inner, &key, position)?;
			callback(&key, &value)?;
		}
		Ok(())
	}

	pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;
		Ok(inner.index.keys())
	}

	pub fn count(&self) -> Result<usize> {
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;
		Ok(inner.index.count())
	}

	pub fn contains(&self, key: &[u8]) -> Result<bool> {
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.read_guard()?;
		Ok(inner.index.contains(key))
	}

	pub fn clear(&self) -> Result<()> {
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		inner.file.truncate(HEADER_LEN)?;
		inner.index.clear();
		inner.free.clear();
		inner.finish()
	}

	/// Full scan, returning record/space accounting. Per §4.6.
	pub fn verify(&self) -> Result<Stats> {
		let _os_lock = lock::lock_shared(&self.lock_file)?;
		let inner = self.inner.read();

		let mut stats = Stats::default();
		let mut key_len_sum = 0u64;
		let mut value_len_sum = 0u64;
		scanner::scan(&inner.file, |rec| {
			stats.total_records += 1;
			if rec.deleted {
				stats.deleted_records += 1;
				stats.wasted_space += rec.record_len;
			} else {
				stats.active_records += 1;
				stats.data_size += rec.record_len;
				key_len_sum += rec.key.len() as u64;
				value_len_sum += rec.value_len;
			}
			Ok(())
		})?;

		let file_len = inner.file.len()?;
		stats.file_len = file_len;
		stats.header_len = HEADER_LEN;
		let accounted = HEADER_LEN + stats.data_size + stats.wasted_space;
		stats.padding_bytes = file_len.saturating_sub(accounted);
		stats.wasted_space += stats.padding_bytes;
		stats.wasted_percent = if file_len == 0 { 0.0 } else { stats.wasted_space as f64 / file_len as f64 * 100.0 };
		stats.efficiency = 1.0 - (stats.wasted_space as f64 / file_len.max(1) as f64);
		stats.average_key_len = if stats.active_records == 0 { 0.0 } else { key_len_sum as f64 / stats.active_records as f64 };
		stats.average_value_len =
			if stats.active_records == 0 { 0.0 } else { value_len_sum as f64 / stats.active_records as f64 };
		Ok(stats)
	}

	/// Rewrite the file to contain only the latest active version of each
	/// live key, using the strategy configured at open time.
	pub fn compact(&self) -> Result<()> {
		let _os_lock = lock::lock_exclusive(&self.lock_file)?;
		let mut inner = self.inner.write();
		let before = inner.file.len()?;
		match self.compaction_strategy {
			CompactionStrategy::InPlace => compact::compact_in_place(&inner.file)?,
			CompactionStrategy::SwapFile => {
				let new_file = compact::compact_swap_file(&self.path, &inner.file)?;
				inner.file = new_file;
			}
		}
		let after = inner.file.len()?;
		log::info!(target: "skv", "compacted {}: {} -> {} bytes", self.path.display(), before, after);
		inner.rebuild()
	}

	/// Compact, then consume the handle. Maps to the spec's `close_compacting`.
	pub fn into_compacted(self) -> Result<()> {
		self.compact()
	}
}

fn write_stream_record(inner: &mut Inner, key: &[u8], source: &mut dyn Read, declared_len: u64) -> Result<u64> {
	let tier = SizeTier::for_value_len(declared_len);
	let needed = record::record_len(key.len(), declared_len, tier);

	let (position, leftover) = match inner.free.allocate(needed) {
		Some((position, hole_len)) => (position, Some(hole_len)),
		None => (inner.file.len()?, None),
	};

	// Commit barrier: write the header with the deleted bit set first, copy
	// the body, then clear the bit only once exactly `declared_len` bytes
	// have been copied and synced. A reader can never observe a partially
	// written body as active.
	let header = record::encode_header(key, declared_len, true);
	inner.file.write_at(position, &header.bytes)?;
	let value_pos = position + header.bytes.len() as u64;

	let mut remaining = declared_len;
	let mut cursor = value_pos;
	let mut buf = vec![0u8; STREAM_CHUNK];
	while remaining > 0 {
		let chunk = remaining.min(STREAM_CHUNK as u64) as usize;
		let n = read_fill(source, &mut buf[..chunk])?;
		if n < chunk {
			return Err(Error::SizeMismatch { expected: declared_len, actual: declared_len - remaining + n as u64 });
		}
		inner.file.write_at(cursor, &buf[..chunk])?;
		cursor += chunk as u64;
		remaining -= chunk as u64;
	}
	// Detect trailing bytes beyond the declared length.
	let mut probe = [0u8; 1];
	if source.read(&mut probe)? > 0 {
		return Err(Error::SizeMismatch { expected: declared_len, actual: declared_len + 1 });
	}

	let used = value_pos + declared_len - position;
	if let Some(hole_len) = leftover {
		match freelist::plan_leftover(used, hole_len) {
			freelist::LeftoverPlan::None => {}
			freelist::LeftoverPlan::Hole(len) => inner.free.register(position + used, len),
			freelist::LeftoverPlan::Padding(len) => {
				let padding = vec![record::PADDING_BYTE; len as usize];
				inner.file.write_at(position + used, &padding)?;
			}
		}
	}

	inner.file.sync()?;
	let mut type_byte = [0u8; 1];
	inner.file.read_at(position, &mut type_byte)?;
	type_byte[0] &= !0x80;
	inner.file.write_at(position, &type_byte)?;
	Ok(position)
}

/// Fill `buf` as far as `source` allows, short of EOF. Unlike `read_exact`,
/// a short read is not an error here — it's the signal that the source
/// produced fewer bytes than declared.
fn read_fill(source: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = source.read(&mut buf[filled..])?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}

fn validate_key(key: &[u8]) -> Result<()> {
	if key.is_empty() {
		return Err(Error::InvalidArgument("key must not be empty".into()));
	}
	if key.len() > MAX_KEY_LEN {
		return Err(Error::InvalidArgument(format!("key length {} exceeds {}", key.len(), MAX_KEY_LEN)));
	}
	Ok(())
}
