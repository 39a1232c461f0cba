// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Forward scan of the file from just after the header, yielding one
//! `ScanRecord` per record and silently skipping padding bytes.

use crate::error::Result;
use crate::file::FileLayout;
use crate::record::{self, SizeTier, HEADER_LEN, PADDING_BYTE};

#[derive(Debug, Clone)]
pub struct ScanRecord {
	pub position: u64,
	pub tier: SizeTier,
	pub deleted: bool,
	pub key: Vec<u8>,
	pub value_pos: u64,
	pub value_len: u64,
	pub record_len: u64,
}

impl From<record::DecodedRecord> for ScanRecord {
	fn from(d: record::DecodedRecord) -> Self {
		ScanRecord {
			position: d.position,
			tier: d.tier,
			deleted: d.deleted,
			key: d.key,
			value_pos: d.value_pos,
			value_len: d.value_len,
			record_len: d.record_len,
		}
	}
}

/// Walk `file` from offset 6 to EOF, calling `on_record` for every record in
/// ascending position order. A decode failure aborts the walk and surfaces
/// `CorruptRecord` with the offending position.
pub fn scan(file: &FileLayout, mut on_record: impl FnMut(ScanRecord) -> Result<()>) -> Result<()> {
	let len = file.len()?;
	let mut pos = HEADER_LEN;
	while pos < len {
		let mut byte = [0u8; 1];
		file.read_at(pos, &mut byte)?;
		if byte[0] == PADDING_BYTE {
			pos += 1;
			continue;
		}
		let decoded = record::decode_at(file, pos)?;
		let record_len = decoded.record_len;
		on_record(decoded.into())?;
		pos += record_len;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::file::FileLayout;

	#[test]
	fn scan_skips_padding_and_finds_records() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("s.skv");
		let file = FileLayout::open(&path, true).unwrap();

		let header = record::encode_header(b"k", 1, false);
		let mut record_bytes = header.bytes;
		record_bytes.push(b'v');
		file.append(&record_bytes).unwrap();
		file.append(&[PADDING_BYTE, PADDING_BYTE]).unwrap();

		let mut seen = Vec::new();
		scan(&file, |r| {
			seen.push((r.key.clone(), r.deleted));
			Ok(())
		})
		.unwrap();

		assert_eq!(seen, vec![(b"k".to_vec(), false)]);
	}

	#[test]
	fn scan_reports_deleted_records() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("s.skv");
		let file = FileLayout::open(&path, true).unwrap();

		let header = record::encode_header(b"k", 1, true);
		let mut record_bytes = header.bytes;
		record_bytes.push(b'v');
		file.append(&record_bytes).unwrap();

		let mut deleted_seen = false;
		scan(&file, |r| {
			deleted_seen = r.deleted;
			Ok(())
		})
		.unwrap();
		assert!(deleted_seen);
	}

	#[test]
	fn scan_fails_on_corrupt_type_byte() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("s.skv");
		let file = FileLayout::open(&path, true).unwrap();
		file.append(&[0x00, 0x01, b'k']).unwrap();

		let result = scan(&file, |_| Ok(()));
		assert!(result.is_err());
	}
}
