// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! File layout manager: header validation, positioned I/O, append, truncate,
//! sync. Locking lives in [`crate::lock`] — it operates on a dedicated file
//! descriptor so it can be held across a reader/writer-lock upgrade without
//! borrowing the guard it protects.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::{HEADER_LEN, MAGIC, VERSION};

pub struct FileLayout {
	file: File,
}

impl FileLayout {
	/// Open (creating if `create_if_missing`) the file at `path`, validating
	/// or writing the six-byte header as needed.
	pub fn open(path: &Path, create_if_missing: bool) -> Result<FileLayout> {
		if !path.exists() && !create_if_missing {
			return Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("{} does not exist", path.display()),
			)));
		}
		let file = OpenOptions::new().read(true).write(true).create(create_if_missing).open(path)?;
		let layout = FileLayout { file };
		layout.init_or_validate_header()?;
		Ok(layout)
	}

	fn init_or_validate_header(&self) -> Result<()> {
		let len = self.len()?;
		if len == 0 {
			log::debug!(target: "skv", "new store: writing header");
			let mut header = [0u8; HEADER_LEN as usize];
			header[0..3].copy_from_slice(&MAGIC);
			header[3] = VERSION.0;
			header[4] = VERSION.1;
			header[5] = VERSION.2;
			self.write_at(0, &header)?;
			self.sync()?;
			return Ok(());
		}
		if len < HEADER_LEN {
			return Err(Error::CorruptHeader(format!(
				"file length {} is shorter than the {}-byte header",
				len, HEADER_LEN
			)));
		}
		let mut header = [0u8; HEADER_LEN as usize];
		self.read_at(0, &mut header)?;
		if header[0..3] != MAGIC {
			return Err(Error::CorruptHeader("magic bytes do not match 'SKV'".into()));
		}
		log::trace!(
			target: "skv",
			"opened store, on-disk version {}.{}.{}",
			header[3], header[4], header[5],
		);
		Ok(())
	}

	pub fn len(&self) -> Result<u64> {
		Ok(self.file.metadata()?.len())
	}

	/// A fresh file descriptor for the same open file, used only for OS
	/// advisory locking (see [`crate::lock`]).
	pub fn duplicate_handle(&self) -> Result<File> {
		Ok(self.file.try_clone()?)
	}

	#[cfg(unix)]
	pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
		use std::os::unix::fs::FileExt;
		Ok(self.file.read_exact_at(buf, pos)?)
	}

	#[cfg(unix)]
	pub fn write_at(&self, pos: u64, buf: &[u8]) -> Result<()> {
		use std::os::unix::fs::FileExt;
		Ok(self.file.write_all_at(buf, pos)?)
	}

	#[cfg(windows)]
	pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
		use std::os::windows::fs::FileExt;
		let mut offset = pos;
		let mut rest = buf;
		while !rest.is_empty() {
			let n = self.file.seek_read(rest, offset)?;
			if n == 0 {
				return Err(Error::Io(std::io::Error::new(
					std::io::ErrorKind::UnexpectedEof,
					"unexpected EOF",
				)));
			}
			rest = &mut rest[n..];
			offset += n as u64;
		}
		Ok(())
	}

	#[cfg(windows)]
	pub fn write_at(&self, pos: u64, buf: &[u8]) -> Result<()> {
		use std::os::windows::fs::FileExt;
		let mut offset = pos;
		let mut rest = buf;
		while !rest.is_empty() {
			let n = self.file.seek_write(rest, offset)?;
			rest = &rest[n..];
			offset += n as u64;
		}
		Ok(())
	}

	/// Write `buf` at the current end of file, returning the position it was
	/// written at.
	pub fn append(&self, buf: &[u8]) -> Result<u64> {
		let pos = self.len()?;
		self.write_at(pos, buf)?;
		Ok(pos)
	}

	pub fn truncate(&self, len: u64) -> Result<()> {
		Ok(self.file.set_len(len)?)
	}

	pub fn sync(&self) -> Result<()> {
		Ok(self.file.sync_data()?)
	}

	/// Copy `len` bytes from `src` to `dst`. Used by in-place compaction to
	/// shift surviving records toward the start of the file. Safe to call
	/// with overlapping ranges only when `dst <= src`, which is the only
	/// direction the compactor ever moves data.
	pub fn copy_within(&self, src: u64, dst: u64, len: u64) -> Result<()> {
		if src == dst || len == 0 {
			return Ok(());
		}
		let mut buf = vec![0u8; len as usize];
		self.read_at(src, &mut buf)?;
		self.write_at(dst, &buf)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_file_gets_header_written() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.skv");
		let layout = FileLayout::open(&path, true).unwrap();
		assert_eq!(layout.len().unwrap(), HEADER_LEN);
		let mut header = [0u8; 6];
		layout.read_at(0, &mut header).unwrap();
		assert_eq!(&header[0..3], b"SKV");
	}

	#[test]
	fn short_file_is_corrupt_header() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.skv");
		std::fs::write(&path, b"SK").unwrap();
		let err = FileLayout::open(&path, true).unwrap_err();
		assert!(matches!(err, Error::CorruptHeader(_)));
	}

	#[test]
	fn wrong_magic_is_corrupt_header() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("store.skv");
		std::fs::write(&path, b"XXV\x01\x00\x00").unwrap();
		let err = FileLayout::open(&path, true).unwrap_err();
		assert!(matches!(err, Error::CorruptHeader(_)));
	}

	#[test]
	fn missing_file_without_create_is_io_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing.skv");
		let err = FileLayout::open(&path, false).unwrap_err();
		assert!(matches!(err, Error::Io(_)));
	}
}
