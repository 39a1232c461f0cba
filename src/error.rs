// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to a store.
#[derive(Debug)]
pub enum Error {
	/// A key or value argument violated the size rules of §3 (key length
	/// 1..=255; value length unbounded).
	InvalidArgument(String),
	/// `insert` on a key that is already present.
	KeyExists,
	/// `get`/`update`/`delete` on a key that is not present.
	KeyNotFound,
	/// A streaming write produced a different number of bytes than the
	/// caller declared up front.
	SizeMismatch { expected: u64, actual: u64 },
	/// The six-byte file header is missing or its magic does not match.
	CorruptHeader(String),
	/// The scanner hit a byte sequence that does not decode to a record.
	CorruptRecord { position: u64, reason: String },
	/// The index pointed at a position that does not hold the expected
	/// key. This is a bug in the engine (or in whatever else wrote to the
	/// file without going through the lock protocol), not a data fault.
	CorruptIndex { key: Vec<u8>, position: u64 },
	/// An OS file lock could not be acquired.
	Locked,
	/// Underlying filesystem error.
	Io(std::io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
			Error::KeyExists => write!(f, "key already exists"),
			Error::KeyNotFound => write!(f, "key not found"),
			Error::SizeMismatch { expected, actual } => write!(
				f,
				"stream produced {} bytes, expected {}",
				actual, expected
			),
			Error::CorruptHeader(msg) => write!(f, "corrupt header: {}", msg),
			Error::CorruptRecord { position, reason } => {
				write!(f, "corrupt record at {}: {}", position, reason)
			}
			Error::CorruptIndex { key, position } => write!(
				f,
				"corrupt index: key {} expected at {} does not match file contents",
				crate::display::hex(key),
				position
			),
			Error::Locked => write!(f, "could not acquire file lock"),
			Error::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}

/// Panics in debug builds, returns the error in release builds. `CorruptIndex`
/// indicates an implementation bug per §7, not a data fault, so it is worth
/// failing loudly while developing and testing.
pub(crate) fn corrupt_index(key: &[u8], position: u64) -> Error {
	debug_assert!(
		false,
		"index points at {} for key {} but the record there does not match",
		position,
		crate::display::hex(key)
	);
	Error::CorruptIndex { key: key.to_vec(), position }
}
