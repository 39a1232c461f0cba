// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Open-time configuration, analogous to the reference engine's per-column
//! `Options`: a plain data struct built once and consumed by `open`, not
//! re-read per operation.

use std::path::{Path, PathBuf};

/// Which rewrite strategy `compact()` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
	/// Copy surviving records toward the start of the file, then truncate.
	/// Keeps file identity, so every other accessor's change detector still
	/// works. The default, and the only strategy safe to use with more than
	/// one accessor (see §4.6 / §9 of the design notes).
	InPlace,
	/// Write a sibling temp file and rename it over the original. Simpler,
	/// but other open handles to the original (including this accessor's own
	/// OS lock handle) keep pointing at the now-unlinked old file until
	/// reopened. Not recommended while other accessors may be using the
	/// store.
	SwapFile,
}

impl Default for CompactionStrategy {
	fn default() -> CompactionStrategy {
		CompactionStrategy::InPlace
	}
}

#[derive(Debug, Clone)]
pub struct Options {
	pub(crate) path: PathBuf,
	pub(crate) create_if_missing: bool,
	pub(crate) compaction_strategy: CompactionStrategy,
}

impl Options {
	/// Start from `path`, appending a `.skv` extension if it doesn't already
	/// have one (§6's environment rule).
	pub fn new(path: impl AsRef<Path>) -> Options {
		Options {
			path: resolve_path(path.as_ref()),
			create_if_missing: true,
			compaction_strategy: CompactionStrategy::default(),
		}
	}

	pub fn create_if_missing(mut self, yes: bool) -> Options {
		self.create_if_missing = yes;
		self
	}

	pub fn compaction_strategy(mut self, strategy: CompactionStrategy) -> Options {
		self.compaction_strategy = strategy;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

fn resolve_path(path: &Path) -> PathBuf {
	match path.extension() {
		Some(ext) if ext == "skv" => path.to_path_buf(),
		_ => {
			let mut with_ext = path.as_os_str().to_os_string();
			with_ext.push(".skv");
			PathBuf::from(with_ext)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn appends_extension_when_missing() {
		let opts = Options::new("/tmp/mystore");
		assert_eq!(opts.path(), Path::new("/tmp/mystore.skv"));
	}

	#[test]
	fn leaves_extension_alone_when_present() {
		let opts = Options::new("/tmp/mystore.skv");
		assert_eq!(opts.path(), Path::new("/tmp/mystore.skv"));
	}
}
