// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! OS advisory file locking, scoped to exactly one public operation.
//!
//! The lock is taken on a file descriptor kept outside the in-process
//! `RwLock<Inner>` so that acquiring it never borrows from a guard we may
//! later need to upgrade or downgrade (see `store::Engine::read_with_change_detection`).

use std::fs::File;

use fs2::FileExt;

use crate::error::{Error, Result};

/// Held for the lifetime of one public operation; released on drop so every
/// exit path (including panics) unlocks.
pub struct LockGuard<'a> {
	file: &'a File,
}

impl<'a> Drop for LockGuard<'a> {
	fn drop(&mut self) {
		let _ = FileExt::unlock(self.file);
	}
}

pub fn lock_shared(file: &File) -> Result<LockGuard<'_>> {
	file.lock_shared().map_err(|_| Error::Locked)?;
	Ok(LockGuard { file })
}

pub fn lock_exclusive(file: &File) -> Result<LockGuard<'_>> {
	file.lock_exclusive().map_err(|_| Error::Locked)?;
	Ok(LockGuard { file })
}
