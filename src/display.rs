// Copyright 2026 skv authors.
// Licensed under the MIT license <LICENSE-MIT or https://opensource.org/licenses/MIT>
// or the Apache License, Version 2.0 <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

/// Render a byte string as lowercase hex for log messages and error text.
/// Long keys are truncated so a pathological key can't flood the log.
pub fn hex(data: &[u8]) -> String {
	const MAX: usize = 32;
	let mut s = String::with_capacity(data.len().min(MAX) * 2 + 3);
	for b in data.iter().take(MAX) {
		s.push_str(&format!("{:02x}", b));
	}
	if data.len() > MAX {
		s.push_str("..");
	}
	s
}
