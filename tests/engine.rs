//! Black-box scenarios against the public `Engine` API, one per §8 of the
//! design notes.

use skv::{CompactionStrategy, Engine, Error, Options};

fn temp_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
	let _ = env_logger::try_init();
	dir.path().join(name)
}

#[test]
fn basic_put_get_and_exact_file_length() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "store");

	{
		let engine = Engine::open(&path).unwrap();
		engine.insert(b"name", b"John").unwrap();
	}

	let engine = Engine::open(&path).unwrap();
	assert_eq!(engine.get(b"name").unwrap(), b"John");

	let file_len = std::fs::metadata(dir.path().join("store.skv")).unwrap().len();
	assert_eq!(file_len, 17);
}

#[test]
fn tier_selection_boundaries_on_disk() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "store");
	let engine = Engine::open(&path).unwrap();

	engine.insert(b"a", &vec![0u8; 255]).unwrap();
	engine.insert(b"b", &vec![0u8; 256]).unwrap();
	engine.insert(b"c", &vec![0u8; 65536]).unwrap();

	let raw = std::fs::read(dir.path().join("store.skv")).unwrap();
	// record "a": type byte right after the 6-byte header.
	assert_eq!(raw[6], 0x01);
	let a_record_len = 1 + 1 + 1 + 1 + 255;
	assert_eq!(raw[6 + a_record_len], 0x02);
	let b_record_len = 1 + 1 + 1 + 2 + 256;
	assert_eq!(raw[6 + a_record_len + b_record_len], 0x04);
}

#[test]
fn update_is_last_write_wins_and_compact_cleans_up() {
	let dir = tempfile::tempdir().unwrap();
	let engine = Engine::open(temp_path(&dir, "store")).unwrap();

	engine.insert(b"k", b"v1").unwrap();
	engine.update(b"k", b"v2").unwrap();
	engine.update(b"k", b"v3").unwrap();

	let stats = engine.verify().unwrap();
	assert_eq!(stats.total_records, 3);
	assert_eq!(stats.active_records, 1);
	assert_eq!(stats.deleted_records, 2);
	assert_eq!(engine.get(b"k").unwrap(), b"v3");

	engine.compact().unwrap();
	let stats = engine.verify().unwrap();
	assert_eq!(stats.total_records, 1);
	assert_eq!(stats.active_records, 1);
	assert_eq!(stats.deleted_records, 0);
}

#[test]
fn free_space_reuse_with_padding() {
	let dir = tempfile::tempdir().unwrap();
	let engine = Engine::open(temp_path(&dir, "store")).unwrap();

	engine.insert(b"a", &vec![0u8; 16]).unwrap();
	let len_before_delete = std::fs::metadata(dir.path().join("store.skv")).unwrap().len();
	engine.delete(b"a").unwrap();
	engine.insert(b"bb", &vec![1u8; 12]).unwrap();
	let len_after_reuse = std::fs::metadata(dir.path().join("store.skv")).unwrap().len();

	assert_eq!(len_before_delete, len_after_reuse);
	assert_eq!(engine.get(b"bb").unwrap(), vec![1u8; 12]);
}

#[test]
fn deleted_flag_preserves_tier_bits() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "store");
	let engine = Engine::open(&path).unwrap();

	engine.insert(b"x", &vec![0u8; 1000]).unwrap();
	let raw = std::fs::read(dir.path().join("store.skv")).unwrap();
	assert_eq!(raw[6], 0x02);

	engine.delete(b"x").unwrap();
	let raw = std::fs::read(dir.path().join("store.skv")).unwrap();
	assert_eq!(raw[6], 0x82);
}

#[test]
fn cross_accessor_sees_compaction() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "store");

	let a = Engine::open(&path).unwrap();
	let b = Engine::open(&path).unwrap();

	for i in 1..=10u32 {
		a.insert(format!("k{}", i).as_bytes(), b"v").unwrap();
	}
	for i in 1..=5u32 {
		a.delete(format!("k{}", i).as_bytes()).unwrap();
	}

	a.compact().unwrap();

	assert_eq!(b.get(b"k7").unwrap(), b"v");
	assert!(matches!(b.get(b"k3"), Err(Error::KeyNotFound)));
	assert_eq!(b.count().unwrap(), 5);
}

#[test]
fn stream_roundtrip_across_size_classes() {
	let dir = tempfile::tempdir().unwrap();
	let engine = Engine::open(temp_path(&dir, "store")).unwrap();

	for (i, n) in [0usize, 1, 255, 256, 65535, 65536].iter().enumerate() {
		let key = format!("k{}", i);
		let data = vec![(i as u8).wrapping_add(1); *n];
		let mut src = &data[..];
		engine.insert_stream(key.as_bytes(), &mut src, *n as u64).unwrap();

		let mut out = Vec::new();
		let written = engine.get_stream(key.as_bytes(), &mut out).unwrap();
		assert_eq!(written, *n as u64);
		assert_eq!(out, data);
	}
}

#[test]
fn swap_file_compaction_strategy_via_options() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "store");
	let engine =
		Engine::open_with(Options::new(&path).compaction_strategy(CompactionStrategy::SwapFile)).unwrap();

	engine.insert(b"a", b"1").unwrap();
	engine.insert(b"b", b"2").unwrap();
	engine.delete(b"a").unwrap();
	engine.compact().unwrap();

	assert_eq!(engine.get(b"b").unwrap(), b"2");
	assert!(matches!(engine.get(b"a"), Err(Error::KeyNotFound)));
}

#[test]
fn iterate_visits_every_live_key() {
	let dir = tempfile::tempdir().unwrap();
	let engine = Engine::open(temp_path(&dir, "store")).unwrap();
	engine.insert(b"a", b"1").unwrap();
	engine.insert(b"b", b"2").unwrap();
	engine.delete(b"a").unwrap();

	let mut seen = Vec::new();
	engine
		.iterate(|k, v| {
			seen.push((k.to_vec(), v.to_vec()));
			Ok(())
		})
		.unwrap();
	assert_eq!(seen, vec![(b"b".to_vec(), b"2".to_vec())]);
}

#[test]
fn reopen_without_create_fails_when_missing() {
	let dir = tempfile::tempdir().unwrap();
	let path = temp_path(&dir, "missing");
	let result = Engine::open_with(Options::new(&path).create_if_missing(false));
	assert!(matches!(result, Err(Error::Io(_))));
}
