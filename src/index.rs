// Copyright 2021-2023 Vellum Developers.
// This file is part of Vellum.

// Vellum is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Vellum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Vellum.  If not, see <http://www.gnu.org/licenses/>.

// On disk index region layout.
//
// [BUCKET_OFFSETS: (n_buckets + 1) * 4][ENTRIES]
//
// BUCKET_OFFSETS - little-endian u32 byte offsets, relative to the start of
// the region. Offset `b` points at the first entry of bucket `b`; offset
// `n_buckets` points at the end of the entries. The table is non-decreasing
// and a fresh one has every offset equal to its own length.
//
// Entry:
// [KEY_HASH: 13][DATA_OFFSET: n_bytes_file]
// DATA_OFFSET - 1 + (absolute record offset - HEADER_SIZE). Zero marks an
// entry superseded by a newer write or an explicit delete.
//
// Entries of one bucket are packed with no gaps. An insert opens an
// entry-sized gap at the front of the bucket and shifts everything after it;
// all later bucket offsets grow by one entry stride.
//
// While a store is open for writing this region lives in an auxiliary
// `<path>.tmp` file; closed, it sits in the primary file after the data log.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::codec::{
	bucket_of, read_uint, write_uint, KeyHash, KEY_HASH_LEN, N_BYTES_INDEX,
};
use crate::data::{map_granularity, tombstone_record, DataFile};
use crate::display::hex;
use crate::error::{Error, Result};

/// Bucket counts grow along a fixed schedule; past the last step the index
/// stops growing.
pub fn next_bucket_count(n_buckets: u32) -> Option<u32> {
	match n_buckets {
		12_007 => Some(144_013),
		144_013 => Some(1_728_017),
		1_728_017 => Some(20_736_017),
		_ => None,
	}
}

pub fn bucket_table_len(n_buckets: u32) -> usize {
	(n_buckets as usize + 1) * N_BYTES_INDEX
}

/// A fresh bucket-offset table: every bucket is empty, so all offsets point
/// at the end of the table itself.
pub fn initial_bucket_table(n_buckets: u32) -> Vec<u8> {
	let len = bucket_table_len(n_buckets);
	let mut out = Vec::with_capacity(len);
	for _ in 0..=n_buckets {
		out.extend_from_slice(&(len as u32).to_le_bytes());
	}
	out
}

/// Finds the aligned entry position for `hash` within its bucket, searched
/// over `region` (a full index region starting with the bucket offsets).
fn find_entry(region: &[u8], n_buckets: u32, stride: usize, hash: &KeyHash) -> Option<usize> {
	let bucket = bucket_of(hash, n_buckets);
	let p = bucket as usize * N_BYTES_INDEX;
	let bounds = &region[p..p + 2 * N_BYTES_INDEX];
	let start = read_uint(&bounds[..N_BYTES_INDEX]) as usize;
	let end = read_uint(&bounds[N_BYTES_INDEX..]) as usize;
	region[start..end]
		.chunks_exact(stride)
		.position(|entry| &entry[..KEY_HASH_LEN] == &hash[..])
		.map(|i| start + i * stride)
}

fn entry_data_offset(region: &[u8], entry_pos: usize, stride: usize) -> u64 {
	read_uint(&region[entry_pos + KEY_HASH_LEN..entry_pos + stride])
}

/// Stored data offset for `hash`, or `None` when the key is absent or its
/// entry was zeroed.
fn lookup_region(region: &[u8], n_buckets: u32, stride: usize, hash: &KeyHash) -> Option<u64> {
	let pos = find_entry(region, n_buckets, stride, hash)?;
	match entry_data_offset(region, pos, stride) {
		0 => None,
		offset => Some(offset),
	}
}

/// Mutable bucket index over the auxiliary file of a writable store.
pub struct IndexTable {
	path: PathBuf,
	file: File,
	map: MmapMut,
	n_buckets: u32,
	stride: usize,
}

impl IndexTable {
	/// Creates the auxiliary file with an empty bucket-offset table.
	pub fn create(path: &Path, n_buckets: u32, stride: usize) -> Result<IndexTable> {
		let file =
			std::fs::OpenOptions::new().create(true).truncate(true).read(true).write(true).open(path)?;
		let table = initial_bucket_table(n_buckets);
		crate::data::write_all_at(&file, &table, 0)?;
		file.set_len(table.len() as u64)?;
		let map = unsafe { MmapOptions::new().map_mut(&file)? };
		Ok(IndexTable { path: path.into(), file, map, n_buckets, stride })
	}

	/// Maps an auxiliary file that already holds an index region.
	pub fn open(path: &Path, n_buckets: u32, stride: usize) -> Result<IndexTable> {
		let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
		let len = file.metadata()?.len() as usize;
		check_region_len(len, n_buckets, stride)?;
		let map = unsafe { MmapOptions::new().map_mut(&file)? };
		Ok(IndexTable { path: path.into(), file, map, n_buckets, stride })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn file(&self) -> &File {
		&self.file
	}

	pub fn n_buckets(&self) -> u32 {
		self.n_buckets
	}

	pub fn byte_len(&self) -> u64 {
		self.map.len() as u64
	}

	pub fn entry_count(&self) -> u64 {
		((self.map.len() - bucket_table_len(self.n_buckets)) / self.stride) as u64
	}

	pub fn lookup(&self, hash: &KeyHash) -> Option<u64> {
		lookup_region(&self.map, self.n_buckets, self.stride, hash)
	}

	pub fn contains(&self, hash: &KeyHash) -> bool {
		self.lookup(hash).is_some()
	}

	pub fn flush(&self) -> Result<()> {
		Ok(self.map.flush()?)
	}

	fn offset_at(&self, bucket: u32) -> usize {
		let p = bucket as usize * N_BYTES_INDEX;
		read_uint(&self.map[p..p + N_BYTES_INDEX]) as usize
	}

	/// Adds `delta` to every bucket offset from `from` through the end
	/// sentinel. The table is a plain little-endian u32 array.
	fn bump_offsets(&mut self, from: u32, delta: u32) {
		let start = from as usize * N_BYTES_INDEX;
		let end = bucket_table_len(self.n_buckets);
		for entry in self.map[start..end].chunks_exact_mut(N_BYTES_INDEX) {
			let offset = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]) + delta;
			entry.copy_from_slice(&offset.to_le_bytes());
		}
	}

	fn resize(&mut self, new_len: u64) -> Result<()> {
		self.file.set_len(new_len)?;
		self.map = unsafe { MmapOptions::new().map_mut(&self.file)? };
		Ok(())
	}

	/// Zeroes the entry for `hash`, returning the data offset it held. The
	/// caller is responsible for the record-side tombstone.
	pub fn tombstone(&mut self, hash: &KeyHash) -> Option<u64> {
		let stride = self.stride;
		let pos = find_entry(&self.map, self.n_buckets, stride, hash)?;
		let old = entry_data_offset(&self.map, pos, stride);
		if old == 0 {
			return None;
		}
		for b in self.map[pos + KEY_HASH_LEN..pos + stride].iter_mut() {
			*b = 0;
		}
		log::trace!(target: "vellum", "Tombstoned entry {} at {}", hex(hash), pos);
		Some(old)
	}

	/// Applies one flushed batch of `(hash, data offset)` pairs. A pair whose
	/// hash already has a live entry zeroes that entry and the tombstone byte
	/// of the superseded record. Returns the number of entries superseded.
	pub fn update(&mut self, pairs: &[(KeyHash, u64)], data: &DataFile) -> Result<u32> {
		if pairs.is_empty() {
			return Ok(0);
		}
		let stride = self.stride;
		let old_len = self.map.len();
		self.resize((old_len + pairs.len() * stride) as u64)?;
		let mut n_deletes = 0u32;
		for (hash, stored) in pairs {
			if let Some(pos) = find_entry(&self.map, self.n_buckets, stride, hash) {
				let old = entry_data_offset(&self.map, pos, stride);
				if old != 0 {
					for b in self.map[pos + KEY_HASH_LEN..pos + stride].iter_mut() {
						*b = 0;
					}
					tombstone_record(data, crate::codec::abs_from_stored(old))?;
					n_deletes += 1;
				}
			}
			let bucket = bucket_of(hash, self.n_buckets);
			let ins = self.offset_at(bucket);
			let end = self.offset_at(self.n_buckets);
			self.map.copy_within(ins..end, ins + stride);
			self.map[ins..ins + KEY_HASH_LEN].copy_from_slice(&hash[..]);
			write_uint(&mut self.map[ins + KEY_HASH_LEN..ins + stride], *stored);
			self.bump_offsets(bucket + 1, stride as u32);
		}
		log::trace!(
			target: "vellum",
			"Indexed {} entries, {} superseded",
			pairs.len(),
			n_deletes
		);
		Ok(n_deletes)
	}

	/// Rewrites the data offset of the entry holding `expected` to
	/// `expected - delta`. A mismatch means the record has no entry of its
	/// own (an orphan) and is left alone.
	pub fn rewrite_offset(&mut self, hash: &KeyHash, expected: u64, delta: u64) {
		let stride = self.stride;
		if let Some(pos) = find_entry(&self.map, self.n_buckets, stride, hash) {
			if entry_data_offset(&self.map, pos, stride) == expected {
				write_uint(&mut self.map[pos + KEY_HASH_LEN..pos + stride], expected - delta);
			}
		}
	}

	/// Rebuilds the region with `new_n_buckets` buckets. Zeroed entries are
	/// dropped; live entries are redistributed under the new modulus.
	pub fn grow(&mut self, new_n_buckets: u32) -> Result<()> {
		let stride = self.stride;
		let old_btl = bucket_table_len(self.n_buckets);
		let new_btl = bucket_table_len(new_n_buckets);
		let old_len = self.map.len();
		let old_entry_count = (old_len - old_btl) / stride;

		let mut n_live = 0usize;
		for i in 0..old_entry_count {
			let e = old_btl + i * stride;
			if read_uint(&self.map[e + KEY_HASH_LEN..e + stride]) != 0 {
				n_live += 1;
			}
		}

		// Park the old entries past the space the new table and entries will
		// occupy, then refill from there.
		let live_area = n_live * stride;
		let temp_pos = old_btl + new_btl + live_area;
		self.resize((old_len + new_btl + live_area) as u64)?;
		self.map.copy_within(old_btl..old_len, temp_pos);

		let mut offsets: Vec<u32> = vec![new_btl as u32; new_n_buckets as usize + 1];
		let sentinel = new_n_buckets as usize;
		for i in 0..old_entry_count {
			let e = temp_pos + i * stride;
			let stored = read_uint(&self.map[e + KEY_HASH_LEN..e + stride]);
			if stored == 0 {
				continue;
			}
			let mut entry_hash = [0u8; KEY_HASH_LEN];
			entry_hash.copy_from_slice(&self.map[e..e + KEY_HASH_LEN]);
			let bucket = bucket_of(&entry_hash, new_n_buckets) as usize;
			let ins = offsets[bucket] as usize;
			let end = offsets[sentinel] as usize;
			self.map.copy_within(ins..end, ins + stride);
			self.map[ins..ins + KEY_HASH_LEN].copy_from_slice(&entry_hash);
			write_uint(&mut self.map[ins + KEY_HASH_LEN..ins + stride], stored);
			for offset in offsets[bucket + 1..].iter_mut() {
				*offset += stride as u32;
			}
		}

		for (i, offset) in offsets.iter().enumerate() {
			self.map[i * N_BYTES_INDEX..(i + 1) * N_BYTES_INDEX]
				.copy_from_slice(&offset.to_le_bytes());
		}
		let final_len = offsets[sentinel] as u64;
		self.n_buckets = new_n_buckets;
		self.resize(final_len)?;
		self.flush()?;
		Ok(())
	}

	/// Drops every entry and resets the bucket-offset table. The data log is
	/// not touched.
	pub fn clear(&mut self) -> Result<()> {
		let table = initial_bucket_table(self.n_buckets);
		self.resize(table.len() as u64)?;
		self.map[..].copy_from_slice(&table);
		self.flush()
	}
}

fn check_region_len(len: usize, n_buckets: u32, stride: usize) -> Result<()> {
	let table_len = bucket_table_len(n_buckets);
	if len < table_len || (len - table_len) % stride != 0 {
		return Err(Error::Corruption(format!(
			"Index region of {} bytes does not fit {} buckets",
			len, n_buckets
		)));
	}
	Ok(())
}

/// Read-only view of the index region at the tail of a closed primary file.
/// The mapping starts at the nearest granularity boundary below the region
/// and remembers the skipped bytes.
pub struct ReadIndex {
	map: Mmap,
	skip: usize,
	n_buckets: u32,
	stride: usize,
}

impl ReadIndex {
	pub fn open(
		data: &DataFile,
		data_end: u64,
		file_len: u64,
		n_buckets: u32,
		stride: usize,
	) -> Result<ReadIndex> {
		let granularity = map_granularity();
		let aligned = (data_end / granularity) * granularity;
		let skip = (data_end - aligned) as usize;
		let map_len = (file_len - aligned) as usize;
		check_region_len(map_len - skip, n_buckets, stride)?;
		let map =
			unsafe { MmapOptions::new().offset(aligned).len(map_len).map(data.file())? };
		Ok(ReadIndex { map, skip, n_buckets, stride })
	}

	fn region(&self) -> &[u8] {
		&self.map[self.skip..]
	}

	pub fn lookup(&self, hash: &KeyHash) -> Option<u64> {
		lookup_region(self.region(), self.n_buckets, self.stride, hash)
	}

	pub fn contains(&self, hash: &KeyHash) -> bool {
		self.lookup(hash).is_some()
	}

	pub fn entry_count(&self) -> u64 {
		((self.region().len() - bucket_table_len(self.n_buckets)) / self.stride) as u64
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::codec::{hash_key, stored_from_abs, HEADER_SIZE};
	use crate::data::{encode_record, read_record_head, DataFile};
	use crate::header::Variant;

	const STRIDE: usize = KEY_HASH_LEN + 6;
	const VARIABLE: Variant = Variant::Variable { n_bytes_value: 4 };

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("vellum-test");
			path.push("index");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn data(&self) -> DataFile {
			let file = std::fs::OpenOptions::new()
				.create(true)
				.read(true)
				.write(true)
				.open(self.0.join("log"))
				.unwrap();
			file.set_len(HEADER_SIZE as u64).unwrap();
			DataFile::new(file)
		}

		fn index(&self, n_buckets: u32) -> IndexTable {
			IndexTable::create(&self.0.join("log.tmp"), n_buckets, STRIDE).unwrap()
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	// Appends a record for `key` and returns its staged pair.
	fn append(data: &DataFile, key: &[u8]) -> (crate::codec::KeyHash, u64) {
		let at = data.len().unwrap();
		let record = encode_record(&VARIABLE, 2, key, b"v").unwrap();
		data.write_at(&record, at).unwrap();
		(hash_key(key), stored_from_abs(at))
	}

	#[test]
	fn empty_table_finds_nothing() {
		let dir = TempDir::new("empty_table_finds_nothing");
		let index = dir.index(7);
		assert_eq!(index.entry_count(), 0);
		assert!(index.lookup(&hash_key(b"anything")).is_none());
	}

	#[test]
	fn update_inserts_and_supersedes() {
		let dir = TempDir::new("update_inserts_and_supersedes");
		let data = dir.data();
		let mut index = dir.index(7);

		let a = append(&data, b"a");
		let b = append(&data, b"b");
		assert_eq!(index.update(&[a, b], &data).unwrap(), 0);
		assert_eq!(index.entry_count(), 2);
		assert_eq!(index.lookup(&a.0), Some(a.1));
		assert_eq!(index.lookup(&b.0), Some(b.1));

		// Overwrite `a`: the old entry zeroes out and the old record dies.
		let a2 = append(&data, b"a");
		assert_eq!(index.update(&[a2], &data).unwrap(), 1);
		assert_eq!(index.lookup(&a.0), Some(a2.1));
		assert_eq!(index.entry_count(), 3);
		let old_head =
			read_record_head(&data, crate::codec::abs_from_stored(a.1), &VARIABLE, 2).unwrap();
		assert!(!old_head.live);
	}

	#[test]
	fn duplicate_within_one_batch() {
		let dir = TempDir::new("duplicate_within_one_batch");
		let data = dir.data();
		let mut index = dir.index(7);

		let first = append(&data, b"k");
		let second = append(&data, b"k");
		assert_eq!(index.update(&[first, second], &data).unwrap(), 1);
		assert_eq!(index.lookup(&first.0), Some(second.1));
	}

	#[test]
	fn tombstone_zeroes_in_place() {
		let dir = TempDir::new("tombstone_zeroes_in_place");
		let data = dir.data();
		let mut index = dir.index(7);

		let a = append(&data, b"a");
		index.update(&[a], &data).unwrap();
		assert_eq!(index.tombstone(&a.0), Some(a.1));
		assert!(index.lookup(&a.0).is_none());
		// Already gone.
		assert_eq!(index.tombstone(&a.0), None);
		// The zeroed entry still occupies its slot.
		assert_eq!(index.entry_count(), 1);
	}

	#[test]
	fn grow_redistributes_live_entries() {
		let dir = TempDir::new("grow_redistributes_live_entries");
		let data = dir.data();
		let mut index = dir.index(3);

		let mut pairs = Vec::new();
		for i in 0u32..50 {
			pairs.push(append(&data, &i.to_le_bytes()));
		}
		index.update(&pairs, &data).unwrap();
		// Kill a few.
		for i in 0u32..5 {
			index.tombstone(&hash_key(&i.to_le_bytes())).unwrap();
		}
		assert_eq!(index.entry_count(), 50);

		index.grow(11).unwrap();
		assert_eq!(index.n_buckets(), 11);
		assert_eq!(index.entry_count(), 45);
		for i in 0u32..5 {
			assert!(index.lookup(&hash_key(&i.to_le_bytes())).is_none());
		}
		for (i, pair) in pairs.iter().enumerate().skip(5) {
			assert_eq!(index.lookup(&pair.0), Some(pair.1), "key {}", i);
		}
	}

	#[test]
	fn clear_resets_to_empty() {
		let dir = TempDir::new("clear_resets_to_empty");
		let data = dir.data();
		let mut index = dir.index(7);

		let pairs: Vec<_> = (0u32..10).map(|i| append(&data, &i.to_le_bytes())).collect();
		index.update(&pairs, &data).unwrap();
		index.clear().unwrap();
		assert_eq!(index.entry_count(), 0);
		assert!(index.lookup(&pairs[0].0).is_none());
		assert_eq!(index.byte_len(), bucket_table_len(7) as u64);
	}

	#[test]
	fn rewrite_offset_guards_against_orphans() {
		let dir = TempDir::new("rewrite_offset_guards_against_orphans");
		let data = dir.data();
		let mut index = dir.index(7);

		let a = append(&data, b"a");
		index.update(&[a], &data).unwrap();
		// Mismatched expectation leaves the entry alone.
		index.rewrite_offset(&a.0, a.1 + 5, 2);
		assert_eq!(index.lookup(&a.0), Some(a.1));
		index.rewrite_offset(&a.0, a.1, 2);
		assert_eq!(index.lookup(&a.0), Some(a.1 - 2));
	}

	#[test]
	fn growth_schedule() {
		assert_eq!(next_bucket_count(12_007), Some(144_013));
		assert_eq!(next_bucket_count(144_013), Some(1_728_017));
		assert_eq!(next_bucket_count(1_728_017), Some(20_736_017));
		assert_eq!(next_bucket_count(20_736_017), None);
		assert_eq!(next_bucket_count(7), None);
	}

	#[test]
	fn read_view_matches_writable_table() {
		let dir = TempDir::new("read_view_matches_writable_table");
		let data = dir.data();
		let mut index = dir.index(7);

		let pairs: Vec<_> = (0u32..20).map(|i| append(&data, &i.to_le_bytes())).collect();
		index.update(&pairs, &data).unwrap();
		index.flush().unwrap();

		// Append the region to the data file, as a close would.
		let data_end = data.len().unwrap();
		let region_len = index.byte_len();
		crate::data::copy_range(index.file(), data.file(), region_len, 0, data_end, 1024)
			.unwrap();

		let view =
			ReadIndex::open(&data, data_end, data_end + region_len, 7, STRIDE).unwrap();
		assert_eq!(view.entry_count(), 20);
		for pair in &pairs {
			assert_eq!(view.lookup(&pair.0), Some(pair.1));
		}
		assert!(view.lookup(&hash_key(b"missing")).is_none());
	}
}
