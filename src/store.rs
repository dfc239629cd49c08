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

// Byte-level store. A closed file is header || data log || index. Opening
// for writing detaches the index region into `<path>.tmp`, truncates the
// primary to header || data log and appends from there; closing copies the
// auxiliary file back at the data end and stamps the header. Opening for
// reading maps the index region of the primary in place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{IndexBatch, WriteBuffer};
use crate::codec::{
	abs_from_stored, hash_key, stored_from_abs, write_uint, HEADER_SIZE, INITIAL_N_BUCKETS,
};
use crate::data::{self, DataFile, LogIter};
use crate::error::{Error, Result};
use crate::header::{Header, Variant};
use crate::index::{next_bucket_count, IndexTable, ReadIndex};
use crate::options::Flag;

/// Parameters used only when a new file is created.
pub struct NewParams {
	pub key_serializer: u16,
	pub value_serializer: u16,
	/// Fixed-value stores only.
	pub value_len: Option<u32>,
}

pub struct RawStore {
	path: PathBuf,
	data: DataFile,
	header: Header,
	mode: Mode,
	closed: AtomicBool,
}

enum Mode {
	Read(Reader),
	Write(Mutex<Writer>),
}

struct Reader {
	index: ReadIndex,
	data_end: u64,
}

struct Writer {
	index: IndexTable,
	buffer: WriteBuffer,
	batch: IndexBatch,
	n_deletes: u32,
	data_end: u64,
}

fn aux_path(path: &Path) -> PathBuf {
	let mut name = path.as_os_str().to_os_string();
	name.push(".tmp");
	PathBuf::from(name)
}

impl RawStore {
	pub fn open(
		path: &Path,
		flag: Flag,
		write_buffer_size: usize,
		fixed: bool,
		new: NewParams,
	) -> Result<RawStore> {
		let exists = match flag {
			Flag::Read | Flag::Write => true,
			Flag::Create => path.exists(),
			Flag::New => false,
		};
		if exists {
			Self::open_existing(path, flag, write_buffer_size, fixed)
		} else {
			Self::create(path, write_buffer_size, fixed, new)
		}
	}

	fn open_existing(
		path: &Path,
		flag: Flag,
		write_buffer_size: usize,
		fixed: bool,
	) -> Result<RawStore> {
		let write = flag.is_writable();
		let file = std::fs::OpenOptions::new().read(true).write(write).open(path).map_err(
			|e| {
				if e.kind() == std::io::ErrorKind::NotFound {
					Error::FileNotFound(path.into())
				} else {
					e.into()
				}
			},
		)?;
		let data = DataFile::new(file);
		if write {
			data.lock_exclusive()?;
		} else {
			data.lock_shared()?;
		}
		match Self::open_locked(&data, path, write, write_buffer_size, fixed) {
			Ok((header, mode)) => Ok(RawStore {
				path: path.into(),
				data,
				header,
				mode,
				closed: AtomicBool::new(false),
			}),
			Err(e) => {
				let _ = data.unlock();
				Err(e)
			}
		}
	}

	fn open_locked(
		data: &DataFile,
		path: &Path,
		write: bool,
		write_buffer_size: usize,
		fixed: bool,
	) -> Result<(Header, Mode)> {
		let file_len = data.len()?;
		if file_len < HEADER_SIZE as u64 {
			return Err(Error::Corruption("File is shorter than the header".into()));
		}
		let mut head_bytes = [0u8; HEADER_SIZE];
		data.read_at(&mut head_bytes, 0)?;
		let header = Header::decode(&head_bytes, fixed)?;
		let data_end = header.data_end_pos;
		if data_end < HEADER_SIZE as u64 || data_end > file_len {
			return Err(Error::Corruption(format!(
				"Data end position {} is invalid, the index needs a rebuild",
				data_end
			)));
		}
		let stride = header.entry_stride();
		if write {
			// Detach the index region into the auxiliary file, then truncate
			// the primary back to header || data log.
			let aux = aux_path(path);
			let aux_file = std::fs::OpenOptions::new()
				.create(true)
				.truncate(true)
				.read(true)
				.write(true)
				.open(&aux)?;
			data::copy_range(
				data.file(),
				&aux_file,
				file_len - data_end,
				data_end,
				0,
				write_buffer_size,
			)?;
			aux_file.sync_data()?;
			drop(aux_file);
			data.set_len(data_end)?;
			data.sync_data()?;
			let index = IndexTable::open(&aux, header.n_buckets, stride)?;
			log::debug!(
				target: "vellum",
				"Opened {:?} for writing: {} buckets, {} entries, {} deletes",
				path,
				header.n_buckets,
				index.entry_count(),
				header.n_deletes
			);
			let writer = Writer {
				index,
				buffer: WriteBuffer::new(write_buffer_size),
				batch: IndexBatch::new(),
				n_deletes: header.n_deletes,
				data_end,
			};
			Ok((header, Mode::Write(Mutex::new(writer))))
		} else {
			let index = ReadIndex::open(data, data_end, file_len, header.n_buckets, stride)?;
			log::debug!(
				target: "vellum",
				"Opened {:?} read-only: {} buckets, {} entries",
				path,
				header.n_buckets,
				index.entry_count()
			);
			Ok((header, Mode::Read(Reader { index, data_end })))
		}
	}

	fn create(
		path: &Path,
		write_buffer_size: usize,
		fixed: bool,
		new: NewParams,
	) -> Result<RawStore> {
		let variant = if fixed {
			let value_len = new.value_len.ok_or_else(|| {
				Error::InvalidInput("Creating a fixed-value store requires value_len".into())
			})?;
			Variant::Fixed { value_len }
		} else {
			Variant::Variable { n_bytes_value: crate::codec::DEFAULT_N_BYTES_VALUE }
		};
		let header =
			Header::new(variant, INITIAL_N_BUCKETS, new.key_serializer, new.value_serializer);
		let file = std::fs::OpenOptions::new()
			.create(true)
			.truncate(true)
			.read(true)
			.write(true)
			.open(path)?;
		let data = DataFile::new(file);
		data.lock_exclusive()?;
		let built = (|| -> Result<Mode> {
			data.write_at(&header.encode(), 0)?;
			data.sync_data()?;
			let index = IndexTable::create(&aux_path(path), header.n_buckets, header.entry_stride())?;
			Ok(Mode::Write(Mutex::new(Writer {
				index,
				buffer: WriteBuffer::new(write_buffer_size),
				batch: IndexBatch::new(),
				n_deletes: 0,
				data_end: HEADER_SIZE as u64,
			})))
		})();
		match built {
			Ok(mode) => {
				log::debug!(target: "vellum", "Created new store at {:?}", path);
				Ok(RawStore {
					path: path.into(),
					data,
					header,
					mode,
					closed: AtomicBool::new(false),
				})
			}
			Err(e) => {
				let _ = data.unlock();
				Err(e)
			}
		}
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn is_writable(&self) -> bool {
		matches!(self.mode, Mode::Write(_))
	}

	fn writer(&self) -> Result<MutexGuard<'_, Writer>> {
		match &self.mode {
			Mode::Write(m) => Ok(m.lock()),
			Mode::Read(_) => Err(Error::ReadOnly),
		}
	}

	fn read_value(&self, stored: u64) -> Result<Vec<u8>> {
		let pos = abs_from_stored(stored);
		let head = data::read_record_head(
			&self.data,
			pos,
			&self.header.variant,
			self.header.n_bytes_key as usize,
		)?;
		data::read_record_value(&self.data, pos, &head)
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		let hash = hash_key(key);
		match &self.mode {
			Mode::Read(r) => match r.index.lookup(&hash) {
				Some(stored) => Ok(Some(self.read_value(stored)?)),
				None => Ok(None),
			},
			Mode::Write(m) => {
				let w = m.lock();
				match w.index.lookup(&hash) {
					Some(stored) => Ok(Some(self.read_value(stored)?)),
					None => Ok(None),
				}
			}
		}
	}

	pub fn contains(&self, key: &[u8]) -> bool {
		let hash = hash_key(key);
		match &self.mode {
			Mode::Read(r) => r.index.contains(&hash),
			Mode::Write(m) => m.lock().index.contains(&hash),
		}
	}

	/// Number of live keys, derived from the index arithmetic; no scan.
	pub fn len(&self) -> u64 {
		match &self.mode {
			Mode::Read(r) => r.index.entry_count() - self.header.n_deletes as u64,
			Mode::Write(m) => {
				let w = m.lock();
				w.index.entry_count() - w.n_deletes as u64
			}
		}
	}

	pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
		let record = data::encode_record(
			&self.header.variant,
			self.header.n_bytes_key as usize,
			key,
			value,
		)?;
		let mut w = self.writer()?;
		let w = &mut *w;
		if !w.buffer.fits(record.len()) {
			self.flush_and_update(w)?;
		}
		let hash = hash_key(key);
		let stored = stored_from_abs(w.data_end + w.buffer.len() as u64);
		w.batch.push(hash, stored);
		if record.len() > w.buffer.capacity() {
			// Too big for the buffer altogether; goes straight to the log.
			self.data.write_at(&record, w.data_end)?;
			w.data_end += record.len() as u64;
			self.flush_and_update(w)?;
		} else {
			w.buffer.push(&record);
		}
		Ok(())
	}

	pub fn remove(&self, key: &[u8]) -> Result<()> {
		if !self.is_writable() {
			return Err(Error::ReadOnly);
		}
		// The latest write for this key must be indexed before we look it up.
		self.sync()?;
		let mut w = self.writer()?;
		let hash = hash_key(key);
		match w.index.tombstone(&hash) {
			Some(stored) => {
				data::tombstone_record(&self.data, abs_from_stored(stored))?;
				w.n_deletes += 1;
				// Deletes are rare; the counter is persisted right away.
				self.data.write_at(&w.n_deletes.to_le_bytes(), self.header.n_deletes_pos())?;
				Ok(())
			}
			None => Err(Error::KeyNotFound),
		}
	}

	/// Flushes buffered records and brings the index up to date with them.
	fn flush_and_update(&self, w: &mut Writer) -> Result<()> {
		let written = w.buffer.flush_to(&self.data, w.data_end)?;
		w.data_end += written;
		let pairs = w.batch.drain();
		let superseded = w.index.update(&pairs, &self.data)?;
		w.n_deletes += superseded;
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		match &self.mode {
			Mode::Read(_) => Ok(()),
			Mode::Write(m) => {
				let mut w = m.lock();
				self.sync_locked(&mut w)
			}
		}
	}

	fn sync_locked(&self, w: &mut Writer) -> Result<()> {
		self.flush_and_update(w)?;
		w.index.flush()?;
		let live = w.index.entry_count() - w.n_deletes as u64;
		if live > 10 * w.index.n_buckets() as u64 {
			if let Some(new_n_buckets) = next_bucket_count(w.index.n_buckets()) {
				log::info!(
					target: "vellum",
					"Reindexing {:?} from {} to {} buckets ({} live keys)",
					self.path,
					w.index.n_buckets(),
					new_n_buckets,
					live
				);
				w.index.grow(new_n_buckets)?;
				w.n_deletes = 0;
				// Both header fields go out together, while the writer lock
				// is still held.
				self.data.write_at(&new_n_buckets.to_le_bytes(), self.header.n_buckets_pos())?;
				self.data.write_at(&0u32.to_le_bytes(), self.header.n_deletes_pos())?;
				log::info!(target: "vellum", "Reindex of {:?} complete", self.path);
			} else {
				log::debug!(
					target: "vellum",
					"{} buckets is the top of the growth schedule, not reindexing",
					w.index.n_buckets()
				);
			}
		}
		self.data.sync_data()?;
		Ok(())
	}

	/// Compacts the data log in place, dropping dead records and rewriting
	/// the surviving data offsets. Returns the number of bytes recovered.
	pub fn prune(&self) -> Result<u64> {
		let mut w = self.writer()?;
		let w = &mut *w;
		// No writes may be in flight past this point.
		self.flush_and_update(w)?;
		let chunk = w.buffer.capacity();
		let old_len = w.data_end;
		let mut accum = HEADER_SIZE as u64;
		let mut removed = 0u64;
		while accum + removed < old_len {
			let head = data::read_record_head(
				&self.data,
				accum,
				&self.header.variant,
				self.header.n_bytes_key as usize,
			)?;
			let total = head.total_len();
			if head.live {
				if removed > 0 {
					// The record moved down; its index entry must follow.
					let key = data::read_record_key(&self.data, accum, &head)?;
					let hash = hash_key(&key);
					let expected = stored_from_abs(accum + removed);
					w.index.rewrite_offset(&hash, expected, removed);
				}
				accum += total;
			} else {
				let src = accum + total;
				let live_end = old_len - removed;
				if src > live_end {
					return Err(Error::Corruption(
						"Record extends past the end of the data log".into(),
					));
				}
				data::shift_down(&self.data, accum, src, live_end - src, chunk)?;
				removed += total;
			}
		}
		self.data.set_len(accum)?;
		w.data_end = accum;
		w.index.flush()?;
		self.data.sync_data()?;
		log::debug!(target: "vellum", "Pruned {} bytes from {:?}", removed, self.path);
		Ok(removed)
	}

	/// Resets the index to all-empty buckets. The data log keeps its bytes.
	pub fn clear(&self) -> Result<()> {
		let mut w = self.writer()?;
		let w = &mut *w;
		// Buffered records still reach the log, but nothing may resurrect
		// them through the index.
		let written = w.buffer.flush_to(&self.data, w.data_end)?;
		w.data_end += written;
		w.batch.clear();
		w.index.clear()?;
		w.n_deletes = 0;
		self.data.write_at(&0u32.to_le_bytes(), self.header.n_deletes_pos())?;
		Ok(())
	}

	/// Single pass over the data log in insertion order. Not to be
	/// interleaved with writes; records flushed later are not seen.
	pub fn iter_raw(&self, include_keys: bool, include_values: bool) -> LogIter<'_> {
		let end = match &self.mode {
			Mode::Read(r) => r.data_end,
			Mode::Write(m) => m.lock().data_end,
		};
		LogIter::new(
			&self.data,
			HEADER_SIZE as u64,
			end,
			self.header.variant,
			self.header.n_bytes_key as usize,
			include_keys,
			include_values,
		)
	}

	pub fn close(&self) -> Result<()> {
		self.finalize()
	}

	fn finalize(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		match &self.mode {
			Mode::Read(_) => self.data.unlock(),
			Mode::Write(m) => {
				let mut w = m.lock();
				let w = &mut *w;
				self.sync_locked(w)?;
				// Merge the index back into the primary and stamp the data
				// end so the next open can split it off again.
				let data_end = w.data_end;
				let region_len = w.index.byte_len();
				data::copy_range(
					w.index.file(),
					self.data.file(),
					region_len,
					0,
					data_end,
					w.buffer.capacity(),
				)?;
				self.data.write_at(&w.n_deletes.to_le_bytes(), self.header.n_deletes_pos())?;
				let mut end_bytes = [0u8; 6];
				write_uint(&mut end_bytes, data_end);
				self.data.write_at(&end_bytes, self.header.data_end_pos_pos())?;
				self.data.sync_all()?;
				std::fs::remove_file(w.index.path())?;
				log::debug!(
					target: "vellum",
					"Closed {:?}: merged {} index bytes at {}",
					self.path,
					region_len,
					data_end
				);
				self.data.unlock()
			}
		}
	}
}

impl Drop for RawStore {
	fn drop(&mut self) {
		if let Err(e) = self.finalize() {
			log::error!(target: "vellum", "Error closing {:?}: {}", self.path, e);
		}
	}
}

#[cfg(test)]
mod test {
	use super::{aux_path, NewParams, RawStore};
	use crate::codec::HEADER_SIZE;
	use crate::error::Error;
	use crate::options::Flag;

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("vellum-test");
			path.push("store");
			path.push(name);
			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn path(&self) -> std::path::PathBuf {
			self.0.join("store.blt")
		}

		fn open(&self, flag: Flag) -> crate::error::Result<RawStore> {
			self.open_buffered(flag, 4096)
		}

		fn open_buffered(&self, flag: Flag, buffer: usize) -> crate::error::Result<RawStore> {
			RawStore::open(
				&self.path(),
				flag,
				buffer,
				false,
				NewParams { key_serializer: 1, value_serializer: 1, value_len: None },
			)
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	#[test]
	fn writes_become_visible_at_sync() {
		let dir = TempDir::new("writes_become_visible_at_sync");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		// Still sitting in the write buffer.
		assert_eq!(store.get(b"a").unwrap(), None);
		assert!(!store.contains(b"a"));
		store.sync().unwrap();
		assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
		assert!(store.contains(b"a"));
	}

	#[test]
	fn oversized_records_bypass_the_buffer() {
		let dir = TempDir::new("oversized_records_bypass_the_buffer");
		let store = dir.open_buffered(Flag::New, 64).unwrap();
		let value = vec![7u8; 300];
		store.insert(b"big", &value).unwrap();
		// The direct write path pairs its own index update.
		assert_eq!(store.get(b"big").unwrap(), Some(value));
	}

	#[test]
	fn close_merges_and_reopen_splits() {
		let dir = TempDir::new("close_merges_and_reopen_splits");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		store.insert(b"b", b"2").unwrap();
		store.close().unwrap();
		drop(store);
		assert!(!aux_path(&dir.path()).exists());

		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
		assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
		assert_eq!(store.len(), 2);
		drop(store);

		// A writable reopen detaches the index again and keeps the data.
		let store = dir.open(Flag::Write).unwrap();
		assert!(aux_path(&dir.path()).exists());
		assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
		store.insert(b"c", b"3").unwrap();
		store.close().unwrap();
		drop(store);

		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.len(), 3);
		assert_eq!(store.get(b"c").unwrap(), Some(b"3".to_vec()));
	}

	#[test]
	fn drop_finalizes_without_close() {
		let dir = TempDir::new("drop_finalizes_without_close");
		{
			let store = dir.open(Flag::New).unwrap();
			store.insert(b"a", b"1").unwrap();
		}
		assert!(!aux_path(&dir.path()).exists());
		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
	}

	#[test]
	fn overwrite_keeps_len_and_counts_a_delete() {
		let dir = TempDir::new("overwrite_keeps_len_and_counts_a_delete");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"k", b"v1").unwrap();
		store.insert(b"k", b"v2").unwrap();
		store.sync().unwrap();
		assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
		assert_eq!(store.len(), 1);
		store.close().unwrap();
		drop(store);

		// The superseded-entry count survives a reopen.
		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.len(), 1);
		assert_eq!(store.header().n_deletes, 1);
	}

	#[test]
	fn remove_then_reinsert() {
		let dir = TempDir::new("remove_then_reinsert");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"k", b"v").unwrap();
		// Remove syncs on its own.
		store.remove(b"k").unwrap();
		assert!(!store.contains(b"k"));
		assert_eq!(store.len(), 0);
		assert!(matches!(store.remove(b"k"), Err(Error::KeyNotFound)));

		store.insert(b"k", b"v2").unwrap();
		store.sync().unwrap();
		assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn read_only_handles_reject_mutation() {
		let dir = TempDir::new("read_only_handles_reject_mutation");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		store.close().unwrap();
		drop(store);

		let store = dir.open(Flag::Read).unwrap();
		assert!(matches!(store.insert(b"b", b"2"), Err(Error::ReadOnly)));
		assert!(matches!(store.remove(b"a"), Err(Error::ReadOnly)));
		assert!(matches!(store.clear(), Err(Error::ReadOnly)));
		assert!(matches!(store.prune(), Err(Error::ReadOnly)));
		// Sync is a no-op on a read-only handle.
		store.sync().unwrap();
	}

	#[test]
	fn read_mode_leaves_the_file_untouched() {
		let dir = TempDir::new("read_mode_leaves_the_file_untouched");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		store.insert(b"b", b"2").unwrap();
		store.close().unwrap();
		drop(store);

		let before = std::fs::read(dir.path()).unwrap();
		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
		let _ = store.len();
		let walked: Vec<_> = store.iter_raw(true, true).collect();
		assert_eq!(walked.len(), 2);
		store.close().unwrap();
		drop(store);
		assert_eq!(std::fs::read(dir.path()).unwrap(), before);
	}

	#[test]
	fn missing_file_errors() {
		let dir = TempDir::new("missing_file_errors");
		assert!(matches!(dir.open(Flag::Read), Err(Error::FileNotFound(_))));
		assert!(matches!(dir.open(Flag::Write), Err(Error::FileNotFound(_))));
	}

	#[test]
	fn corrupt_data_end_is_refused() {
		let dir = TempDir::new("corrupt_data_end_is_refused");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		let data_end_pos_pos = store.header().data_end_pos_pos();
		store.close().unwrap();
		drop(store);

		// Stamp a data end inside the header area.
		let mut bytes = std::fs::read(dir.path()).unwrap();
		for b in
			bytes[data_end_pos_pos as usize..data_end_pos_pos as usize + 6].iter_mut()
		{
			*b = 0;
		}
		bytes[data_end_pos_pos as usize] = (HEADER_SIZE - 1) as u8;
		std::fs::write(dir.path(), &bytes).unwrap();

		assert!(matches!(dir.open(Flag::Write), Err(Error::Corruption(_))));
		// The refusal does not modify the file.
		assert_eq!(std::fs::read(dir.path()).unwrap(), bytes);
	}

	#[test]
	fn prune_reclaims_dead_records() {
		let dir = TempDir::new("prune_reclaims_dead_records");
		let store = dir.open(Flag::New).unwrap();
		for i in 0u8..10 {
			store.insert(&[i], &[i, i, i]).unwrap();
		}
		store.sync().unwrap();
		// Each record is 1 + 2 + 4 + 1 + 3 bytes.
		let record_len = 11u64;
		for i in 0u8..5 {
			store.remove(&[i]).unwrap();
		}
		let recovered = store.prune().unwrap();
		assert_eq!(recovered, 5 * record_len);
		assert_eq!(store.len(), 5);
		for i in 5u8..10 {
			assert_eq!(store.get(&[i]).unwrap(), Some(vec![i, i, i]));
		}
		store.close().unwrap();
		drop(store);

		// Survivors and their rewritten offsets persist.
		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.len(), 5);
		for i in 5u8..10 {
			assert_eq!(store.get(&[i]).unwrap(), Some(vec![i, i, i]));
		}
	}

	#[test]
	fn prune_is_a_no_op_without_tombstones() {
		let dir = TempDir::new("prune_is_a_no_op_without_tombstones");
		let store = dir.open(Flag::New).unwrap();
		for i in 0u8..4 {
			store.insert(&[i], b"x").unwrap();
		}
		assert_eq!(store.prune().unwrap(), 0);
		assert_eq!(store.len(), 4);
	}

	#[test]
	fn clear_empties_the_index_only() {
		let dir = TempDir::new("clear_empties_the_index_only");
		let store = dir.open(Flag::New).unwrap();
		store.insert(b"a", b"1").unwrap();
		store.insert(b"b", b"2").unwrap();
		store.sync().unwrap();
		let log_len_before = {
			let walked: Vec<_> = store.iter_raw(true, false).collect();
			walked.len()
		};
		assert_eq!(log_len_before, 2);

		store.clear().unwrap();
		assert_eq!(store.len(), 0);
		assert!(!store.contains(b"a"));
		assert_eq!(store.get(b"b").unwrap(), None);
		// Cleared keys stay gone across sync and reopen.
		store.insert(b"c", b"3").unwrap();
		store.sync().unwrap();
		assert_eq!(store.len(), 1);
		store.close().unwrap();
		drop(store);

		let store = dir.open(Flag::Read).unwrap();
		assert_eq!(store.len(), 1);
		assert!(store.contains(b"c"));
		assert!(!store.contains(b"a"));
	}

	fn value(size: usize) -> Vec<u8> {
		use rand::RngCore;
		let mut result = vec![0u8; size];
		rand::thread_rng().fill_bytes(&mut result);
		result
	}

	#[test]
	fn randomized_values_survive_reopen_and_prune() {
		use rand::Rng;
		let dir = TempDir::new("randomized_values_survive_reopen_and_prune");
		let store = dir.open(Flag::New).unwrap();
		let mut rng = rand::thread_rng();
		let values: Vec<Vec<u8>> =
			(0..50).map(|_| value(rng.gen_range(0..2000))).collect();
		for (i, v) in values.iter().enumerate() {
			store.insert(&(i as u32).to_le_bytes(), v).unwrap();
		}
		store.sync().unwrap();
		for i in (0..50).step_by(3) {
			store.remove(&(i as u32).to_le_bytes()).unwrap();
		}
		store.prune().unwrap();
		store.close().unwrap();
		drop(store);

		let store = dir.open(Flag::Read).unwrap();
		for (i, v) in values.iter().enumerate() {
			let got = store.get(&(i as u32).to_le_bytes()).unwrap();
			if i % 3 == 0 {
				assert_eq!(got, None);
			} else {
				assert_eq!(got.as_ref(), Some(v));
			}
		}
	}

	#[test]
	fn iteration_sees_flushed_records_in_order() {
		let dir = TempDir::new("iteration_sees_flushed_records_in_order");
		let store = dir.open(Flag::New).unwrap();
		for i in 0u8..5 {
			store.insert(&[i], &[i]).unwrap();
		}
		store.sync().unwrap();
		store.remove(&[2]).unwrap();

		let keys: Vec<_> = store
			.iter_raw(true, false)
			.map(|r| r.unwrap().0.unwrap())
			.collect();
		assert_eq!(keys, vec![vec![0], vec![1], vec![3], vec![4]]);
		assert_eq!(keys.len() as u64, store.len());
	}
}
