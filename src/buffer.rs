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

use crate::codec::KeyHash;
use crate::data::DataFile;
use crate::error::Result;

/// In-memory staging area for data log appends. Records accumulate here and
/// reach the file either when the next record would not fit or on an
/// explicit sync.
pub struct WriteBuffer {
	buf: Vec<u8>,
	capacity: usize,
}

impl WriteBuffer {
	pub fn new(capacity: usize) -> WriteBuffer {
		WriteBuffer { buf: Vec::with_capacity(capacity), capacity }
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn fits(&self, len: usize) -> bool {
		len <= self.capacity - self.buf.len()
	}

	pub fn push(&mut self, bytes: &[u8]) {
		debug_assert!(self.fits(bytes.len()));
		self.buf.extend_from_slice(bytes);
	}

	/// Appends the buffered bytes to the file at `at`, forces them to disk
	/// and empties the buffer. Returns the number of bytes written.
	pub fn flush_to(&mut self, data: &DataFile, at: u64) -> Result<u64> {
		if self.buf.is_empty() {
			return Ok(0);
		}
		data.write_at(&self.buf, at)?;
		data.sync_data()?;
		let written = self.buf.len() as u64;
		log::trace!(target: "vellum", "Flushed {} buffered bytes at {}", written, at);
		self.buf.clear();
		Ok(written)
	}
}

/// Hash and encoded data-offset pairs staged during one buffer interval,
/// drained into the bucket index right after each flush.
pub struct IndexBatch {
	pairs: Vec<(KeyHash, u64)>,
}

impl IndexBatch {
	pub fn new() -> IndexBatch {
		IndexBatch { pairs: Vec::new() }
	}

	pub fn push(&mut self, hash: KeyHash, stored_offset: u64) {
		self.pairs.push((hash, stored_offset));
	}

	pub fn drain(&mut self) -> Vec<(KeyHash, u64)> {
		std::mem::take(&mut self.pairs)
	}

	pub fn clear(&mut self) {
		self.pairs.clear();
	}
}

#[cfg(test)]
mod test {
	use super::{IndexBatch, WriteBuffer};

	#[test]
	fn buffer_tracks_remaining_space() {
		let mut buffer = WriteBuffer::new(10);
		assert!(buffer.fits(10));
		buffer.push(&[0u8; 6]);
		assert!(buffer.fits(4));
		assert!(!buffer.fits(5));
		assert_eq!(buffer.len(), 6);
	}

	#[test]
	fn batch_drains_clean() {
		let mut batch = IndexBatch::new();
		batch.push([1u8; 13], 7);
		batch.push([2u8; 13], 9);
		let pairs = batch.drain();
		assert_eq!(pairs.len(), 2);
		assert_eq!(pairs[1], ([2u8; 13], 9));
		assert!(batch.drain().is_empty());
	}
}
