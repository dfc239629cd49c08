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

// Typed wrappers over the byte-level store. These only marshal keys and
// values through their serializers and delegate everything else.

use std::marker::PhantomData;
use std::path::Path;

use crate::data::LogIter;
use crate::error::Result;
use crate::header::Variant;
use crate::options::{Flag, DEFAULT_WRITE_BUFFER_SIZE};
use crate::serializer::{check_code, Bytes, Serializer};
use crate::store::{NewParams, RawStore};

/// Opens a variable-value store of raw byte strings.
pub fn open<P: AsRef<Path>>(path: P, flag: Flag) -> Result<Store<Bytes, Bytes>> {
	Store::open(path, flag)
}

/// Persistent map with variable-length values. `KS` and `VS` serialize keys
/// and values; their registry codes are recorded in the file on creation and
/// checked on every later open.
pub struct Store<KS = Bytes, VS = Bytes> {
	raw: RawStore,
	_marker: PhantomData<fn() -> (KS, VS)>,
}

impl<KS: Serializer, VS: Serializer> Store<KS, VS> {
	pub fn open<P: AsRef<Path>>(path: P, flag: Flag) -> Result<Store<KS, VS>> {
		Self::open_with_buffer(path, flag, DEFAULT_WRITE_BUFFER_SIZE)
	}

	pub fn open_with_buffer<P: AsRef<Path>>(
		path: P,
		flag: Flag,
		write_buffer_size: usize,
	) -> Result<Store<KS, VS>> {
		let raw = RawStore::open(
			path.as_ref(),
			flag,
			write_buffer_size,
			false,
			NewParams {
				key_serializer: KS::CODE,
				value_serializer: VS::CODE,
				value_len: None,
			},
		)?;
		check_code("key", raw.header().key_serializer, KS::CODE)?;
		check_code("value", raw.header().value_serializer, VS::CODE)?;
		Ok(Store { raw, _marker: PhantomData })
	}

	pub fn get(&self, key: &KS::Item) -> Result<Option<VS::Item>> {
		match self.raw.get(&KS::dumps(key)?)? {
			Some(bytes) => Ok(Some(VS::loads(&bytes)?)),
			None => Ok(None),
		}
	}

	pub fn insert(&self, key: &KS::Item, value: &VS::Item) -> Result<()> {
		self.raw.insert(&KS::dumps(key)?, &VS::dumps(value)?)
	}

	pub fn remove(&self, key: &KS::Item) -> Result<()> {
		self.raw.remove(&KS::dumps(key)?)
	}

	pub fn contains(&self, key: &KS::Item) -> Result<bool> {
		Ok(self.raw.contains(&KS::dumps(key)?))
	}

	pub fn len(&self) -> u64 {
		self.raw.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn update<I: IntoIterator<Item = (KS::Item, VS::Item)>>(&self, items: I) -> Result<()> {
		for (key, value) in items {
			self.insert(&key, &value)?;
		}
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		self.raw.sync()
	}

	pub fn clear(&self) -> Result<()> {
		self.raw.clear()
	}

	pub fn prune(&self) -> Result<u64> {
		self.raw.prune()
	}

	pub fn close(self) -> Result<()> {
		self.raw.close()
	}

	pub fn keys(&self) -> Keys<'_, KS> {
		Keys { inner: self.raw.iter_raw(true, false), _marker: PhantomData }
	}

	pub fn values(&self) -> Values<'_, VS> {
		Values { inner: self.raw.iter_raw(false, true), _marker: PhantomData }
	}

	pub fn iter(&self) -> Iter<'_, KS, VS> {
		Iter { inner: self.raw.iter_raw(true, true), _marker: PhantomData }
	}
}

/// Persistent map where every value has the same length, fixed at creation.
/// Values are raw bytes; only keys go through a serializer.
pub struct FixedStore<KS = Bytes> {
	raw: RawStore,
	_marker: PhantomData<fn() -> KS>,
}

impl<KS: Serializer> FixedStore<KS> {
	/// `value_len` is required when the call creates the file and ignored
	/// when it opens an existing one.
	pub fn open<P: AsRef<Path>>(
		path: P,
		flag: Flag,
		value_len: Option<u32>,
	) -> Result<FixedStore<KS>> {
		Self::open_with_buffer(path, flag, value_len, DEFAULT_WRITE_BUFFER_SIZE)
	}

	pub fn open_with_buffer<P: AsRef<Path>>(
		path: P,
		flag: Flag,
		value_len: Option<u32>,
		write_buffer_size: usize,
	) -> Result<FixedStore<KS>> {
		let raw = RawStore::open(
			path.as_ref(),
			flag,
			write_buffer_size,
			true,
			NewParams { key_serializer: KS::CODE, value_serializer: 0, value_len },
		)?;
		check_code("key", raw.header().key_serializer, KS::CODE)?;
		Ok(FixedStore { raw, _marker: PhantomData })
	}

	pub fn value_len(&self) -> u32 {
		match self.raw.header().variant {
			Variant::Fixed { value_len } => value_len,
			Variant::Variable { .. } => unreachable!("Fixed store with a variable header"),
		}
	}

	pub fn get(&self, key: &KS::Item) -> Result<Option<Vec<u8>>> {
		self.raw.get(&KS::dumps(key)?)
	}

	pub fn insert(&self, key: &KS::Item, value: &[u8]) -> Result<()> {
		self.raw.insert(&KS::dumps(key)?, value)
	}

	pub fn remove(&self, key: &KS::Item) -> Result<()> {
		self.raw.remove(&KS::dumps(key)?)
	}

	pub fn contains(&self, key: &KS::Item) -> Result<bool> {
		Ok(self.raw.contains(&KS::dumps(key)?))
	}

	pub fn len(&self) -> u64 {
		self.raw.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn update<I: IntoIterator<Item = (KS::Item, Vec<u8>)>>(&self, items: I) -> Result<()> {
		for (key, value) in items {
			self.insert(&key, &value)?;
		}
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		self.raw.sync()
	}

	pub fn clear(&self) -> Result<()> {
		self.raw.clear()
	}

	pub fn prune(&self) -> Result<u64> {
		self.raw.prune()
	}

	pub fn close(self) -> Result<()> {
		self.raw.close()
	}

	pub fn keys(&self) -> Keys<'_, KS> {
		Keys { inner: self.raw.iter_raw(true, false), _marker: PhantomData }
	}

	pub fn values(&self) -> Values<'_, Bytes> {
		Values { inner: self.raw.iter_raw(false, true), _marker: PhantomData }
	}

	pub fn iter(&self) -> Iter<'_, KS, Bytes> {
		Iter { inner: self.raw.iter_raw(true, true), _marker: PhantomData }
	}
}

pub struct Keys<'a, KS> {
	inner: LogIter<'a>,
	_marker: PhantomData<fn() -> KS>,
}

impl<'a, KS: Serializer> Iterator for Keys<'a, KS> {
	type Item = Result<KS::Item>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.inner.next()? {
			Ok((Some(key), _)) => Some(KS::loads(&key)),
			Ok(_) => panic!("Key walk yielded no key"),
			Err(e) => Some(Err(e)),
		}
	}
}

pub struct Values<'a, VS> {
	inner: LogIter<'a>,
	_marker: PhantomData<fn() -> VS>,
}

impl<'a, VS: Serializer> Iterator for Values<'a, VS> {
	type Item = Result<VS::Item>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.inner.next()? {
			Ok((_, Some(value))) => Some(VS::loads(&value)),
			Ok(_) => panic!("Value walk yielded no value"),
			Err(e) => Some(Err(e)),
		}
	}
}

pub struct Iter<'a, KS, VS> {
	inner: LogIter<'a>,
	_marker: PhantomData<fn() -> (KS, VS)>,
}

impl<'a, KS: Serializer, VS: Serializer> Iterator for Iter<'a, KS, VS> {
	type Item = Result<(KS::Item, VS::Item)>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.inner.next()? {
			Ok((Some(key), Some(value))) => {
				Some(KS::loads(&key).and_then(|k| VS::loads(&value).map(|v| (k, v))))
			}
			Ok(_) => panic!("Item walk yielded an incomplete record"),
			Err(e) => Some(Err(e)),
		}
	}
}
