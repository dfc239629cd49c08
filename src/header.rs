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

// On disk header layout. 200 bytes, padded with ASCII '0'.
//
// [MAGIC: 16][VERSION: 2][N_BYTES_FILE: 1][N_BYTES_KEY: 1]
// then, variable-value variant:
//   [N_BYTES_VALUE: 1][N_BUCKETS: 4][N_BYTES_INDEX: 4]
//   [VALUE_SERIALIZER: 2][KEY_SERIALIZER: 2][N_DELETES: 4][DATA_END: 6]
// or, fixed-value variant:
//   [VALUE_LEN: 4][N_BUCKETS: 4][N_BYTES_INDEX: 4]
//   [VALUE_SERIALIZER: 2][KEY_SERIALIZER: 2][N_DELETES: 4][DATA_END: 6]
//
// MAGIC - distinct UUID per variant.
// N_BYTES_FILE - width of the data-offset field in index entries.
// N_BYTES_KEY / N_BYTES_VALUE - widths of the record length prefixes.
// VALUE_LEN - exact value size shared by every record (fixed variant).
// N_BYTES_INDEX - width of one bucket-offset table entry. Always 4.
// N_DELETES - superseded index entries since the last prune.
// DATA_END - end of the data log, i.e. where the index region starts.
// Meaningful only after a clean close; zero until then.

use crate::codec::{
	push_uint, read_uint, HEADER_SIZE, KEY_HASH_LEN, N_BYTES_INDEX, FORMAT_VERSION,
};
use crate::error::{Error, Result};

const UUID_VARIABLE: [u8; 16] = [
	0x4f, 0x7e, 0x8a, 0x3f, 0xe7, 0x5c, 0x47, 0x50, 0xad, 0x43, 0x0a, 0x72, 0x8f, 0xe3, 0x1c,
	0xfe,
];
const UUID_FIXED: [u8; 16] = [
	0x04, 0xd3, 0xb2, 0x94, 0xf2, 0x10, 0x41, 0x62, 0x95, 0x8d, 0x04, 0x00, 0x73, 0x8c, 0x9e,
	0x0a,
];
const PAD: u8 = b'0';

/// Record shape of the store. The two variants differ only in how the value
/// length is known: from a per-record prefix, or from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
	Variable { n_bytes_value: u8 },
	Fixed { value_len: u32 },
}

impl Variant {
	pub fn is_fixed(&self) -> bool {
		matches!(self, Variant::Fixed { .. })
	}

	/// Bytes preceding the key in a record: tombstone plus length prefixes.
	pub fn record_head_len(&self, n_bytes_key: usize) -> usize {
		match self {
			Variant::Variable { n_bytes_value } => 1 + n_bytes_key + *n_bytes_value as usize,
			Variant::Fixed { .. } => 1 + n_bytes_key,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
	pub variant: Variant,
	pub n_bytes_file: u8,
	pub n_bytes_key: u8,
	pub n_buckets: u32,
	pub value_serializer: u16,
	pub key_serializer: u16,
	pub n_deletes: u32,
	pub data_end_pos: u64,
}

impl Header {
	pub fn new(variant: Variant, n_buckets: u32, key_serializer: u16, value_serializer: u16) -> Header {
		Header {
			variant,
			n_bytes_file: crate::codec::DEFAULT_N_BYTES_FILE,
			n_bytes_key: crate::codec::DEFAULT_N_BYTES_KEY,
			n_buckets,
			value_serializer,
			key_serializer,
			n_deletes: 0,
			// Written as zero on creation and only set on a clean close.
			data_end_pos: 0,
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(HEADER_SIZE);
		match self.variant {
			Variant::Variable { .. } => out.extend_from_slice(&UUID_VARIABLE),
			Variant::Fixed { .. } => out.extend_from_slice(&UUID_FIXED),
		}
		out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
		out.push(self.n_bytes_file);
		out.push(self.n_bytes_key);
		match self.variant {
			Variant::Variable { n_bytes_value } => out.push(n_bytes_value),
			Variant::Fixed { value_len } => out.extend_from_slice(&value_len.to_le_bytes()),
		}
		out.extend_from_slice(&self.n_buckets.to_le_bytes());
		out.extend_from_slice(&(N_BYTES_INDEX as u32).to_le_bytes());
		out.extend_from_slice(&self.value_serializer.to_le_bytes());
		out.extend_from_slice(&self.key_serializer.to_le_bytes());
		out.extend_from_slice(&self.n_deletes.to_le_bytes());
		push_uint(&mut out, self.data_end_pos, 6);
		out.resize(HEADER_SIZE, PAD);
		out
	}

	pub fn decode(bytes: &[u8], fixed: bool) -> Result<Header> {
		if bytes.len() < HEADER_SIZE {
			return Err(Error::Corruption("File is shorter than the header".into()));
		}
		let expected = if fixed { &UUID_FIXED } else { &UUID_VARIABLE };
		if &bytes[0..16] != expected {
			return Err(Error::WrongFileType);
		}
		let version = read_uint(&bytes[16..18]) as u16;
		if version < FORMAT_VERSION {
			return Err(Error::VersionTooOld { stored: version, supported: FORMAT_VERSION });
		}
		let n_bytes_file = bytes[18];
		let n_bytes_key = bytes[19];
		let (variant, pos) = if fixed {
			let value_len = read_uint(&bytes[20..24]) as u32;
			(Variant::Fixed { value_len }, 24)
		} else {
			let n_bytes_value = bytes[20];
			if n_bytes_value < 1 || n_bytes_value > 8 {
				return Err(Error::Corruption(format!(
					"Unsupported value length width {}",
					n_bytes_value
				)));
			}
			(Variant::Variable { n_bytes_value }, 21)
		};
		if n_bytes_file < 1 || n_bytes_file > 8 {
			return Err(Error::Corruption(format!("Unsupported offset width {}", n_bytes_file)));
		}
		if n_bytes_key < 1 || n_bytes_key > 8 {
			return Err(Error::Corruption(format!("Unsupported key length width {}", n_bytes_key)));
		}
		let n_buckets = read_uint(&bytes[pos..pos + 4]) as u32;
		if n_buckets == 0 {
			return Err(Error::Corruption("Zero bucket count".into()));
		}
		let n_bytes_index = read_uint(&bytes[pos + 4..pos + 8]) as usize;
		if n_bytes_index != N_BYTES_INDEX {
			return Err(Error::Corruption(format!(
				"Unsupported bucket offset width {}",
				n_bytes_index
			)));
		}
		let value_serializer = read_uint(&bytes[pos + 8..pos + 10]) as u16;
		let key_serializer = read_uint(&bytes[pos + 10..pos + 12]) as u16;
		let n_deletes = read_uint(&bytes[pos + 12..pos + 16]) as u32;
		let data_end_pos = read_uint(&bytes[pos + 16..pos + 22]);
		Ok(Header {
			variant,
			n_bytes_file,
			n_bytes_key,
			n_buckets,
			value_serializer,
			key_serializer,
			n_deletes,
			data_end_pos,
		})
	}

	pub fn n_buckets_pos(&self) -> u64 {
		if self.variant.is_fixed() {
			24
		} else {
			21
		}
	}

	pub fn n_deletes_pos(&self) -> u64 {
		if self.variant.is_fixed() {
			36
		} else {
			33
		}
	}

	pub fn data_end_pos_pos(&self) -> u64 {
		self.n_deletes_pos() + 4
	}

	/// Byte length of one index entry: the truncated hash plus a data offset.
	pub fn entry_stride(&self) -> usize {
		KEY_HASH_LEN + self.n_bytes_file as usize
	}
}
