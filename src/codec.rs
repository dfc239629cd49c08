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

// Integer fields are unsigned little-endian with an explicit width.
// Keys are identified by their BLAKE2s hash truncated to 13 bytes.

pub const HEADER_SIZE: usize = 200;
pub const KEY_HASH_LEN: usize = 13;
/// Width of one bucket-offset table entry.
pub const N_BYTES_INDEX: usize = 4;
pub const DEFAULT_N_BYTES_FILE: u8 = 6;
pub const DEFAULT_N_BYTES_KEY: u8 = 2;
pub const DEFAULT_N_BYTES_VALUE: u8 = 4;
pub const FORMAT_VERSION: u16 = 3;
pub const INITIAL_N_BUCKETS: u32 = 12007;

pub type KeyHash = [u8; KEY_HASH_LEN];

pub fn hash_key(key: &[u8]) -> KeyHash {
	let mut hash = [0u8; KEY_HASH_LEN];
	hash.copy_from_slice(blake2_rfc::blake2s::blake2s(KEY_HASH_LEN, &[], key).as_bytes());
	hash
}

/// Bucket for a key hash: the 13-byte little-endian integer modulo `n_buckets`.
pub fn bucket_of(hash: &KeyHash, n_buckets: u32) -> u32 {
	let mut wide = [0u8; 16];
	wide[..KEY_HASH_LEN].copy_from_slice(hash);
	(u128::from_le_bytes(wide) % n_buckets as u128) as u32
}

/// Decode an unsigned little-endian integer of up to 8 bytes.
pub fn read_uint(bytes: &[u8]) -> u64 {
	debug_assert!(bytes.len() <= 8);
	bytes.iter().rev().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Encode `value` little-endian into the full width of `out`.
pub fn write_uint(out: &mut [u8], value: u64) {
	debug_assert!(out.len() == 8 || value >> (8 * out.len()) == 0);
	for (i, b) in out.iter_mut().enumerate() {
		*b = (value >> (8 * i)) as u8;
	}
}

pub fn push_uint(out: &mut Vec<u8>, value: u64, width: usize) {
	let start = out.len();
	out.resize(start + width, 0);
	write_uint(&mut out[start..], value);
}

/// Largest value representable in `width` bytes.
pub fn max_uint(width: usize) -> u64 {
	if width >= 8 {
		u64::MAX
	} else {
		(1u64 << (8 * width)) - 1
	}
}

// Index entries store `1 + (absolute - HEADER_SIZE)` so that zero can mark a
// superseded entry.
pub fn stored_from_abs(abs: u64) -> u64 {
	abs - HEADER_SIZE as u64 + 1
}

pub fn abs_from_stored(stored: u64) -> u64 {
	debug_assert!(stored != 0);
	HEADER_SIZE as u64 + stored - 1
}
