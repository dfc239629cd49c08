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

use crate::error::{Error, Result};

/// Converts application keys or values to and from raw bytes.
///
/// The registry code is persisted in the file header so a store can be
/// reopened without repeating the serializer choice. `CODE` 0 marks a
/// user-supplied serializer: such a store must be reopened with a
/// serializer that also declares code 0, or the typed accessors fail.
pub trait Serializer {
	type Item;

	/// Registry code written to the header on creation. 0 = user-supplied.
	const CODE: u16;

	fn dumps(item: &Self::Item) -> Result<Vec<u8>>;
	fn loads(bytes: &[u8]) -> Result<Self::Item>;
}

/// Identity serializer for raw byte strings.
pub struct Bytes;

impl Serializer for Bytes {
	type Item = Vec<u8>;
	const CODE: u16 = 1;

	fn dumps(item: &Vec<u8>) -> Result<Vec<u8>> {
		Ok(item.clone())
	}

	fn loads(bytes: &[u8]) -> Result<Vec<u8>> {
		Ok(bytes.to_vec())
	}
}

/// UTF-8 strings.
pub struct Str;

impl Serializer for Str {
	type Item = String;
	const CODE: u16 = 2;

	fn dumps(item: &String) -> Result<Vec<u8>> {
		Ok(item.as_bytes().to_vec())
	}

	fn loads(bytes: &[u8]) -> Result<String> {
		String::from_utf8(bytes.to_vec())
			.map_err(|e| Error::Serialize(format!("Invalid UTF-8: {}", e)))
	}
}

/// Unsigned 64-bit integers, 8 bytes little-endian.
pub struct U64;

impl Serializer for U64 {
	type Item = u64;
	const CODE: u16 = 3;

	fn dumps(item: &u64) -> Result<Vec<u8>> {
		Ok(item.to_le_bytes().to_vec())
	}

	fn loads(bytes: &[u8]) -> Result<u64> {
		if bytes.len() != 8 {
			return Err(Error::Serialize(format!(
				"Expected 8 bytes for a u64, got {}",
				bytes.len()
			)));
		}
		let mut buf = [0u8; 8];
		buf.copy_from_slice(bytes);
		Ok(u64::from_le_bytes(buf))
	}
}

/// Checks a serializer given at open against the code stored in the header.
pub(crate) fn check_code(what: &'static str, stored: u16, given: u16) -> Result<()> {
	if stored == given {
		Ok(())
	} else if stored == 0 {
		Err(Error::SerializerMissing { what })
	} else {
		Err(Error::SerializerMismatch { what, stored, given })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bytes_round_trip() {
		let v = vec![1u8, 2, 3];
		assert_eq!(Bytes::loads(&Bytes::dumps(&v).unwrap()).unwrap(), v);
	}

	#[test]
	fn str_round_trip() {
		let s = "kākāpō".to_string();
		assert_eq!(Str::loads(&Str::dumps(&s).unwrap()).unwrap(), s);
	}

	#[test]
	fn str_rejects_invalid_utf8() {
		assert!(matches!(Str::loads(&[0xff, 0xfe]), Err(Error::Serialize(_))));
	}

	#[test]
	fn u64_round_trip() {
		assert_eq!(U64::loads(&U64::dumps(&42).unwrap()).unwrap(), 42);
		assert!(matches!(U64::loads(&[1, 2, 3]), Err(Error::Serialize(_))));
	}

	#[test]
	fn code_check() {
		assert!(check_code("key", 1, 1).is_ok());
		assert!(matches!(
			check_code("key", 0, 1),
			Err(Error::SerializerMissing { what: "key" })
		));
		assert!(matches!(
			check_code("value", 2, 1),
			Err(Error::SerializerMismatch { what: "value", stored: 2, given: 1 })
		));
	}
}
