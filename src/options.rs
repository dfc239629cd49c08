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

use crate::error::Error;

/// Size of the in-memory staging buffer for writes. Records are appended to
/// the data log only when the buffer fills up or on an explicit sync.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// How to open a store, following the dbm convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
	/// `r` - open an existing file for reading only.
	Read,
	/// `w` - open an existing file for reading and writing.
	Write,
	/// `c` - open for reading and writing, creating the file if needed.
	Create,
	/// `n` - always create a new, empty file, open for reading and writing.
	New,
}

impl Flag {
	pub fn is_writable(self) -> bool {
		self != Flag::Read
	}
}

impl std::str::FromStr for Flag {
	type Err = Error;

	fn from_str(s: &str) -> Result<Flag, Error> {
		match s {
			"r" => Ok(Flag::Read),
			"w" => Ok(Flag::Write),
			"c" => Ok(Flag::Create),
			"n" => Ok(Flag::New),
			other => Err(Error::InvalidFlag(other.into())),
		}
	}
}
