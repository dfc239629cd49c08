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

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	Io(io::Error),
	/// Open flag was not one of `r`, `w`, `c`, `n`.
	InvalidFlag(String),
	/// Read-only open of a file that does not exist.
	FileNotFound(PathBuf),
	/// Magic bytes do not match the requested store variant.
	WrongFileType,
	/// The file was written by an older, unsupported format version.
	VersionTooOld { stored: u16, supported: u16 },
	/// A structural check on the file failed.
	Corruption(String),
	/// Mutating call on a handle opened with the `r` flag.
	ReadOnly,
	KeyNotFound,
	/// The header records a user-supplied serializer (code 0), but a
	/// built-in one was given at open.
	SerializerMissing { what: &'static str },
	/// The header records a different serializer than the one given at open.
	SerializerMismatch { what: &'static str, stored: u16, given: u16 },
	/// A serializer failed to encode or decode.
	Serialize(String),
	/// A key or value does not fit the widths the file was created with.
	InvalidInput(String),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::Io(e) => write!(f, "IO error: {}", e),
			Error::InvalidFlag(flag) => write!(f, "Invalid open flag: {:?}", flag),
			Error::FileNotFound(path) => write!(f, "File not found: {:?}", path),
			Error::WrongFileType => write!(f, "This is not the correct file type"),
			Error::VersionTooOld { stored, supported } => write!(
				f,
				"File format version {} is older than the supported version {}",
				stored, supported
			),
			Error::Corruption(e) => write!(f, "Corruption: {}", e),
			Error::ReadOnly => write!(f, "File is open for read only"),
			Error::KeyNotFound => write!(f, "Key not found"),
			Error::SerializerMissing { what } => write!(
				f,
				"The file requires a user-supplied {} serializer",
				what
			),
			Error::SerializerMismatch { what, stored, given } => write!(
				f,
				"The file was created with {} serializer code {}, but code {} was given",
				what, stored, given
			),
			Error::Serialize(e) => write!(f, "Serializer error: {}", e),
			Error::InvalidInput(e) => write!(f, "Invalid input: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}
