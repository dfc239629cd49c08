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

//! Embedded single-file persistent key-value store.
//!
//! A store is one file holding a fixed header, an append-only data log of
//! tombstoned records and a bucketed hash index over 13-byte BLAKE2s key
//! hashes. While open for writing the index lives in an auxiliary
//! `<path>.tmp` file and is merged back on close. Writes are staged in a
//! memory buffer and become visible to reads at the next buffer flush or
//! explicit [`Store::sync`].
//!
//! ```no_run
//! use vellum::{Flag, Store, Str, U64};
//!
//! # fn main() -> vellum::Result<()> {
//! let store: Store<Str, U64> = Store::open("counts.blt", Flag::Create)?;
//! store.insert(&"visits".to_string(), &1)?;
//! store.sync()?;
//! assert_eq!(store.get(&"visits".to_string())?, Some(1));
//! for item in store.iter() {
//!     let (key, count) = item?;
//!     println!("{}: {}", key, count);
//! }
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod codec;
mod data;
mod db;
mod display;
mod error;
mod header;
mod index;
mod options;
mod serializer;
mod store;

pub use db::{open, FixedStore, Iter, Keys, Store, Values};
pub use error::{Error, Result};
pub use options::{Flag, DEFAULT_WRITE_BUFFER_SIZE};
pub use serializer::{Bytes, Serializer, Str, U64};
