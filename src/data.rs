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

// On disk data log layout. The log starts right after the header and is
// strictly append-only.
//
// Record, variable-value variant:
// [TOMBSTONE: 1][KEY_LEN: n_bytes_key][VALUE_LEN: n_bytes_value][KEY][VALUE]
//
// Record, fixed-value variant:
// [TOMBSTONE: 1][KEY_LEN: n_bytes_key][KEY][VALUE: value_len]
//
// TOMBSTONE - 0x01 live, 0x00 dead. Records are never rewritten in place
// except for zeroing this byte, and for the downward shifts done by prune.

use std::fs::File;

use crate::codec::max_uint;
use crate::error::{Error, Result};
use crate::header::Variant;

const TOMBSTONE_LIVE: u8 = 0x01;

#[cfg(unix)]
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	Ok(file.read_exact_at(buf, offset)?)
}

#[cfg(unix)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	Ok(file.write_all_at(buf, offset)?)
}

#[cfg(windows)]
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	file.seek_read(buf, offset)?;
	Ok(())
}

#[cfg(windows)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	file.seek_write(buf, offset)?;
	Ok(())
}

/// Mapping offsets must be aligned to the allocation granularity.
#[cfg(unix)]
pub fn map_granularity() -> u64 {
	unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 }
}

#[cfg(windows)]
pub fn map_granularity() -> u64 {
	65536
}

/// The primary store file. All access is positioned, so shared references
/// are enough for reads; writes are serialized by the caller.
pub struct DataFile {
	file: File,
}

impl DataFile {
	pub fn new(file: File) -> DataFile {
		DataFile { file }
	}

	pub fn file(&self) -> &File {
		&self.file
	}

	pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
		read_exact_at(&self.file, buf, offset)
	}

	pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
		write_all_at(&self.file, buf, offset)
	}

	pub fn len(&self) -> Result<u64> {
		Ok(self.file.metadata()?.len())
	}

	pub fn set_len(&self, len: u64) -> Result<()> {
		Ok(self.file.set_len(len)?)
	}

	pub fn sync_data(&self) -> Result<()> {
		Ok(self.file.sync_data()?)
	}

	pub fn sync_all(&self) -> Result<()> {
		Ok(self.file.sync_all()?)
	}

	pub fn lock_shared(&self) -> Result<()> {
		Ok(fs2::FileExt::lock_shared(&self.file)?)
	}

	pub fn lock_exclusive(&self) -> Result<()> {
		Ok(fs2::FileExt::lock_exclusive(&self.file)?)
	}

	pub fn unlock(&self) -> Result<()> {
		Ok(fs2::FileExt::unlock(&self.file)?)
	}
}

/// Decoded record prefix; lengths only, payload is read separately.
#[derive(Debug, Clone, Copy)]
pub struct RecordHead {
	pub live: bool,
	pub key_len: usize,
	pub value_len: usize,
	pub head_len: usize,
}

impl RecordHead {
	pub fn total_len(&self) -> u64 {
		(self.head_len + self.key_len + self.value_len) as u64
	}
}

pub fn encode_record(
	variant: &Variant,
	n_bytes_key: usize,
	key: &[u8],
	value: &[u8],
) -> Result<Vec<u8>> {
	if key.len() as u64 > max_uint(n_bytes_key) {
		return Err(Error::InvalidInput(format!(
			"Key of {} bytes exceeds the {}-byte length field",
			key.len(),
			n_bytes_key
		)));
	}
	let mut out = Vec::with_capacity(variant.record_head_len(n_bytes_key) + key.len() + value.len());
	out.push(TOMBSTONE_LIVE);
	crate::codec::push_uint(&mut out, key.len() as u64, n_bytes_key);
	match variant {
		Variant::Variable { n_bytes_value } => {
			if value.len() as u64 > max_uint(*n_bytes_value as usize) {
				return Err(Error::InvalidInput(format!(
					"Value of {} bytes exceeds the {}-byte length field",
					value.len(),
					n_bytes_value
				)));
			}
			crate::codec::push_uint(&mut out, value.len() as u64, *n_bytes_value as usize);
		}
		Variant::Fixed { value_len } => {
			if value.len() != *value_len as usize {
				return Err(Error::InvalidInput(format!(
					"Value of {} bytes in a store with fixed value length {}",
					value.len(),
					value_len
				)));
			}
		}
	}
	out.extend_from_slice(key);
	out.extend_from_slice(value);
	Ok(out)
}

pub fn read_record_head(
	data: &DataFile,
	pos: u64,
	variant: &Variant,
	n_bytes_key: usize,
) -> Result<RecordHead> {
	let head_len = variant.record_head_len(n_bytes_key);
	let mut buf = [0u8; 17];
	data.read_at(&mut buf[..head_len], pos)?;
	let key_len = crate::codec::read_uint(&buf[1..1 + n_bytes_key]) as usize;
	let value_len = match variant {
		Variant::Variable { n_bytes_value } => crate::codec::read_uint(
			&buf[1 + n_bytes_key..1 + n_bytes_key + *n_bytes_value as usize],
		) as usize,
		Variant::Fixed { value_len } => *value_len as usize,
	};
	Ok(RecordHead { live: buf[0] != 0, key_len, value_len, head_len })
}

pub fn read_record_key(data: &DataFile, pos: u64, head: &RecordHead) -> Result<Vec<u8>> {
	let mut key = vec![0u8; head.key_len];
	data.read_at(&mut key, pos + head.head_len as u64)?;
	Ok(key)
}

pub fn read_record_value(data: &DataFile, pos: u64, head: &RecordHead) -> Result<Vec<u8>> {
	let mut value = vec![0u8; head.value_len];
	data.read_at(&mut value, pos + (head.head_len + head.key_len) as u64)?;
	Ok(value)
}

/// Zero the tombstone byte of the record at `pos`.
pub fn tombstone_record(data: &DataFile, pos: u64) -> Result<()> {
	data.write_at(&[0u8], pos)
}

/// Walks live records of the data log in file order. Dead records are
/// skipped; the excluded side of a keys-only or values-only walk is never
/// read from disk.
pub struct LogIter<'a> {
	data: &'a DataFile,
	pos: u64,
	end: u64,
	variant: Variant,
	n_bytes_key: usize,
	include_keys: bool,
	include_values: bool,
}

impl<'a> LogIter<'a> {
	pub fn new(
		data: &'a DataFile,
		pos: u64,
		end: u64,
		variant: Variant,
		n_bytes_key: usize,
		include_keys: bool,
		include_values: bool,
	) -> LogIter<'a> {
		LogIter { data, pos, end, variant, n_bytes_key, include_keys, include_values }
	}
}

impl<'a> Iterator for LogIter<'a> {
	type Item = Result<(Option<Vec<u8>>, Option<Vec<u8>>)>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if self.pos >= self.end {
				return None;
			}
			let pos = self.pos;
			let head = match read_record_head(self.data, pos, &self.variant, self.n_bytes_key) {
				Ok(head) => head,
				Err(e) => {
					self.pos = self.end;
					return Some(Err(e));
				}
			};
			self.pos += head.total_len();
			if !head.live {
				continue;
			}
			let key = if self.include_keys {
				match read_record_key(self.data, pos, &head) {
					Ok(key) => Some(key),
					Err(e) => {
						self.pos = self.end;
						return Some(Err(e));
					}
				}
			} else {
				None
			};
			let value = if self.include_values {
				match read_record_value(self.data, pos, &head) {
					Ok(value) => Some(value),
					Err(e) => {
						self.pos = self.end;
						return Some(Err(e));
					}
				}
			} else {
				None
			};
			return Some(Ok((key, value)));
		}
	}
}

/// Copies `count` bytes between files at explicit offsets. Uses
/// `copy_file_range` where the kernel provides it and falls back to a
/// buffered loop elsewhere.
pub fn copy_range(
	src: &File,
	dst: &File,
	count: u64,
	src_offset: u64,
	dst_offset: u64,
	chunk: usize,
) -> Result<()> {
	#[cfg(target_os = "linux")]
	{
		if copy_range_fast(src, dst, count, src_offset, dst_offset)? {
			return Ok(());
		}
	}
	copy_range_buffered(src, dst, count, src_offset, dst_offset, chunk)
}

#[cfg(target_os = "linux")]
fn copy_range_fast(
	src: &File,
	dst: &File,
	count: u64,
	src_offset: u64,
	dst_offset: u64,
) -> Result<bool> {
	use std::os::unix::io::AsRawFd;
	let mut off_in = src_offset as libc::loff_t;
	let mut off_out = dst_offset as libc::loff_t;
	let mut remaining = count;
	while remaining > 0 {
		let n = unsafe {
			libc::copy_file_range(
				src.as_raw_fd(),
				&mut off_in,
				dst.as_raw_fd(),
				&mut off_out,
				remaining as usize,
				0,
			)
		};
		if n < 0 {
			let err = std::io::Error::last_os_error();
			if remaining == count
				&& matches!(err.raw_os_error(), Some(libc::ENOSYS) | Some(libc::EXDEV) | Some(libc::EINVAL))
			{
				return Ok(false);
			}
			return Err(err.into());
		}
		if n == 0 {
			return Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"copy_file_range hit end of file",
			)));
		}
		remaining -= n as u64;
	}
	Ok(true)
}

fn copy_range_buffered(
	src: &File,
	dst: &File,
	count: u64,
	src_offset: u64,
	dst_offset: u64,
	chunk: usize,
) -> Result<()> {
	let mut buf = vec![0u8; chunk.max(1)];
	let mut done = 0u64;
	while done < count {
		let n = ((count - done) as usize).min(buf.len());
		read_exact_at(src, &mut buf[..n], src_offset + done)?;
		write_all_at(dst, &buf[..n], dst_offset + done)?;
		done += n as u64;
	}
	Ok(())
}

/// Moves `count` bytes from `src` down to `dst` within one file, `dst < src`.
/// Chunks are copied front to back, which is safe for this direction of
/// overlap.
pub fn shift_down(data: &DataFile, dst: u64, src: u64, count: u64, chunk: usize) -> Result<()> {
	debug_assert!(dst < src);
	let mut buf = vec![0u8; chunk.max(1)];
	let mut done = 0u64;
	while done < count {
		let n = ((count - done) as usize).min(buf.len());
		data.read_at(&mut buf[..n], src + done)?;
		data.write_at(&buf[..n], dst + done)?;
		done += n as u64;
	}
	Ok(())
}
