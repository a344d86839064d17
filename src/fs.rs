// Light filesystem abstractions
//
//  Copyright (C) 2014-2022 Ryan Specialty Group, LLC.
//
//  This file is part of bootld.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Lightweight filesystem abstraction.
//!
//! This makes no attempt to be comprehensive---it
//!   includes only what is needed for bootld.
//!
//!   - [`File`] provides a trait for opening files for reading;
//!   - [`PathFile`] pairs an open file with the path it was opened from;
//!       and
//!   - [`AtomicFile`] writes output such that the destination is either
//!       complete or absent.
//!
//! This implements traits directly atop of Rust's core structs where
//!   possible.
//!
//!
//! Atomic Output
//! =============
//! A boot image that was only partly written looks,
//!   to a boot loader,
//!   much like one that was written in full.
//! [`AtomicFile`] therefore writes to a sibling temporary file
//!   (`<dest>.tmp`)
//!   and renames it over the destination only once
//!   [committed](AtomicFile::commit).
//! If dropped before being committed,
//!   the temporary file is removed.

use std::ffi::OsString;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Result, Write};
use std::path::{Path, PathBuf};

/// Suffix of the temporary file written by [`AtomicFile`].
pub const TMP_SUFFIX: &str = ".tmp";

pub trait File: Read
where
    Self: Sized,
{
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Open the file at `path` and read it in its entirety.
    fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        Self::open(path)?.read_to_end(&mut bytes)?;

        Ok(bytes)
    }
}

impl File for fs::File {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path)
    }
}

impl<F: File + Read> File for BufReader<F> {
    /// Open the file at `path` and construct a [`BufReader`] from it.
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(BufReader::new(F::open(path)?))
    }
}

/// An open file along with the path from which it was opened.
#[derive(Debug, PartialEq)]
pub struct PathFile<F: File>(pub PathBuf, pub F);

impl<F: File> PathFile<F> {
    pub fn into_inner(self) -> F {
        self.1
    }
}

impl<F: File> File for PathFile<F> {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buf = path.as_ref().to_path_buf();
        let file = F::open(&buf)?;

        Ok(Self(buf, file))
    }
}

impl<F: File> Read for PathFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.1.read(buf)
    }
}

/// Output file that appears at its destination only once committed.
#[derive(Debug)]
pub struct AtomicFile {
    dest: PathBuf,
    tmp: PathBuf,
    file: Option<BufWriter<fs::File>>,
}

impl AtomicFile {
    /// Begin writing to `dest`.
    ///
    /// Any stale temporary file from a prior run is truncated.
    pub fn create<P: AsRef<Path>>(dest: P) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let tmp = tmp_path(&dest);
        let file = BufWriter::new(fs::File::create(&tmp)?);

        Ok(Self {
            dest,
            tmp,
            file: Some(file),
        })
    }

    /// Path of the temporary file being written.
    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    /// Flush and sync all written data,
    ///   then rename the temporary file over the destination.
    ///
    /// If any of this fails,
    ///   the temporary file is removed as if never committed.
    pub fn commit(mut self) -> Result<()> {
        if let Some(buf) = self.file.as_mut() {
            buf.flush()?;
            buf.get_ref().sync_all()?;
        }

        fs::rename(&self.tmp, &self.dest)?;
        self.file = None;

        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        // not committed
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(TMP_SUFFIX);

    name.into()
}

/// Write `contents` to `dest` atomically.
pub fn write_atomic<P: AsRef<Path>>(dest: P, contents: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(dest)?;
    file.write_all(contents)?;
    file.commit()
}
