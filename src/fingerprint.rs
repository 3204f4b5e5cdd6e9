// Copyright (c) 2021, BlockProject 3D
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without modification,
// are permitted provided that the following conditions are met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//     * Redistributions in binary form must reproduce the above copyright notice,
//       this list of conditions and the following disclaimer in the documentation
//       and/or other materials provided with the distribution.
//     * Neither the name of BlockProject 3D nor the names of its contributors
//       may be used to endorse or promote products derived from this software
//       without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT OWNER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Content-addressed file identity used by the remapper and session status.

use std::{
    fs::File,
    io::Read,
    path::Path
};

use sha2::{Digest, Sha512};

use crate::Result;

const BLOCK_SIZE: usize = 1 << 20;

/// A fingerprint: a file's length in hex concatenated with the hex SHA-512
/// of its contents.
///
/// Depends only on the bytes of the file, so two files with identical
/// content always fingerprint identically regardless of name or location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint
{
    /// Computes the fingerprint of a file already open for reading.
    pub fn of_reader<R: Read>(mut reader: R, len: u64) -> Result<Self>
    {
        let mut hasher = Sha512::new();
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        let mut s = format!("{:x}", len);
        for byte in digest {
            s.push_str(&format!("{:02x}", byte));
        }
        Ok(Fingerprint(s))
    }

    /// Computes the fingerprint of a file on disk.
    pub fn of_file(path: &Path) -> Result<Self>
    {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Self::of_reader(file, len)
    }

    /// Returns the fingerprint as its canonical hex string.
    pub fn as_str(&self) -> &str
    {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Write;

    #[test]
    fn fingerprint_depends_only_on_bytes()
    {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello world").unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(b"hello world").unwrap();

        let fa = Fingerprint::of_file(a.path()).unwrap();
        let fb = Fingerprint::of_file(b.path()).unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn fingerprint_differs_on_content_change()
    {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"hello world").unwrap();
        let fa1 = Fingerprint::of_file(a.path()).unwrap();
        a.write_all(b"!").unwrap();
        a.flush().unwrap();
        let fa2 = Fingerprint::of_file(a.path()).unwrap();
        assert_ne!(fa1, fa2);
    }
}
