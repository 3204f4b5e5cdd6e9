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

//! The 12-byte container header.

use std::io::Read;

use crate::{error::Error, Result};

/// Exact byte length of the magic this format requires.
pub const MAGIC: &[u8; 7] = b"BLENDER";

/// The 12-byte header every container begins with: 7-byte magic, 1-byte
/// pointer-size tag, 1-byte endian tag, 3-byte ASCII version.
#[derive(Debug, Clone, Copy)]
pub struct Header
{
    /// 4 or 8, decoded from the `-`/`_` tag byte.
    pub pointer_size: u8,
    /// true for the `v` tag (little-endian), false for `V` (big-endian).
    pub little_endian: bool,
    /// The 3-digit ASCII version, parsed as an integer (e.g. 280 for "280").
    pub version: u32
}

impl Header
{
    /// Parses a 12-byte header from a stream already positioned at its start.
    ///
    /// # Errors
    ///
    /// Returns [Error::FormatInvalid] if the magic does not match, the
    /// pointer-size or endian tag is unknown, or the header is truncated.
    pub fn parse<R: Read>(handle: &mut R) -> Result<Header>
    {
        let mut buf = [0u8; 12];
        handle.read_exact(&mut buf).map_err(|_| Error::FormatInvalid("truncated header".into()))?;
        if &buf[0..7] != MAGIC {
            return Err(Error::FormatInvalid("bad magic".into()));
        }
        let pointer_size = match buf[7] {
            b'-' => 8,
            b'_' => 4,
            tag => return Err(Error::FormatInvalid(format!("unknown pointer-size tag {:?}", tag as char)))
        };
        let little_endian = match buf[8] {
            b'v' => true,
            b'V' => false,
            tag => return Err(Error::FormatInvalid(format!("unknown endian tag {:?}", tag as char)))
        };
        let version_str = std::str::from_utf8(&buf[9..12]).map_err(|_| Error::Utf8("header version"))?;
        let version: u32 = version_str.parse().map_err(|_| Error::FormatInvalid("non-numeric version".into()))?;
        Ok(Header { pointer_size, little_endian, version })
    }

    /// Serializes this header back to its 12-byte on-disk form.
    pub fn write<W: std::io::Write>(&self, handle: &mut W) -> Result<()>
    {
        let mut buf = [0u8; 12];
        buf[0..7].copy_from_slice(MAGIC);
        buf[7] = if self.pointer_size == 8 { b'-' } else { b'_' };
        buf[8] = if self.little_endian { b'v' } else { b'V' };
        let version = format!("{:03}", self.version);
        buf[9..12].copy_from_slice(version.as_bytes());
        handle.write_all(&buf)?;
        Ok(())
    }

    /// Size in bytes of one on-disk block header for this container
    /// (20 bytes for a 4-byte pointer, 24 bytes for an 8-byte pointer).
    pub fn block_header_size(&self) -> usize
    {
        4 + 4 + self.pointer_size as usize + 4 + 4
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_little_endian_64bit_header()
    {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"BLENDER");
        buf.push(b'-');
        buf.push(b'v');
        buf.extend_from_slice(b"280");
        let header = Header::parse(&mut buf.as_slice()).unwrap();
        assert_eq!(header.pointer_size, 8);
        assert!(header.little_endian);
        assert_eq!(header.version, 280);
        assert_eq!(header.block_header_size(), 24);
    }

    #[test]
    fn rejects_bad_magic()
    {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"NOTMAGC");
        buf.push(b'-');
        buf.push(b'v');
        buf.extend_from_slice(b"280");
        assert!(Header::parse(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn rejects_truncated_header()
    {
        let buf = b"BLEND";
        assert!(Header::parse(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn round_trips()
    {
        let header = Header { pointer_size: 4, little_endian: false, version: 279 };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let reparsed = Header::parse(&mut buf.as_slice()).unwrap();
        assert_eq!(reparsed.pointer_size, 4);
        assert_eq!(reparsed.little_endian, false);
        assert_eq!(reparsed.version, 279);
    }
}
