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

//! Blocks and the handle that addresses them.

/// An opaque, stable reference to one block in a [Container](super::Container).
///
/// Blocks live in an arena (`Vec<Block>`) owned by the container; nothing
/// outside the container ever holds a native reference to a block, only
/// this handle -- the on-disk graph is cyclic, so a native reference graph
/// would not work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(pub(crate) u32);

impl BlockHandle
{
    pub(crate) fn index(self) -> usize
    {
        self.0 as usize
    }
}

/// The 4-byte code naming a block's kind, e.g. `DNA1`, `ENDB`, `LI`.
pub type Code = [u8; 4];

/// Returns a 4-byte, NUL-padded code from a short ASCII string (`"LI"` -> `[L, I, 0, 0]`).
pub fn code(s: &str) -> Code
{
    let mut c = [0u8; 4];
    let bytes = s.as_bytes();
    let n = bytes.len().min(4);
    c[..n].copy_from_slice(&bytes[..n]);
    c
}

/// Renders a code back to a trimmed ASCII string for display/logging.
pub fn code_str(c: &Code) -> String
{
    let end = c.iter().position(|b| *b == 0).unwrap_or(4);
    String::from_utf8_lossy(&c[..end]).into_owned()
}

/// A block header plus the file offset its payload starts at.
///
/// `payload_len` equals `dna_struct_size * count` for ordinary blocks,
/// except for raw-data blocks (`code == "DATA"`) whose payload is
/// uninterpreted.
#[derive(Debug, Clone, Copy)]
pub struct Block
{
    pub code: Code,
    pub payload_len: u32,
    pub old_address: u64,
    pub sdna_index: u32,
    pub count: u32,
    /// Absolute offset of the payload (just past the block header) within
    /// the container's underlying stream.
    pub file_offset: u64
}

impl Block
{
    /// The terminal sentinel block every container ends with.
    pub fn endb() -> Block
    {
        Block { code: code("ENDB"), payload_len: 0, old_address: 0, sdna_index: 0, count: 0, file_offset: 0 }
    }

    /// True if this is the terminal sentinel.
    pub fn is_endb(&self) -> bool
    {
        self.code == code("ENDB")
    }

    /// Trimmed ASCII form of [Block::code].
    pub fn code_str(&self) -> String
    {
        code_str(&self.code)
    }
}
