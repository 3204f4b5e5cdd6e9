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

//! Per-block-code reference producers.
//!
//! Each handler is only ever called for blocks whose code it is registered
//! under (see [HANDLED_CODES]), and emits zero or more `(block, field-path)`
//! pairs naming an external reference.

use crate::{
    container::{BlockHandle, Container},
    dna::field::FieldValue,
    path::RawPath,
    Result
};

/// One raw reference before it is resolved against the scene file's
/// directory: either a single path field, or a directory/filename pair
/// that must be joined to form a path and split to write one back.
#[derive(Debug, Clone)]
pub enum RawReference
{
    BlockPath
    {
        block: BlockHandle,
        field: &'static str
    },
    SequencePath
    {
        dir_block: BlockHandle,
        dir_field: &'static str,
        name_block: BlockHandle,
        name_field: &'static str
    }
}

/// Block codes this walker knows how to scan, in the order spec.md's
/// handler table lists them -- this order is part of the walker's
/// determinism contract (block-code order, then file order within a code).
/// `GR` (group) carries no external-path reference of its own -- a group
/// only ever names other in-file objects -- but is listed here so the
/// restrict-filter pass that gates ID expansion (spec.md §4.3) sees group
/// blocks the same way it sees every other ID block.
pub const HANDLED_CODES: &[&str] = &["IM", "MC", "VF", "SO", "ME", "SC", "LI", "GR"];

// Blender's IMA_SRC_* enum values that designate an on-disk reference
// rather than a generated/viewer-only image.
const IMA_SRC_FILE: i16 = 1;
const IMA_SRC_SEQUENCE: i16 = 2;
const IMA_SRC_MOVIE: i16 = 3;

fn is_null_pointer(container: &mut Container, block: BlockHandle, field: &str) -> Result<bool>
{
    match container.get_field(block, field) {
        Ok(FieldValue::Pointer(addr)) => Ok(addr == 0),
        Ok(_) => Ok(true),
        Err(_) => Ok(true)
    }
}

fn short_field(container: &mut Container, block: BlockHandle, field: &str) -> Result<i16>
{
    match container.get_field(block, field)? {
        FieldValue::Short(v) => Ok(v),
        FieldValue::Int(v) => Ok(v as i16),
        _ => Ok(0)
    }
}

/// `image`: a block-path at `name` when the image's source is a file,
/// sequence or movie, and it is not packed inline.
pub fn image(container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    if !is_null_pointer(container, block, "packedfile")? {
        return Ok(Vec::new());
    }
    let source = short_field(container, block, "source")?;
    if source == IMA_SRC_FILE || source == IMA_SRC_SEQUENCE || source == IMA_SRC_MOVIE {
        Ok(vec![RawReference::BlockPath { block, field: "name" }])
    } else {
        Ok(Vec::new())
    }
}

/// `movie-clip`: always a block-path at `name`.
pub fn movie_clip(_container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    Ok(vec![RawReference::BlockPath { block, field: "name" }])
}

/// `vector-font`: a block-path at `name`, unless packed inline.
pub fn vector_font(container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    if is_null_pointer(container, block, "packedfile")? {
        Ok(vec![RawReference::BlockPath { block, field: "name" }])
    } else {
        Ok(Vec::new())
    }
}

/// `sound`: a block-path at `name`, unless packed inline.
pub fn sound(container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    if is_null_pointer(container, block, "packedfile")? {
        Ok(vec![RawReference::BlockPath { block, field: "name" }])
    } else {
        Ok(Vec::new())
    }
}

/// `mesh`: a block-path at a referenced sub-block's `filename`, when that
/// sub-block (e.g. an external multires/cache reference) exists.
pub fn mesh(container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    match container.get_field(block, "extdata.filename") {
        Ok(_) => Ok(vec![RawReference::BlockPath { block, field: "extdata.filename" }]),
        Err(_) => Ok(Vec::new())
    }
}

/// `scene`: walks the sequence editor's strip list recursively; every
/// strip emits a sequence-path joining its `dir` and its stripdata's
/// `name`, and the walk follows `strip.next` until the chain ends.
pub fn scene(container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    let mut refs = Vec::new();
    let mut addr = match container.get_field(block, "ed.seqbase.first") {
        Ok(FieldValue::Pointer(a)) => a,
        _ => return Ok(refs)
    };

    while addr != 0 {
        let strip = match container.find_by_old_address(addr) {
            Some(s) => s,
            None => break
        };
        refs.push(RawReference::SequencePath {
            dir_block: strip,
            dir_field: "strip.dir",
            name_block: strip,
            name_field: "strip.stripdata.name"
        });
        addr = match container.get_field(strip, "strip.next") {
            Ok(FieldValue::Pointer(a)) => a,
            _ => 0
        };
    }
    Ok(refs)
}

/// `library`: a block-path at `name`, the path of a linked scene file.
pub fn library(_container: &mut Container, block: BlockHandle) -> Result<Vec<RawReference>>
{
    Ok(vec![RawReference::BlockPath { block, field: "name" }])
}

/// `group`: never emits an external reference; its member objects are
/// reached through ID expansion (spec.md §4.3), not through a path field.
pub fn group(_container: &mut Container, _block: BlockHandle) -> Result<Vec<RawReference>>
{
    Ok(Vec::new())
}

/// Runs the handler registered for `code_str`, if any.
pub fn dispatch(container: &mut Container, code_str: &str, block: BlockHandle) -> Result<Vec<RawReference>>
{
    match code_str {
        "IM" => image(container, block),
        "MC" => movie_clip(container, block),
        "VF" => vector_font(container, block),
        "SO" => sound(container, block),
        "ME" => mesh(container, block),
        "SC" => scene(container, block),
        "LI" => library(container, block),
        "GR" => group(container, block),
        _ => Ok(Vec::new())
    }
}

/// Reads the path a [RawReference] names, joining directory and filename
/// for a [RawReference::SequencePath].
pub fn resolve_path(container: &mut Container, reference: &RawReference) -> Result<RawPath>
{
    match reference {
        RawReference::BlockPath { block, field } => {
            let value = container.get_field(*block, *field)?;
            Ok(RawPath::new(value.as_str_truncated()?.into_bytes()))
        },
        RawReference::SequencePath { dir_block, dir_field, name_block, name_field } => {
            let dir = container.get_field(*dir_block, *dir_field)?.as_str_truncated()?;
            let name = container.get_field(*name_block, *name_field)?.as_str_truncated()?;
            Ok(RawPath::new(crate::path::join_bytes(&[dir.as_bytes(), name.as_bytes()])))
        }
    }
}

/// Writes a new path back into the field(s) a [RawReference] names. A
/// [RawReference::SequencePath] is split on its last `/` so the directory
/// and filename are written to their respective fields independently,
/// mirroring the source's directory/filename split on write.
pub fn write_path(container: &mut Container, reference: &RawReference, new_path: &[u8]) -> Result<()>
{
    match reference {
        RawReference::BlockPath { block, field } => container.set_char_field(*block, *field, new_path),
        RawReference::SequencePath { dir_block, dir_field, name_block, name_field } => {
            let (dir, name) = split_sequence_path(new_path);
            container.set_char_field(*dir_block, *dir_field, dir)?;
            container.set_char_field(*name_block, *name_field, name)
        }
    }
}

fn split_sequence_path(path: &[u8]) -> (&[u8], &[u8])
{
    match path.iter().rposition(|b| *b == b'/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => (&path[..0], path)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn split_sequence_path_separates_dir_and_name()
    {
        assert_eq!(split_sequence_path(b"maps/seq/a0001.png"), (&b"maps/seq"[..], &b"a0001.png"[..]));
        assert_eq!(split_sequence_path(b"a0001.png"), (&b""[..], &b"a0001.png"[..]));
    }
}
