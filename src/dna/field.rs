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

//! Dotted field paths compiled against a struct into a flat offset plus a
//! tagged leaf accessor, so that repeated access never re-parses the path
//! or re-walks the struct tree.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::DnaCatalog;
use crate::{container::header::Header, error::Error, Result};

/// A dotted field path (`"ed.seqbase.first"`), split once into its
/// components.
#[derive(Debug, Clone)]
pub struct FieldPath(Vec<Box<str>>);

impl FieldPath
{
    /// Splits a dotted path string into components.
    pub fn parse(path: &str) -> FieldPath
    {
        FieldPath(path.split('.').map(Box::from).collect())
    }

    /// Returns the path components.
    pub fn components(&self) -> &[Box<str>]
    {
        &self.0
    }
}

/// The leaf type a compiled field path resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leaf
{
    /// Any pointer-typed field: read as a pointer-sized unsigned integer.
    Pointer,
    Int,
    Short,
    Float,
    /// A fixed-width character array of `len` bytes.
    Char
    {
        len: u32
    }
}

/// A field path already resolved against one struct: a flat byte offset
/// from the start of the block, plus the leaf accessor to use at that
/// offset.
#[derive(Debug, Clone)]
pub struct CompiledField
{
    pub offset: u32,
    pub leaf: Leaf,
    pub size: u32
}

/// A field value decoded from the container according to its leaf type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue
{
    Pointer(u64),
    Int(i32),
    Short(i16),
    Float(f32),
    /// Raw bytes of a `char` array field, not yet decoded or truncated.
    Bytes(Vec<u8>)
}

impl FieldValue
{
    /// Decodes a [FieldValue::Bytes] as UTF-8, truncated at the first NUL.
    ///
    /// # Errors
    ///
    /// Returns [Error::Utf8] if the value is not a [FieldValue::Bytes], or
    /// the bytes are not valid UTF-8.
    pub fn as_str_truncated(&self) -> Result<String>
    {
        match self {
            FieldValue::Bytes(b) => {
                let end = b.iter().position(|c| *c == 0).unwrap_or(b.len());
                std::str::from_utf8(&b[..end]).map(str::to_string).map_err(|_| Error::Utf8("char field"))
            },
            _ => Err(Error::Utf8("field is not a char array"))
        }
    }
}

/// Resolves `path` against the struct at `struct_index`, walking one
/// component at a time and accumulating a flat byte offset, recursing into
/// nested compound structs for every component but the last.
pub fn compile(catalog: &DnaCatalog, struct_index: usize, path: &str) -> Result<CompiledField>
{
    let fp = FieldPath::parse(path);
    let components = fp.components();
    if components.is_empty() {
        return Err(Error::DnaInvalid("empty field path".into()));
    }

    let mut offset: u32 = 0;
    let mut cur_struct = struct_index;
    let last = components.len() - 1;

    for (i, comp) in components.iter().enumerate() {
        let st = catalog
            .structs
            .get(cur_struct)
            .ok_or_else(|| Error::DnaInvalid(format!("struct index {} out of range", cur_struct)))?;
        let field = st
            .fields
            .iter()
            .find(|f| catalog.names[f.name_index].short_name.as_str() == comp.as_ref())
            .ok_or_else(|| Error::DnaInvalid(format!("field {:?} not found in path {:?}", comp, path)))?;
        offset += field.offset;
        let name = &catalog.names[field.name_index];
        let ftype = &catalog.types[field.type_index];

        if i == last {
            let leaf = if name.is_pointer || name.is_function_pointer {
                Leaf::Pointer
            } else {
                match ftype.name.as_str() {
                    "int" => Leaf::Int,
                    "short" => Leaf::Short,
                    "float" => Leaf::Float,
                    "char" => Leaf::Char { len: name.array_size },
                    other => {
                        return Err(Error::Unsupported(format!("no leaf accessor for field type {:?}", other)))
                    }
                }
            };
            return Ok(CompiledField { offset, leaf, size: field.size });
        } else {
            cur_struct = ftype
                .struct_index
                .ok_or_else(|| Error::DnaInvalid(format!("field {:?} is not a compound type", comp)))?;
        }
    }
    unreachable!()
}

/// Reads the value a compiled field describes, from `block_offset +
/// compiled.offset` in `handle`.
pub fn read<R: Read + Seek>(handle: &mut R, header: &Header, block_offset: u64, compiled: &CompiledField) -> Result<FieldValue>
{
    handle.seek(SeekFrom::Start(block_offset + compiled.offset as u64))?;
    Ok(match compiled.leaf {
        Leaf::Pointer => {
            let v = if header.pointer_size == 8 {
                if header.little_endian { handle.read_u64::<LittleEndian>()? } else { handle.read_u64::<BigEndian>()? }
            } else {
                (if header.little_endian { handle.read_u32::<LittleEndian>()? } else { handle.read_u32::<BigEndian>()? }) as u64
            };
            FieldValue::Pointer(v)
        },
        Leaf::Int => {
            let v = if header.little_endian { handle.read_i32::<LittleEndian>()? } else { handle.read_i32::<BigEndian>()? };
            FieldValue::Int(v)
        },
        Leaf::Short => {
            let v = if header.little_endian { handle.read_i16::<LittleEndian>()? } else { handle.read_i16::<BigEndian>()? };
            FieldValue::Short(v)
        },
        Leaf::Float => {
            let v = if header.little_endian { handle.read_f32::<LittleEndian>()? } else { handle.read_f32::<BigEndian>()? };
            FieldValue::Float(v)
        },
        Leaf::Char { len } => {
            let mut buf = vec![0u8; len as usize];
            handle.read_exact(&mut buf).map_err(|_| Error::Truncation("char field"))?;
            FieldValue::Bytes(buf)
        }
    })
}

/// Writes a `char` field. Mirrors [read]: a string shorter than the field
/// width is written followed by a single NUL; a longer one is truncated to
/// the field width. Writing any other leaf type is a non-goal and returns
/// [Error::Unsupported] rather than silently succeeding.
pub fn write_char<W: Write + Seek>(handle: &mut W, block_offset: u64, compiled: &CompiledField, value: &[u8]) -> Result<()>
{
    let len = match compiled.leaf {
        Leaf::Char { len } => len as usize,
        other => return Err(Error::Unsupported(format!("writing a {:?} field is not supported", other)))
    };
    handle.seek(SeekFrom::Start(block_offset + compiled.offset as u64))?;
    if value.len() >= len {
        handle.write_all(&value[..len])?;
    } else {
        handle.write_all(value)?;
        handle.write_all(&[0u8])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::dna::{DnaCatalog, DnaField, DnaName, DnaStruct, DnaType};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn sample_catalog() -> DnaCatalog
    {
        // struct Inner { char name[4]; }
        // struct Outer { int a; *Inner inner; }
        let names = vec![
            DnaName::parse("name[4]"),
            DnaName::parse("a"),
            DnaName::parse("*inner"),
        ];
        let types = vec![
            DnaType { name: "char".into(), size: 1, struct_index: None },
            DnaType { name: "int".into(), size: 4, struct_index: None },
            DnaType { name: "Inner".into(), size: 4, struct_index: Some(0) },
        ];
        let inner = DnaStruct { type_index: 2, fields: vec![DnaField { type_index: 0, name_index: 0, size: 4, offset: 0 }], size: 4 };
        let outer = DnaStruct {
            type_index: 2,
            fields: vec![
                DnaField { type_index: 1, name_index: 1, size: 4, offset: 0 },
                DnaField { type_index: 2, name_index: 2, size: 8, offset: 4 }
            ],
            size: 12
        };
        DnaCatalog {
            names,
            types,
            structs: vec![inner, outer],
            struct_index_by_type_name: RefCell::new(None),
            path_cache: RefCell::new(HashMap::new())
        }
    }

    #[test]
    fn compiles_simple_field()
    {
        let cat = sample_catalog();
        let compiled = compile(&cat, 1, "a").unwrap();
        assert_eq!(compiled.offset, 0);
        assert!(matches!(compiled.leaf, Leaf::Int));
    }

    #[test]
    fn compiles_pointer_field()
    {
        let cat = sample_catalog();
        let compiled = compile(&cat, 1, "inner").unwrap();
        assert_eq!(compiled.offset, 4);
        assert!(matches!(compiled.leaf, Leaf::Pointer));
    }

    #[test]
    fn unknown_field_errors()
    {
        let cat = sample_catalog();
        assert!(compile(&cat, 1, "nope").is_err());
    }

    #[test]
    fn read_write_char_round_trip()
    {
        let compiled = CompiledField { offset: 0, leaf: Leaf::Char { len: 4 }, size: 4 };
        let mut buf = Cursor::new(vec![0u8; 4]);
        write_char(&mut buf, 0, &compiled, b"hi").unwrap();
        assert_eq!(buf.get_ref(), b"hi\0\0");

        let header = Header { pointer_size: 8, little_endian: true, version: 280 };
        let value = read(&mut buf, &header, 0, &compiled).unwrap();
        assert_eq!(value.as_str_truncated().unwrap(), "hi");
    }

    #[test]
    fn write_char_truncates_long_string()
    {
        let compiled = CompiledField { offset: 0, leaf: Leaf::Char { len: 3 }, size: 3 };
        let mut buf = Cursor::new(vec![0u8; 3]);
        write_char(&mut buf, 0, &compiled, b"abcdef").unwrap();
        assert_eq!(buf.get_ref(), b"abc");
    }

    #[test]
    fn write_non_char_is_unsupported()
    {
        let compiled = CompiledField { offset: 0, leaf: Leaf::Int, size: 4 };
        let mut buf = Cursor::new(vec![0u8; 4]);
        assert!(write_char(&mut buf, 0, &compiled, b"x").is_err());
    }
}
