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

//! The DNA catalog: a scene file's self-description of field names, types
//! and compound structs, carried in the `DNA1` block.
//!
//! Treating the DNA as the single source of truth means nothing in this
//! crate hard-codes a compound layout; supporting a new scene-file version
//! requires no changes here, only (possibly) new block-code handlers in
//! [crate::walker].

pub mod field;

use std::{cell::RefCell, collections::HashMap};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{container::header::Header, error::Error, Result};

pub use field::{CompiledField, FieldPath, Leaf};

/// A raw C-style field declarator (`*name`, `(*fn)()`, `verts[4]`) decoded
/// into its short name, pointer-ness and array length.
#[derive(Debug, Clone)]
pub struct DnaName
{
    pub raw: String,
    pub short_name: String,
    pub is_pointer: bool,
    pub is_function_pointer: bool,
    pub array_size: u32
}

impl DnaName
{
    fn parse(raw: &str) -> DnaName
    {
        let is_function_pointer = raw.contains("(*");
        let is_pointer = raw.contains('*');
        let mut short_name = raw.replace('*', "").replace('(', "").replace(')', "");
        if let Some(idx) = short_name.find('[') {
            short_name.truncate(idx);
        }
        let mut array_size: u32 = 1;
        let mut rest = raw;
        while let Some(start) = rest.find('[') {
            if let Some(end) = rest[start..].find(']') {
                let end = start + end;
                if let Ok(n) = rest[start + 1..end].parse::<u32>() {
                    array_size *= n;
                }
                rest = &rest[end + 1..];
            } else {
                break;
            }
        }
        DnaName { raw: raw.to_string(), short_name, is_pointer, is_function_pointer, array_size }
    }
}

/// A primitive or compound type as named in the `TYPE`/`TLEN` sections.
#[derive(Debug, Clone)]
pub struct DnaType
{
    pub name: String,
    pub size: u16,
    /// Index into [DnaCatalog::structs], if this type is a compound struct.
    pub struct_index: Option<usize>
}

/// One field of a compound struct: which type and name it uses, its
/// on-disk size, and its offset from the start of the owning struct.
#[derive(Debug, Clone, Copy)]
pub struct DnaField
{
    pub type_index: usize,
    pub name_index: usize,
    pub size: u32,
    pub offset: u32
}

/// A compound struct: the type it describes, and its fields in declaration
/// order.
#[derive(Debug, Clone)]
pub struct DnaStruct
{
    pub type_index: usize,
    pub fields: Vec<DnaField>,
    pub size: u32
}

/// The full catalog decoded from one `DNA1` block.
pub struct DnaCatalog
{
    pub names: Vec<DnaName>,
    pub types: Vec<DnaType>,
    pub structs: Vec<DnaStruct>,
    struct_index_by_type_name: RefCell<Option<HashMap<String, usize>>>,
    path_cache: RefCell<HashMap<(usize, String), CompiledField>>
}

fn align4(offset: usize) -> usize
{
    let trim = offset % 4;
    if trim != 0 {
        offset + (4 - trim)
    } else {
        offset
    }
}

fn read_cstr(data: &[u8], offset: usize) -> Result<(String, usize)>
{
    let end = data[offset..]
        .iter()
        .position(|b| *b == 0)
        .ok_or(Error::Truncation("DNA name/type string"))?;
    let s = std::str::from_utf8(&data[offset..offset + end]).map_err(|_| Error::Utf8("DNA string"))?;
    Ok((s.to_string(), offset + end + 1))
}

impl DnaCatalog
{
    /// Parses a DNA catalog from the payload of the `DNA1` block.
    ///
    /// Layout: ASCII tags followed by counted arrays, 4-byte aligned between
    /// sections: `SDNA NAME <u32 n> <n NUL-terminated names>`, `TYPE <u32 n>
    /// <names>`, `TLEN <u16[n]>`, `STRC <u32 n> <n struct entries>`, each
    /// struct entry `<u16 type> <u16 field-count> <field-count x (u16 type,
    /// u16 name)>`.
    pub fn parse(payload: &[u8], header: &Header) -> Result<DnaCatalog>
    {
        log::debug!("building DNA catalog");
        let read_u16 = if header.little_endian {
            LittleEndian::read_u16
        } else {
            BigEndian::read_u16
        };
        let read_u32 = if header.little_endian {
            LittleEndian::read_u32
        } else {
            BigEndian::read_u32
        };

        // "SDNA" + "NAME"
        let mut offset = 8usize;
        let num_names = read_u32(check(payload, offset, 4)?) as usize;
        offset += 4;
        log::debug!("building #{} names", num_names);
        let mut names = Vec::with_capacity(num_names);
        for _ in 0..num_names {
            let (raw, next) = read_cstr(payload, offset)?;
            offset = next;
            names.push(DnaName::parse(&raw));
        }

        offset = align4(offset);
        offset += 4; // "TYPE"
        let num_types = read_u32(check(payload, offset, 4)?) as usize;
        offset += 4;
        log::debug!("building #{} types", num_types);
        let mut type_names = Vec::with_capacity(num_types);
        for _ in 0..num_types {
            let (raw, next) = read_cstr(payload, offset)?;
            offset = next;
            type_names.push(raw);
        }

        offset = align4(offset);
        offset += 4; // "TLEN"
        log::debug!("building #{} type-lengths", num_types);
        let mut types = Vec::with_capacity(num_types);
        for name in type_names {
            let size = read_u16(check(payload, offset, 2)?);
            offset += 2;
            types.push(DnaType { name, size, struct_index: None });
        }

        offset = align4(offset);
        offset += 4; // "STRC"
        let num_structs = read_u32(check(payload, offset, 4)?) as usize;
        offset += 4;
        log::debug!("building #{} structures", num_structs);
        let mut structs = Vec::with_capacity(num_structs);
        for struct_index in 0..num_structs {
            let type_index = read_u16(check(payload, offset, 2)?) as usize;
            let field_count = read_u16(check(payload, offset + 2, 2)?) as usize;
            offset += 4;
            if type_index >= types.len() {
                return Err(Error::DnaInvalid(format!("struct {} references unknown type {}", struct_index, type_index)));
            }
            types[type_index].struct_index = Some(struct_index);

            let mut fields = Vec::with_capacity(field_count);
            let mut running_offset: u32 = 0;
            for _ in 0..field_count {
                let field_type_index = read_u16(check(payload, offset, 2)?) as usize;
                let field_name_index = read_u16(check(payload, offset + 2, 2)?) as usize;
                offset += 4;
                let name = names
                    .get(field_name_index)
                    .ok_or_else(|| Error::DnaInvalid(format!("unknown name index {}", field_name_index)))?;
                let ftype = types
                    .get(field_type_index)
                    .ok_or_else(|| Error::DnaInvalid(format!("unknown type index {}", field_type_index)))?;
                let size = if name.is_pointer || name.is_function_pointer {
                    header.pointer_size as u32 * name.array_size
                } else {
                    ftype.size as u32 * name.array_size
                };
                fields.push(DnaField { type_index: field_type_index, name_index: field_name_index, size, offset: running_offset });
                running_offset += size;
            }
            structs.push(DnaStruct { type_index, fields, size: running_offset });
        }

        Ok(DnaCatalog {
            names,
            types,
            structs,
            struct_index_by_type_name: RefCell::new(None),
            path_cache: RefCell::new(HashMap::new())
        })
    }

    /// Finds the struct index whose type has the given name (e.g. `"Object"`).
    ///
    /// Lazily builds and caches a name -> index table on first use.
    pub fn struct_index_by_type_name(&self, name: &str) -> Option<usize>
    {
        let mut cache = self.struct_index_by_type_name.borrow_mut();
        if cache.is_none() {
            let mut map = HashMap::new();
            for t in &self.types {
                if let Some(si) = t.struct_index {
                    map.insert(t.name.clone(), si);
                }
            }
            *cache = Some(map);
        }
        cache.as_ref().unwrap().get(name).copied()
    }

    /// Compiles (and caches) a dotted field path against a struct into a
    /// flat byte offset plus a tagged leaf accessor, per the "no reflection
    /// at access time" design: a path is parsed once, not on every get/set.
    pub fn compile_path(&self, struct_index: usize, path: &str) -> Result<CompiledField>
    {
        let key = (struct_index, path.to_string());
        if let Some(cached) = self.path_cache.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let compiled = field::compile(self, struct_index, path)?;
        self.path_cache.borrow_mut().insert(key, compiled.clone());
        Ok(compiled)
    }
}

fn check(data: &[u8], offset: usize, len: usize) -> Result<&[u8]>
{
    data.get(offset..offset + len).ok_or(Error::Truncation("DNA catalog"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn dna_name_parses_pointer_and_array()
    {
        let n = DnaName::parse("*name");
        assert!(n.is_pointer);
        assert_eq!(n.short_name, "name");
        assert_eq!(n.array_size, 1);

        let n = DnaName::parse("verts[4]");
        assert!(!n.is_pointer);
        assert_eq!(n.short_name, "verts");
        assert_eq!(n.array_size, 4);

        let n = DnaName::parse("grid[4][4]");
        assert_eq!(n.array_size, 16);

        let n = DnaName::parse("(*fn)()");
        assert!(n.is_function_pointer);
        assert!(n.is_pointer);
        assert_eq!(n.short_name, "fn");
    }
}
