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

//! The scene-file container: header, block arena and typed field access.

pub mod block;
pub mod header;

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf}
};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};

pub use block::{code, code_str, Block, BlockHandle, Code};
pub use header::Header;

use crate::{
    dna::{field::FieldValue, DnaCatalog},
    error::Error,
    Result
};

/// An open scene file: its header, its block arena, and the DNA catalog
/// decoded from it.
///
/// Nothing outside a `Container` ever holds a native reference into its
/// block list, only a [BlockHandle] -- see that type's documentation.
pub struct Container
{
    header: Header,
    blocks: Vec<Block>,
    code_index: HashMap<Code, Vec<BlockHandle>>,
    old_address_index: RefCell<Option<HashMap<u64, BlockHandle>>>,
    dna: Option<DnaCatalog>,
    handle: File,
    read_only: bool,
    modified: bool,
    original_path: Option<PathBuf>,
    was_compressed: bool
}

impl Container
{
    /// Opens a scene file, sniffing the first 7 bytes to decide whether it
    /// is a plain container or a gzip-compressed one; a compressed file is
    /// fully decompressed into a scratch file so the rest of the container
    /// can seek freely.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Container>
    {
        let path = path.as_ref();
        log::debug!("opening {:?} (read_only={})", path, read_only);
        let mut probe = File::open(path)?;
        let mut sniff = [0u8; 7];
        let got = read_fill(&mut probe, &mut sniff)?;
        probe.seek(SeekFrom::Start(0))?;

        let (mut handle, was_compressed) = if got == 7 && &sniff == header::MAGIC {
            let h = if read_only {
                File::open(path)?
            } else {
                OpenOptions::new().read(true).write(true).open(path)?
            };
            (h, false)
        } else {
            log::debug!("{:?} is not a plain container, decompressing through gzip", path);
            let mut scratch = tempfile::tempfile()?;
            let mut decoder = GzDecoder::new(probe);
            std::io::copy(&mut decoder, &mut scratch)?;
            scratch.seek(SeekFrom::Start(0))?;
            (scratch, true)
        };

        handle.seek(SeekFrom::Start(0))?;
        let header = Header::parse(&mut handle)?;
        let blocks = read_blocks(&mut handle, &header)?;
        let code_index = index_by_code(&blocks);

        // A file with no `DNA1` block (e.g. a bare `ENDB`-only file) still
        // opens successfully; it simply carries no catalog, and only field
        // access that actually needs one will fail.
        let dna = match code_index.get(&code("DNA1")).and_then(|v| v.first()) {
            Some(&dna_handle) => {
                let dna_block = blocks[dna_handle.index()];
                let payload = read_payload(&mut handle, &dna_block)?;
                Some(DnaCatalog::parse(&payload, &header)?)
            },
            None => None
        };

        Ok(Container {
            header,
            blocks,
            code_index,
            old_address_index: RefCell::new(None),
            dna,
            handle,
            read_only,
            modified: false,
            original_path: Some(path.to_path_buf()),
            was_compressed
        })
    }

    /// The parsed container header.
    pub fn header(&self) -> &Header
    {
        &self.header
    }

    /// The DNA catalog decoded from this container's `DNA1` block, if it has
    /// one.
    pub fn dna(&self) -> Option<&DnaCatalog>
    {
        self.dna.as_ref()
    }

    /// True once a mutating operation has succeeded against this container.
    pub fn is_modified(&self) -> bool
    {
        self.modified
    }

    /// Iterates every block in file order, `ENDB` included.
    pub fn blocks(&self) -> impl Iterator<Item = BlockHandle> + '_
    {
        (0..self.blocks.len()).map(|i| BlockHandle(i as u32))
    }

    /// Returns the block data for a handle.
    pub fn block(&self, handle: BlockHandle) -> &Block
    {
        &self.blocks[handle.index()]
    }

    /// All blocks whose code matches, in file order.
    pub fn find_by_code(&self, code_str: &str) -> &[BlockHandle]
    {
        self.code_index.get(&code(code_str)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Resolves a pointer field's value back to the block that was written
    /// at that in-memory address, lazily building the address index on
    /// first use. A zero address resolves to `None`.
    pub fn find_by_old_address(&self, addr: u64) -> Option<BlockHandle>
    {
        if addr == 0 {
            return None;
        }
        let mut cache = self.old_address_index.borrow_mut();
        if cache.is_none() {
            let mut map = HashMap::new();
            for (i, b) in self.blocks.iter().enumerate() {
                if b.old_address != 0 {
                    map.insert(b.old_address, BlockHandle(i as u32));
                }
            }
            *cache = Some(map);
        }
        cache.as_ref().unwrap().get(&addr).copied()
    }

    /// Reads the raw payload bytes of a block.
    pub fn read_payload(&mut self, handle: BlockHandle) -> Result<Vec<u8>>
    {
        let block = self.blocks[handle.index()];
        read_payload(&mut self.handle, &block)
    }

    /// Reads a typed field from a block, per the path resolved against the
    /// struct named by the block's DNA struct index.
    pub fn get_field(&mut self, handle: BlockHandle, path: &str) -> Result<FieldValue>
    {
        let block = self.blocks[handle.index()];
        let dna = self.dna.as_ref().ok_or_else(|| Error::DnaInvalid("container has no DNA1 block".into()))?;
        let compiled = dna.compile_path(block.sdna_index as usize, path)?;
        crate::dna::field::read(&mut self.handle, &self.header, block.file_offset, &compiled)
    }

    /// Writes a `char` field and marks the container modified.
    ///
    /// # Errors
    ///
    /// Returns [Error::ReadOnly] if this container was opened read-only.
    pub fn set_char_field(&mut self, handle: BlockHandle, path: &str, value: &[u8]) -> Result<()>
    {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let block = self.blocks[handle.index()];
        let dna = self.dna.as_ref().ok_or_else(|| Error::DnaInvalid("container has no DNA1 block".into()))?;
        let compiled = dna.compile_path(block.sdna_index as usize, path)?;
        crate::dna::field::write_char(&mut self.handle, block.file_offset, &compiled, value)?;
        self.modified = true;
        Ok(())
    }

    /// Closes the container, re-compressing to the original path if it was
    /// modified and had originally been gzip-compressed.
    pub fn close(mut self) -> Result<()>
    {
        if self.modified && self.was_compressed {
            if let Some(path) = self.original_path.take() {
                log::debug!("re-compressing modified container to {:?}", path);
                self.handle.seek(SeekFrom::Start(0))?;
                let out = File::create(path)?;
                let mut encoder = GzEncoder::new(out, Compression::default());
                std::io::copy(&mut self.handle, &mut encoder)?;
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

fn read_fill<R: Read>(handle: &mut R, buf: &mut [u8]) -> Result<usize>
{
    let mut total = 0;
    while total < buf.len() {
        let n = handle.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn read_blocks(handle: &mut File, header: &Header) -> Result<Vec<Block>>
{
    let header_size = header.block_header_size();
    let read_u32 = if header.little_endian { LittleEndian::read_u32 } else { BigEndian::read_u32 };
    let read_u64 = if header.little_endian { LittleEndian::read_u64 } else { BigEndian::read_u64 };

    let mut blocks = Vec::new();
    loop {
        let mut buf = vec![0u8; header_size];
        let got = read_fill(handle, &mut buf)?;
        if got < header_size {
            // A short read here is treated as the terminal sentinel rather
            // than a truncation error: some writers omit padding after the
            // real ENDB block.
            blocks.push(Block::endb());
            break;
        }
        let mut code_bytes = [0u8; 4];
        code_bytes.copy_from_slice(&buf[0..4]);
        let payload_len = read_u32(&buf[4..8]);
        let old_address = if header.pointer_size == 8 {
            read_u64(&buf[8..16])
        } else {
            read_u32(&buf[8..12]) as u64
        };
        let tail = 8 + header.pointer_size as usize;
        let sdna_index = read_u32(&buf[tail..tail + 4]);
        let count = read_u32(&buf[tail + 4..tail + 8]);
        let file_offset = handle.stream_position()?;

        let block = Block { code: code_bytes, payload_len, old_address, sdna_index, count, file_offset };
        let is_endb = block.is_endb();
        blocks.push(block);
        if is_endb {
            break;
        }
        handle.seek(SeekFrom::Current(payload_len as i64))?;
    }
    Ok(blocks)
}

fn index_by_code(blocks: &[Block]) -> HashMap<Code, Vec<BlockHandle>>
{
    let mut map: HashMap<Code, Vec<BlockHandle>> = HashMap::new();
    for (i, b) in blocks.iter().enumerate() {
        map.entry(b.code).or_default().push(BlockHandle(i as u32));
    }
    map
}

fn read_payload(handle: &mut File, block: &Block) -> Result<Vec<u8>>
{
    handle.seek(SeekFrom::Start(block.file_offset))?;
    let mut buf = vec![0u8; block.payload_len as usize];
    handle.read_exact(&mut buf).map_err(|_| Error::Truncation("block payload"))?;
    Ok(buf)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Write as _;

    fn push_cstr(buf: &mut Vec<u8>, s: &str)
    {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    fn align4_pad(buf: &mut Vec<u8>)
    {
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    /// Builds a minimal valid scene file: a header, a `DNA1` block
    /// describing one struct `Foo { int a; }`, and `ENDB`.
    fn build_sample() -> Vec<u8>
    {
        let mut dna_payload = Vec::new();
        dna_payload.extend_from_slice(b"SDNA");
        dna_payload.extend_from_slice(b"NAME");
        dna_payload.extend_from_slice(&2u32.to_le_bytes());
        push_cstr(&mut dna_payload, "a");
        push_cstr(&mut dna_payload, "*next");
        align4_pad(&mut dna_payload);

        dna_payload.extend_from_slice(b"TYPE");
        dna_payload.extend_from_slice(&2u32.to_le_bytes());
        push_cstr(&mut dna_payload, "int");
        push_cstr(&mut dna_payload, "Foo");
        align4_pad(&mut dna_payload);

        dna_payload.extend_from_slice(b"TLEN");
        dna_payload.extend_from_slice(&4u16.to_le_bytes());
        dna_payload.extend_from_slice(&8u16.to_le_bytes());
        align4_pad(&mut dna_payload);

        dna_payload.extend_from_slice(b"STRC");
        dna_payload.extend_from_slice(&1u32.to_le_bytes());
        dna_payload.extend_from_slice(&1u16.to_le_bytes()); // type index of Foo
        dna_payload.extend_from_slice(&2u16.to_le_bytes()); // field count
        dna_payload.extend_from_slice(&0u16.to_le_bytes()); // field 0 type (int)
        dna_payload.extend_from_slice(&0u16.to_le_bytes()); // field 0 name (a)
        dna_payload.extend_from_slice(&1u16.to_le_bytes()); // field 1 type (Foo, self pointer)
        dna_payload.extend_from_slice(&1u16.to_le_bytes()); // field 1 name (*next)

        let mut out = Vec::new();
        out.extend_from_slice(b"BLENDER");
        out.push(b'-');
        out.push(b'v');
        out.extend_from_slice(b"280");

        // DNA1 block, sdna_index 0 (itself unused by the catalog parser)
        out.extend_from_slice(b"DNA1");
        out.extend_from_slice(&(dna_payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // old_address
        out.extend_from_slice(&0u32.to_le_bytes()); // sdna_index
        out.extend_from_slice(&1u32.to_le_bytes()); // count
        out.extend_from_slice(&dna_payload);

        // ENDB
        out.extend_from_slice(b"ENDB");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    #[test]
    fn opens_and_indexes_blocks()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&build_sample()).unwrap();
        let c = Container::open(f.path(), true).unwrap();
        assert_eq!(c.header().pointer_size, 8);
        assert_eq!(c.find_by_code("DNA1").len(), 1);
        assert_eq!(c.find_by_code("ENDB").len(), 1);
        assert_eq!(c.dna().unwrap().structs.len(), 1);
    }

    #[test]
    fn opens_a_file_with_no_dna1_block()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(b"BLENDER");
        out.push(b'-');
        out.push(b'v');
        out.extend_from_slice(b"280");
        out.extend_from_slice(b"ENDB");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        f.write_all(&out).unwrap();

        let mut c = Container::open(f.path(), true).unwrap();
        assert!(c.dna().is_none());
        assert_eq!(c.find_by_code("ENDB").len(), 1);
        assert!(matches!(c.get_field(c.find_by_code("ENDB")[0], "a"), Err(Error::DnaInvalid(_))));
    }

    #[test]
    fn get_field_reads_int()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        // Append a "Foo" block (sdna_index 0, points at our single struct)
        // with a = 42 and a null `next` pointer, right before ENDB.
        let mut sample = build_sample();
        let endb_pos = sample.len() - 24;
        let mut foo_block = Vec::new();
        foo_block.extend_from_slice(b"Foo_"); // arbitrary code for the test
        foo_block.extend_from_slice(&12u32.to_le_bytes());
        foo_block.extend_from_slice(&0xdeadbeefu64.to_le_bytes());
        foo_block.extend_from_slice(&0u32.to_le_bytes()); // sdna_index 0 -> Foo
        foo_block.extend_from_slice(&1u32.to_le_bytes());
        foo_block.extend_from_slice(&42i32.to_le_bytes());
        foo_block.extend_from_slice(&0u64.to_le_bytes());
        sample.splice(endb_pos..endb_pos, foo_block);

        f.write_all(&sample).unwrap();
        let mut c = Container::open(f.path(), true).unwrap();
        let handle = c.find_by_code("Foo_")[0];
        let value = c.get_field(handle, "a").unwrap();
        assert_eq!(value, FieldValue::Int(42));
    }

    #[test]
    fn mutating_read_only_container_fails()
    {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&build_sample()).unwrap();
        let mut c = Container::open(f.path(), true).unwrap();
        let handle = c.find_by_code("DNA1")[0];
        assert!(matches!(c.set_char_field(handle, "a", b"x"), Err(Error::ReadOnly)));
    }
}
