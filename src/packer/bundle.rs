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

//! The three JSON bundle side-files, plus the commit-time path-ops file.
//!
//! Canonical form (sorted keys, 4-space indent) is grounded on
//! `examples/original_source/packer/packer.py`'s
//! `json.dumps(..., sort_keys=True, indent=4, separators=(',', ': '))`
//! calls; `serde_json` with a `BTreeMap` gets sorted keys for free and a
//! `PrettyFormatter` configured for a 4-space indent reproduces the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::Result;

/// Destination-relative -> original project-relative path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathRemap(pub BTreeMap<String, String>);

/// Per scene file, new-path -> old-path for each rewritten reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepsRemap(pub BTreeMap<String, BTreeMap<String, String>>);

/// Destination-relative -> content fingerprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsUuid(pub BTreeMap<String, String>);

/// Project-relative -> single-character operation code (`A`, `M`, `D`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathOps(pub BTreeMap<String, char>);

/// Serializes `value` to the canonical 4-space-indented JSON form every
/// side-file uses.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String>
{
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf).expect("serde_json always produces valid UTF-8"))
}

/// Parses a side-file back from its canonical JSON form.
pub fn from_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T>
{
    Ok(serde_json::from_str(s)?)
}
