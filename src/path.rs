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

//! Byte-sequence path handling.
//!
//! Some installed assets use non-UTF-8 names, so every path that crosses a
//! scene file, a bundle, or the filesystem is carried as a byte sequence
//! through the core and decoded to a Rust [String] only at JSON boundaries
//! ([crate::packer::bundle]).

use std::path::{Path, PathBuf};

/// A path carried as raw bytes rather than a validated UTF-8 string.
///
/// Scene-relative paths begin with `//`; project-absolute ones begin with
/// the platform separator (or, inside a bundle, with the `_` marker -- see
/// [crate::packer]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawPath(pub Vec<u8>);

impl RawPath
{
    /// Wraps a byte vector.
    pub fn new(bytes: Vec<u8>) -> Self
    {
        RawPath(bytes)
    }

    /// Returns true if this path starts with the `//` scene-relative marker.
    pub fn is_scene_relative(&self) -> bool
    {
        self.0.starts_with(b"//")
    }

    /// Strips a leading `//` scene-relative marker, if present.
    pub fn strip_scene_relative(&self) -> &[u8]
    {
        if self.is_scene_relative() {
            &self.0[2..]
        } else {
            &self.0[..]
        }
    }

    /// Prefixes this path with the `//` scene-relative marker if not already present.
    pub fn into_scene_relative(mut self) -> Self
    {
        if !self.is_scene_relative() {
            let mut v = b"//".to_vec();
            v.extend_from_slice(&self.0);
            self.0 = v;
        }
        self
    }

    /// Decodes this path to UTF-8, replacing invalid sequences.
    ///
    /// Used only when crossing into JSON side-files; callers that need a
    /// lossless round trip must keep the [RawPath] itself.
    pub fn to_string_lossy(&self) -> String
    {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Interprets this path as a native filesystem path.
    pub fn as_native_path(&self) -> &Path
    {
        native_path(&self.0)
    }

    /// Builds a [RawPath] from a native filesystem path.
    pub fn from_native_path(path: &Path) -> Self
    {
        RawPath(native_path_to_bytes(path))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.0
    }
}

impl From<&str> for RawPath
{
    fn from(s: &str) -> Self
    {
        RawPath(s.as_bytes().to_vec())
    }
}

impl From<String> for RawPath
{
    fn from(s: String) -> Self
    {
        RawPath(s.into_bytes())
    }
}

#[cfg(unix)]
fn native_path(bytes: &[u8]) -> &Path
{
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn native_path(bytes: &[u8]) -> &Path
{
    // Non-Unix platforms cannot represent arbitrary bytes as a path; fall
    // back to lossy decoding exactly once, at the filesystem boundary.
    Path::new(Box::leak(String::from_utf8_lossy(bytes).into_owned().into_boxed_str()))
}

#[cfg(unix)]
fn native_path_to_bytes(path: &Path) -> Vec<u8>
{
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn native_path_to_bytes(path: &Path) -> Vec<u8>
{
    path.to_string_lossy().into_owned().into_bytes()
}

/// Joins path components with `/`, the separator used by scene-relative and
/// bundle-relative paths regardless of host platform.
pub fn join_bytes(parts: &[&[u8]]) -> Vec<u8>
{
    let mut out = Vec::new();
    for (i, p) in parts.iter().enumerate() {
        if p.is_empty() {
            continue;
        }
        if i != 0 && !out.is_empty() && *out.last().unwrap() != b'/' {
            out.push(b'/');
        }
        out.extend_from_slice(p);
    }
    out
}

/// Normalizes a `/`-separated byte path: collapses `.` components and
/// `a/../` pairs, but leaves leading `..` components alone (callers decide
/// how to handle paths that still escape upward after normalization).
pub fn normalize(path: &[u8]) -> Vec<u8>
{
    let is_abs = path.first() == Some(&b'/');
    let mut out: Vec<&[u8]> = Vec::new();
    for comp in path.split(|b| *b == b'/') {
        match comp {
            b"" | b"." => continue,
            b".." => {
                if let Some(last) = out.last() {
                    if *last != b".." {
                        out.pop();
                        continue;
                    }
                }
                if !is_abs {
                    out.push(comp);
                }
            },
            _ => out.push(comp)
        }
    }
    let mut result = if is_abs { vec![b'/'] } else { Vec::new() };
    result.extend(join_bytes(&out));
    if result.is_empty() {
        result.push(b'.');
    }
    result
}

/// Computes `path` relative to `base`, both absolute, `/`-separated byte
/// paths. May produce leading `..` components when `path` is not nested
/// under `base`.
pub fn relative(path: &[u8], base: &[u8]) -> Vec<u8>
{
    let path = normalize(path);
    let base = normalize(base);
    let path_parts: Vec<&[u8]> = path.split(|b| *b == b'/').filter(|c| !c.is_empty()).collect();
    let base_parts: Vec<&[u8]> = base.split(|b| *b == b'/').filter(|c| !c.is_empty()).collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<&[u8]> = Vec::new();
    for _ in common..base_parts.len() {
        out.push(b"..");
    }
    for p in &path_parts[common..] {
        out.push(p);
    }
    if out.is_empty() {
        Vec::new()
    } else {
        join_bytes(&out)
    }
}

/// Returns true if a normalized relative path still escapes its base (i.e.
/// contains a leading `..` component).
pub fn escapes_upward(rel: &[u8]) -> bool
{
    rel.split(|b| *b == b'/').any(|c| c == b"..")
}

/// Resolves a scene-relative reference (`//path/to/asset`) against the
/// directory containing the scene file that holds it. Absolute references
/// (anything not starting with `//`) pass through unchanged.
pub fn resolve_scene_relative(reference: &RawPath, scene_dir: &[u8]) -> Vec<u8>
{
    if reference.is_scene_relative() {
        normalize(&join_bytes(&[scene_dir, reference.strip_scene_relative()]))
    } else {
        normalize(reference.as_bytes())
    }
}

/// Returns a [PathBuf] for a byte path, for use with [std::fs] APIs.
pub fn to_path_buf(bytes: &[u8]) -> PathBuf
{
    native_path(bytes).to_path_buf()
}

/// Returns the parent of a `/`-separated byte path (empty if `path` has no
/// separator).
pub fn dirname(path: &[u8]) -> Vec<u8>
{
    match path.iter().rposition(|b| *b == b'/') {
        Some(i) => path[..i].to_vec(),
        None => Vec::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn normalize_collapses_dotdot()
    {
        assert_eq!(normalize(b"/a/b/../c"), b"/a/c");
        assert_eq!(normalize(b"a/./b/"), b"a/b");
    }

    #[test]
    fn normalize_keeps_leading_dotdot_relative()
    {
        assert_eq!(normalize(b"../a/../b"), b"../b");
    }

    #[test]
    fn relative_same_dir_is_empty()
    {
        assert_eq!(relative(b"/a/b", b"/a"), b"b");
        assert_eq!(relative(b"/a", b"/a"), b"");
    }

    #[test]
    fn relative_escapes_with_dotdot()
    {
        let rel = relative(b"/a/b/c", b"/a/x/y");
        assert_eq!(rel, b"../../b/c");
        assert!(escapes_upward(&rel));
    }

    #[test]
    fn dirname_splits_on_last_separator()
    {
        assert_eq!(dirname(b"libs/sub/asset.blend"), b"libs/sub");
        assert_eq!(dirname(b"asset.blend"), b"");
    }

    #[test]
    fn scene_relative_round_trip()
    {
        let p = RawPath::from("//maps/a.png");
        assert!(p.is_scene_relative());
        assert_eq!(p.strip_scene_relative(), b"maps/a.png");
        let resolved = resolve_scene_relative(&p, b"/project/shots/01");
        assert_eq!(resolved, b"/project/shots/01/maps/a.png");
    }
}
