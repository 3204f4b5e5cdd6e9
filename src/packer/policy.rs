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

//! The bundle path-rewrite policy (spec.md §4.4 step 1-3).

use crate::path::{escapes_upward, join_bytes, normalize, relative};

/// Rewrites an absolute reference `path_src` (based in `base_dir_src`) into
/// its bundle-relative destination, returning a pair:
///
/// - `path_dst`: `path_src` relative to `base_dir_src`, with any escaping
///   `..` replaced or rebased per `fakeroot` -- never escapes `base_dir_src`
///   and is safe to join onto a staging root.
/// - `path_dst_final`: `path_dst` reprojected to be relative to `fp_basedir`
///   instead of `base_dir_src` -- may legitimately contain `..` and is meant
///   to be written back as a reference resolved from wherever `fp_basedir`
///   itself ends up, not used for on-disk placement.
///
/// Callers pass `base_dir_src` as the bundle root's own directory (not the
/// referring scene file's), and `fp_basedir` as that scene file's own
/// position relative to the root (see `packer::scene_fp_basedir`) -- so
/// `path_dst` is the file's bundle-relative destination and `path_dst_final`
/// is the `//`-relative reference the scene file should hold once it lands
/// there. For a reference that lives in the root scene file itself,
/// `fp_basedir == base_dir_src` and the two outputs coincide.
///
/// When `fakeroot` is `None`, a `rel` that escapes `base_dir_src` has its
/// `..` components replaced with the literal token `__`. When `fakeroot`
/// is given and `rel` escapes, `rel` is rebased under `fakeroot` and
/// prefixed with `_` (the absolute-marker); any component that still
/// escapes after rebasing becomes `__nonproject__`.
pub fn relpath_remap(path_src: &[u8], base_dir_src: &[u8], fp_basedir: &[u8], fakeroot: Option<&[u8]>) -> (Vec<u8>, Vec<u8>)
{
    let path_src = normalize(path_src);
    let mut path_dst = relative(&path_src, base_dir_src);

    match fakeroot {
        None => {
            path_dst = replace_dotdot(&path_dst, b"__");
            path_dst = normalize(&path_dst);
        },
        Some(root) => {
            if escapes_upward(&path_dst) {
                path_dst = normalize(&join_bytes(&[root, &path_dst]));
                if escapes_upward(&path_dst) {
                    path_dst = replace_dotdot(&path_dst, b"__nonproject__");
                }
                let mut prefixed = b"_".to_vec();
                prefixed.extend_from_slice(&path_dst);
                path_dst = prefixed;
            }
        }
    }

    let rel_basedir = relative(base_dir_src, fp_basedir);
    let path_dst_final = normalize(&join_bytes(&[&rel_basedir, &path_dst]));
    (path_dst, path_dst_final)
}

/// Replaces every `..` path component with `token`.
fn replace_dotdot(path: &[u8], token: &[u8]) -> Vec<u8>
{
    let parts: Vec<&[u8]> = path.split(|b| *b == b'/').map(|c| if c == b".." { token } else { c }).collect();
    join_bytes(&parts)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn nested_path_without_fakeroot()
    {
        let (dst, _) = relpath_remap(b"/project/shots/01/maps/a.png", b"/project/shots/01", b"/project/shots/01", None);
        assert_eq!(dst, b"maps/a.png");
    }

    #[test]
    fn escaping_path_without_fakeroot_uses_dunder_token()
    {
        let (dst, _) = relpath_remap(b"/project/maps/b.png", b"/project/shots/01", b"/project/shots/01", None);
        assert_eq!(dst, b"__/__/maps/b.png");
    }

    #[test]
    fn escaping_path_with_fakeroot_is_absolute_marked()
    {
        // "../../maps/b.png" rebased under the fakeroot "shots/01" lands
        // back at "maps/b.png", which is then prefixed to mark it as
        // project-absolute rather than scene-relative.
        let (dst, _) =
            relpath_remap(b"/project/maps/b.png", b"/project/shots/01", b"/project/shots/01", Some(b"shots/01"));
        assert_eq!(dst, b"_maps/b.png");
    }

    #[test]
    fn still_escaping_after_fakeroot_rebase_uses_nonproject_token()
    {
        let (dst, _) = relpath_remap(b"/outside/b.png", b"/project/shots/01", b"/project/shots/01", Some(b"shots/01"));
        assert_eq!(dst, b"___nonproject__/outside/b.png");
    }

    #[test]
    fn final_path_is_relative_to_bundle_root()
    {
        let (_, final_dst) =
            relpath_remap(b"/project/libs/asset.blend", b"/project/libs", b"/project/shots/01", None);
        assert_eq!(final_dst, b"../../libs/asset.blend");
    }
}
