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

//! End-to-end coverage of a few of the documented testable scenarios,
//! exercised through the crate's public surface rather than its
//! module-private test helpers.

use std::{collections::BTreeMap, fs, path::PathBuf};

use scenepack::packer::bundle::{from_json, PathRemap, PathsUuid};
use scenepack::{pack, PackMode, PackOptions};

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

/// Builds a minimal valid scene file containing a header, one `DNA1` block
/// describing a single `Foo { int a; }` struct, and `ENDB`. No block other
/// than the sentinel is present, so a walk over this file finds zero
/// references -- the "empty pack" scenario.
fn build_empty_scene() -> Vec<u8>
{
    let mut dna_payload = Vec::new();
    dna_payload.extend_from_slice(b"SDNA");
    dna_payload.extend_from_slice(b"NAME");
    dna_payload.extend_from_slice(&1u32.to_le_bytes());
    push_cstr(&mut dna_payload, "a");
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
    dna_payload.extend_from_slice(&1u16.to_le_bytes()); // field count
    dna_payload.extend_from_slice(&0u16.to_le_bytes()); // field 0 type (int)
    dna_payload.extend_from_slice(&0u16.to_le_bytes()); // field 0 name (a)

    let mut out = Vec::new();
    out.extend_from_slice(b"BLENDER");
    out.push(b'-');
    out.push(b'v');
    out.extend_from_slice(b"280");

    out.extend_from_slice(b"DNA1");
    out.extend_from_slice(&(dna_payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&dna_payload);

    out.extend_from_slice(b"ENDB");
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Scenario 1: packing a scene file with no external references produces a
/// bundle holding exactly the scene file plus three side-files, each with
/// one entry naming the root.
#[test]
fn empty_pack_records_only_the_root()
{
    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("shot.blend");
    fs::write(&src_path, build_empty_scene()).unwrap();

    let dst_dir = tempfile::tempdir().unwrap();
    let mut reports = Vec::new();
    pack(&src_path, dst_dir.path(), &PackOptions::default(), &mut |r| reports.push(r)).unwrap();

    assert!(dst_dir.path().join("shot.blend").exists());

    let path_remap: PathRemap = from_json(&fs::read_to_string(dst_dir.path().join(".paths_remap.json")).unwrap()).unwrap();
    let paths_uuid: PathsUuid = from_json(&fs::read_to_string(dst_dir.path().join(".paths_uuid.json")).unwrap()).unwrap();
    let deps_remap_raw = fs::read_to_string(dst_dir.path().join(".deps_remap.json")).unwrap();

    assert_eq!(path_remap.0.len(), 1);
    assert_eq!(path_remap.0.get("shot.blend").map(String::as_str), Some("shot.blend"));
    assert_eq!(paths_uuid.0.len(), 1);
    assert!(paths_uuid.0.contains_key("shot.blend"));
    // No reference was ever rewritten, so the per-scene deps map stays empty.
    assert_eq!(deps_remap_raw.trim(), "{}");
}

#[test]
fn status_under_ignore_never_reports_a_matching_path_as_added()
{
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("shot.blend"), b"scene bytes").unwrap();
    fs::write(root.path().join("shot.blend1"), b"autosave backup").unwrap();

    let ignore = scenepack::session::compile_ignore_patterns(&[r"\.blend\d+$".to_string()]).unwrap();
    let tracked = PathsUuid::default();
    let statuses = scenepack::session::status(root.path(), &tracked, &ignore).unwrap();

    assert!(statuses.contains_key("shot.blend"));
    assert!(!statuses.contains_key("shot.blend1"));
}

#[test]
fn remap_dry_run_reports_without_touching_disk()
{
    let old_root = tempfile::tempdir().unwrap();
    fs::write(old_root.path().join("a.png"), b"same bytes everywhere").unwrap();

    let new_root = tempfile::tempdir().unwrap();
    fs::write(new_root.path().join("renamed.png"), b"same bytes everywhere").unwrap();

    let mut start_reports = Vec::new();
    let uuid = scenepack::remap::start(&[old_root.path().to_path_buf()], &mut |r| start_reports.push(r)).unwrap();

    let before = fs::read(new_root.path().join("renamed.png")).unwrap();
    let mut finish_reports = Vec::new();
    scenepack::remap::finish(
        &[new_root.path().to_path_buf()],
        &uuid,
        false,
        true,
        &mut |r| finish_reports.push(r)
    )
    .unwrap();
    let after = fs::read(new_root.path().join("renamed.png")).unwrap();

    assert_eq!(before, after);
    assert!(!new_root.path().join("a.png").exists());
}

#[test]
fn commit_archives_only_touched_paths()
{
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("shot.blend"), b"v1").unwrap();
    fs::write(root.path().join("untouched.png"), b"same always").unwrap();

    let mut tracked = BTreeMap::new();
    tracked.insert(
        "untouched.png".to_string(),
        scenepack::fingerprint::Fingerprint::of_file(&root.path().join("untouched.png")).unwrap().as_str().to_string()
    );
    let tracked = PathsUuid(tracked);

    let ignore = Vec::new();
    let statuses = scenepack::session::status(root.path(), &tracked, &ignore).unwrap();
    assert_eq!(statuses.get("shot.blend"), Some(&scenepack::session::Status::Added));
    assert!(!statuses.contains_key("untouched.png"));

    let dest = root.path().join("commit.zip");
    let (_, updated) =
        scenepack::session_commit(root.path(), &tracked, &PathRemap::default(), &ignore, &dest).unwrap();

    assert!(updated.0.contains_key("shot.blend"));
    assert!(updated.0.contains_key("untouched.png"));

    let archive = fs::File::open(&dest).unwrap();
    let mut zip = zip::ZipArchive::new(archive).unwrap();
    let names: Vec<String> = (0..zip.len()).map(|i| zip.by_index(i).unwrap().name().to_string()).collect();
    assert!(names.contains(&"shot.blend".to_string()));
    assert!(names.contains(&".paths_ops.json".to_string()));
    assert!(!names.contains(&"untouched.png".to_string()));
}
