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

//! Local checkout bookkeeping: fingerprint-based status, ignore-pattern
//! filtering and commit archive assembly (spec.md §4.6).
//!
//! Grounded on `examples/original_source/client/cli/bam.py`'s
//! `bam_utils.commit`: a checkout directory's tracked state is a
//! path -> fingerprint map (the bundle's own `.paths_uuid.json`, reused here
//! via [crate::packer::bundle::PathsUuid]); committing diffs the current
//! on-disk fingerprints against that map to classify every tracked file as
//! unchanged or modified, then walks the directory for files the map never
//! recorded at all. The original has no exclusion mechanism at this point
//! (`# TODO(cam) .bamignore` in the source); the regex ignore list here
//! fills that gap.

pub mod transport;

use std::{
    collections::BTreeMap,
    fs,
    io::{Seek, Write},
    path::Path
};

use regex::Regex;
use walkdir::WalkDir;

use crate::{
    fingerprint::Fingerprint,
    packer::bundle::{from_json, to_canonical_json, DepsRemap, PathOps, PathRemap, PathsUuid},
    Error, Result
};
use transport::{read_frame, read_magic, FrameKind};

/// Name of the staging directory a commit uses while assembling its
/// archive; its existence across runs is the concurrent-commit guard,
/// mirrored on the packer's own `@`-suffixed staging-leftover check.
const COMMIT_STAGING_DIR: &str = ".commit-tmp";

/// One tracked file's state relative to the last recorded [PathsUuid].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status
{
    Added,
    Modified,
    Removed
}

impl Status
{
    fn to_char(self) -> char
    {
        match self {
            Status::Added => 'A',
            Status::Modified => 'M',
            Status::Removed => 'D'
        }
    }
}

/// Loads a checkout directory's ignore patterns from a plain list of regex
/// strings (one per rule; no file format is prescribed here, callers own
/// where the patterns are stored). A path is ignored when any pattern
/// matches its `/`-separated, checkout-relative form.
pub fn compile_ignore_patterns(patterns: &[String]) -> Result<Vec<Regex>>
{
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::Other(format!("bad ignore pattern {:?}: {}", p, e))))
        .collect()
}

fn is_ignored(rel: &str, patterns: &[Regex]) -> bool
{
    patterns.iter().any(|re| re.is_match(rel))
}

/// Fingerprints every non-ignored file under `root`, keyed by its
/// `/`-separated path relative to `root`.
pub fn scan(root: &Path, ignore: &[Regex]) -> Result<BTreeMap<String, Fingerprint>>
{
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if rel == COMMIT_STAGING_DIR || rel.starts_with(&format!("{}/", COMMIT_STAGING_DIR)) {
            continue;
        }
        if is_ignored(&rel, ignore) {
            continue;
        }
        out.insert(rel, Fingerprint::of_file(entry.path())?);
    }
    Ok(out)
}

/// Diffs the fingerprints recorded in `tracked` against what is actually on
/// disk under `root`, the same comparison `bam_utils.commit` makes before
/// building its archive: every tracked path whose current fingerprint
/// differs (or has disappeared) is `Modified`/`Removed`, and every on-disk
/// file `tracked` never recorded is `Added`.
pub fn status(root: &Path, tracked: &PathsUuid, ignore: &[Regex]) -> Result<BTreeMap<String, Status>>
{
    let mut out = BTreeMap::new();

    for (rel, fingerprint) in &tracked.0 {
        if is_ignored(rel, ignore) {
            continue;
        }
        let abs = root.join(rel);
        if !abs.exists() {
            out.insert(rel.clone(), Status::Removed);
            continue;
        }
        let current = Fingerprint::of_file(&abs)?;
        if current.as_str() != fingerprint {
            out.insert(rel.clone(), Status::Modified);
        }
    }

    let current_files = scan(root, ignore)?;
    for rel in current_files.keys() {
        if !tracked.0.contains_key(rel) {
            out.insert(rel.clone(), Status::Added);
        }
    }

    Ok(out)
}

/// Converts a [Status] map into the single-character [PathOps] form the
/// commit archive's path-ops side-file records.
pub fn to_path_ops(statuses: &BTreeMap<String, Status>) -> PathOps
{
    let mut ops = PathOps::default();
    for (rel, status) in statuses {
        ops.0.insert(rel.clone(), status.to_char());
    }
    ops
}

/// Fails if a previous commit's staging directory is still present,
/// matching `bam_utils.commit`'s "another commit in progress" guard.
pub fn check_no_concurrent_commit(root: &Path) -> Result<()>
{
    let staging = root.join(COMMIT_STAGING_DIR);
    if staging.exists() {
        return Err(Error::ConcurrentOp(staging.display().to_string()));
    }
    Ok(())
}

/// Builds a deflate archive of every `Added` or `Modified` path in
/// `statuses`, plus a `.paths_ops.json` entry recording the full status map
/// and a `.paths_remap.json` entry limited to the touched paths, matching the
/// original's archive of only the changed subset rather than the whole
/// checkout and its full remap table.
pub fn build_commit_archive<W: Write + Seek>(
    root: &Path,
    statuses: &BTreeMap<String, Status>,
    path_remap: &PathRemap,
    writer: W
) -> Result<()>
{
    let mut zip = zip::ZipWriter::new(writer);
    let options: zip::write::FileOptions<'static> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut touched_remap = PathRemap::default();
    for (rel, status) in statuses {
        if *status == Status::Removed {
            continue;
        }
        let abs = root.join(rel);
        let bytes = fs::read(&abs)?;
        zip.start_file(rel.replace('\\', "/"), options)?;
        zip.write_all(&bytes)?;
        if let Some(original) = path_remap.0.get(rel) {
            touched_remap.0.insert(rel.clone(), original.clone());
        }
    }

    let ops = to_path_ops(statuses);
    let json = to_canonical_json(&ops)?;
    zip.start_file(".paths_ops.json", options)?;
    zip.write_all(json.as_bytes())?;

    let remap_json = to_canonical_json(&touched_remap)?;
    zip.start_file(".paths_remap.json", options)?;
    zip.write_all(remap_json.as_bytes())?;

    zip.finish()?;
    Ok(())
}

/// Stages the archive build under [COMMIT_STAGING_DIR] so a crash mid-commit
/// leaves a directory [check_no_concurrent_commit] can detect on the next
/// attempt, then moves the finished archive to `dest`, removes the staging
/// directory, and returns the fingerprint map `tracked` should be replaced
/// with afterwards (the union of the untouched entries with the new
/// fingerprints of every `Added`/`Modified` path, `Removed` entries dropped
/// -- the original records only the delta here, which loses untouched
/// entries on the next diff; the union is what is actually correct).
pub fn commit(
    root: &Path,
    tracked: &PathsUuid,
    path_remap: &PathRemap,
    ignore: &[Regex],
    dest: &Path
) -> Result<(BTreeMap<String, Status>, PathsUuid)>
{
    check_no_concurrent_commit(root)?;
    let staging_dir = root.join(COMMIT_STAGING_DIR);
    fs::create_dir_all(&staging_dir)?;

    let statuses = status(root, tracked, ignore)?;
    let staged_archive = staging_dir.join("commit.zip");
    {
        let file = fs::File::create(&staged_archive)?;
        build_commit_archive(root, &statuses, path_remap, file)?;
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&staged_archive, dest)?;
    fs::remove_dir_all(&staging_dir)?;

    let mut updated = tracked.clone();
    for (rel, st) in &statuses {
        match st {
            Status::Removed => {
                updated.0.remove(rel);
            },
            Status::Added | Status::Modified => {
                let fp = Fingerprint::of_file(&root.join(rel))?;
                updated.0.insert(rel.clone(), fp.as_str().to_string());
            }
        }
    }

    Ok((statuses, updated))
}

/// The three bundle side-files plus a working directory, as found in a
/// freshly created or checked-out session root.
pub struct SessionState
{
    pub path_remap: PathRemap,
    pub deps_remap: DepsRemap,
    pub paths_uuid: PathsUuid
}

/// Creates an empty checkout root with empty bundle side-files, matching
/// `bam_utils.init`'s bare project-directory setup (before any checkout has
/// populated it).
pub fn init(root: &Path) -> Result<SessionState>
{
    fs::create_dir_all(root)?;
    let state = SessionState { path_remap: PathRemap::default(), deps_remap: DepsRemap::default(), paths_uuid: PathsUuid::default() };
    fs::write(root.join(".paths_remap.json"), to_canonical_json(&state.path_remap)?)?;
    fs::write(root.join(".deps_remap.json"), to_canonical_json(&state.deps_remap)?)?;
    fs::write(root.join(".paths_uuid.json"), to_canonical_json(&state.paths_uuid)?)?;
    Ok(state)
}

/// Reads a [transport] response stream (as produced by a checkout/update
/// request), extracts the archive payload it carries under `root`, and
/// reloads the three bundle side-files from the extracted tree. Status
/// messages carried by the stream's `Status` frames are forwarded through
/// `report` as they are encountered, matching the original's progress
/// printout during download.
pub fn checkout_apply<R: std::io::Read>(stream: &mut R, root: &Path, report: &mut dyn FnMut(&str)) -> Result<SessionState>
{
    read_magic(stream)?;
    let mut archive_bytes: Option<Vec<u8>> = None;
    while let Some((kind, bytes)) = read_frame(stream)? {
        match kind {
            FrameKind::Status => report(&String::from_utf8_lossy(&bytes)),
            FrameKind::Archive => archive_bytes = Some(bytes)
        }
    }
    let archive_bytes = archive_bytes.ok_or_else(|| Error::Other("checkout response carried no archive payload".into()))?;

    fs::create_dir_all(root)?;
    let cursor = std::io::Cursor::new(archive_bytes);
    let mut zip = zip::ZipArchive::new(cursor)?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.name().split('/').any(|c| c == "..") {
            return Err(Error::Other(format!("archive entry {:?} escapes the checkout root", entry.name())));
        }
        let out_path = root.join(entry.name());
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    let path_remap = from_json(&fs::read_to_string(root.join(".paths_remap.json"))?)?;
    let deps_remap = from_json(&fs::read_to_string(root.join(".deps_remap.json"))?)?;
    let paths_uuid = from_json(&fs::read_to_string(root.join(".paths_uuid.json"))?)?;
    Ok(SessionState { path_remap, deps_remap, paths_uuid })
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn status_classifies_added_modified_and_removed()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shot.blend"), b"one").unwrap();
        fs::write(dir.path().join("unchanged.png"), b"same").unwrap();

        let mut tracked = PathsUuid::default();
        tracked.0.insert("shot.blend".into(), Fingerprint::of_file(&dir.path().join("shot.blend")).unwrap().as_str().to_string());
        tracked.0.insert("unchanged.png".into(), Fingerprint::of_file(&dir.path().join("unchanged.png")).unwrap().as_str().to_string());
        tracked.0.insert("gone.png".into(), "deadbeef".into());

        fs::write(dir.path().join("shot.blend"), b"two").unwrap();
        fs::write(dir.path().join("new.png"), b"brand new").unwrap();

        let statuses = status(dir.path(), &tracked, &[]).unwrap();
        assert_eq!(statuses.get("shot.blend"), Some(&Status::Modified));
        assert_eq!(statuses.get("gone.png"), Some(&Status::Removed));
        assert_eq!(statuses.get("new.png"), Some(&Status::Added));
        assert_eq!(statuses.get("unchanged.png"), None);
    }

    #[test]
    fn ignored_paths_are_excluded_from_status()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cache.tmp"), b"junk").unwrap();
        let ignore = compile_ignore_patterns(&[r"\.tmp$".to_string()]).unwrap();
        let statuses = status(dir.path(), &PathsUuid::default(), &ignore).unwrap();
        assert!(statuses.get("cache.tmp").is_none());
    }

    #[test]
    fn check_no_concurrent_commit_detects_leftover_staging_dir()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(COMMIT_STAGING_DIR)).unwrap();
        assert!(check_no_concurrent_commit(dir.path()).is_err());
    }

    #[test]
    fn commit_archives_only_changed_files_and_clears_staging()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shot.blend"), b"content").unwrap();
        let tracked = PathsUuid::default();
        let dest = dir.path().join("out.zip");

        let (statuses, updated) = commit(dir.path(), &tracked, &PathRemap::default(), &[], &dest).unwrap();
        assert_eq!(statuses.get("shot.blend"), Some(&Status::Added));
        assert!(updated.0.contains_key("shot.blend"));
        assert!(dest.exists());
        assert!(!dir.path().join(COMMIT_STAGING_DIR).exists());

        let archive = fs::File::open(&dest).unwrap();
        let mut zip = zip::ZipArchive::new(archive).unwrap();
        assert!(zip.by_name("shot.blend").is_ok());
        assert!(zip.by_name(".paths_ops.json").is_ok());
        assert!(zip.by_name(".paths_remap.json").is_ok());
    }

    #[test]
    fn commit_returns_union_not_delta_of_the_fingerprint_map()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kept.png"), b"untouched").unwrap();
        fs::write(dir.path().join("changed.png"), b"v1").unwrap();

        let mut tracked = PathsUuid::default();
        tracked.0.insert("kept.png".into(), Fingerprint::of_file(&dir.path().join("kept.png")).unwrap().as_str().to_string());
        tracked.0.insert("changed.png".into(), "stale-fingerprint".into());
        tracked.0.insert("deleted.png".into(), "whatever".into());

        let dest = dir.path().join("out.zip");
        let (statuses, updated) = commit(dir.path(), &tracked, &PathRemap::default(), &[], &dest).unwrap();

        assert_eq!(statuses.get("changed.png"), Some(&Status::Modified));
        assert_eq!(statuses.get("deleted.png"), Some(&Status::Removed));
        // `kept.png` never appears in `statuses` (fingerprint unchanged) but
        // must still be present in the map handed back for persistence.
        assert!(updated.0.contains_key("kept.png"));
        assert_ne!(updated.0.get("changed.png"), Some(&"stale-fingerprint".to_string()));
        assert!(!updated.0.contains_key("deleted.png"));
    }

    #[test]
    fn init_writes_empty_side_files()
    {
        let dir = tempfile::tempdir().unwrap();
        let state = init(dir.path()).unwrap();
        assert!(state.paths_uuid.0.is_empty());
        assert!(dir.path().join(".paths_remap.json").exists());
        assert!(dir.path().join(".deps_remap.json").exists());
        assert!(dir.path().join(".paths_uuid.json").exists());
    }

    #[test]
    fn checkout_apply_extracts_archive_and_reloads_side_files()
    {
        let source_dir = tempfile::tempdir().unwrap();
        let mut uuid = PathsUuid::default();
        uuid.0.insert("shot.blend".into(), "fingerprint".into());
        fs::write(source_dir.path().join(".paths_remap.json"), to_canonical_json(&PathRemap::default()).unwrap()).unwrap();
        fs::write(source_dir.path().join(".deps_remap.json"), to_canonical_json(&DepsRemap::default()).unwrap()).unwrap();
        fs::write(source_dir.path().join(".paths_uuid.json"), to_canonical_json(&uuid).unwrap()).unwrap();
        fs::write(source_dir.path().join("shot.blend"), b"BLENDER-v280payload").unwrap();

        let mut archive_buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut archive_buf));
            let options: zip::write::FileOptions<'static> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for name in [".paths_remap.json", ".deps_remap.json", ".paths_uuid.json", "shot.blend"] {
                zip.start_file(name, options).unwrap();
                zip.write_all(&fs::read(source_dir.path().join(name)).unwrap()).unwrap();
            }
            zip.finish().unwrap();
        }

        let mut stream = Vec::new();
        transport::write_magic(&mut stream).unwrap();
        transport::write_status(&mut stream, "fetching 1 file").unwrap();
        transport::write_frame(&mut stream, FrameKind::Archive, &archive_buf).unwrap();

        let dest_dir = tempfile::tempdir().unwrap();
        let mut messages = Vec::new();
        let mut cursor = std::io::Cursor::new(stream);
        let state = checkout_apply(&mut cursor, dest_dir.path(), &mut |m| messages.push(m.to_string())).unwrap();

        assert_eq!(state.paths_uuid.0.get("shot.blend"), Some(&"fingerprint".to_string()));
        assert!(dest_dir.path().join("shot.blend").exists());
        assert_eq!(messages, vec!["fetching 1 file".to_string()]);
    }
}
