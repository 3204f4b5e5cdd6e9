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

//! Bundles a scene file and everything it references into a self-contained
//! copy, rewriting every external reference to a path relative to the
//! bundle instead of the original project (spec.md §4.4).
//!
//! Grounded on `examples/original_source/packer/blendfile_pack.py`: every
//! source file is copied to a staging location under an `@`-suffixed name
//! as soon as the walker first touches it, so the original tree is never
//! opened for writing; the suffix is stripped (file mode) or the staging
//! tree is zipped up and discarded (archive mode) once every reference has
//! been rewritten.

pub mod bundle;
pub mod policy;

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    rc::Rc
};

use crate::{
    container::Container,
    fingerprint::Fingerprint,
    path::{self, RawPath},
    walker::{self, handlers::write_path, Report, ResolvedReference, VisitSet, WalkOptions},
    Error, Result
};

use bundle::{to_canonical_json, DepsRemap, PathRemap, PathsUuid};

/// How a pack's staged files are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMode
{
    /// Write the staged tree out as plain files under the destination
    /// directory.
    File,
    /// Stream the staged tree into a single deflate archive.
    Archive
}

/// Tuning knobs for a pack run.
#[derive(Debug, Clone)]
pub struct PackOptions
{
    pub mode: PackMode,
    /// Forwarded to the walker: follow every library's full exported set
    /// rather than only the objects actually referenced across the link.
    pub recurse_all_deps: bool,
    /// When set, a reference that would otherwise escape the bundle root is
    /// rebased under this project-relative directory before falling back to
    /// the `__nonproject__` token (spec.md §4.4 step 2).
    pub project_fakeroot: Option<Vec<u8>>
}

impl Default for PackOptions
{
    fn default() -> Self
    {
        PackOptions { mode: PackMode::File, recurse_all_deps: false, project_fakeroot: None }
    }
}

/// Suffix appended to every staged file's name until a pack finishes, so a
/// half-finished run is never mistaken for a complete bundle.
const STAGING_SUFFIX: &str = "@";

struct PackState
{
    staging_root: PathBuf,
    staged: BTreeMap<PathBuf, PathBuf>,
    path_remap: PathRemap,
    deps_remap: DepsRemap,
    paths_uuid: PathsUuid,
    fakeroot: Option<Vec<u8>>,
    root_basedir: Vec<u8>
}

impl PackState
{
    /// Copies `src` into the staging tree at `dest_rel` (suffixed), unless
    /// it was already staged, and records the mapping either way.
    fn stage(&mut self, src: &Path, dest_rel: &Path) -> Result<PathBuf>
    {
        if let Some(existing) = self.staged.get(src) {
            return Ok(existing.clone());
        }
        let mut staged_name = dest_rel.as_os_str().to_os_string();
        staged_name.push(STAGING_SUFFIX);
        let staged_path = self.staging_root.join(&staged_name);
        if let Some(parent) = staged_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &staged_path)?;
        self.staged.insert(src.to_path_buf(), staged_path.clone());
        Ok(staged_path)
    }
}

/// Bundles `src` (a root scene file) and every file it references into
/// `dst`, either as a directory of plain files (`PackMode::File`, `dst` is
/// the destination directory) or a single archive (`PackMode::Archive`,
/// `dst` names the archive file).
pub fn pack(src: &Path, dst: &Path, opts: &PackOptions, report: &mut dyn FnMut(Report)) -> Result<()>
{
    let src = fs::canonicalize(src)?;
    let root_basedir = src
        .parent()
        .map(RawPath::from_native_path)
        .unwrap_or_else(|| RawPath::new(Vec::new()))
        .as_bytes()
        .to_vec();
    let root_name = src
        .file_name()
        .ok_or_else(|| Error::Other("pack source has no file name".into()))?;

    let staging_root = match opts.mode {
        PackMode::File => {
            fs::create_dir_all(dst)?;
            conflict_check(dst)?;
            dst.to_path_buf()
        },
        PackMode::Archive => tempfile::tempdir()?.into_path()
    };

    let state = Rc::new(RefCell::new(PackState {
        staging_root: staging_root.clone(),
        staged: BTreeMap::new(),
        path_remap: PathRemap::default(),
        deps_remap: DepsRemap::default(),
        paths_uuid: PathsUuid::default(),
        fakeroot: opts.project_fakeroot.clone(),
        root_basedir: root_basedir.clone()
    }));

    {
        let mut state = state.borrow_mut();
        state.stage(&src, Path::new(root_name))?;
        let root_name_str = root_name.to_string_lossy().into_owned();
        let fp = Fingerprint::of_file(&src)?;
        state.paths_uuid.0.insert(root_name_str.clone(), fp.as_str().to_string());
        state.path_remap.0.insert(root_name_str, root_name.to_string_lossy().into_owned());
    }

    let walk_opts = WalkOptions { recurse_all_deps: opts.recurse_all_deps, follow_libraries: true };
    let mut visit = VisitSet::new();

    // `report` is a single `&mut dyn FnMut`, so it cannot be captured by two
    // closures alive at once; both closures below push into a shared buffer
    // instead, and it is drained through the real callback once the walk
    // (and every closure borrowing `state`) has finished.
    let messages: Rc<RefCell<Vec<Report>>> = Rc::new(RefCell::new(Vec::new()));

    let open_state = Rc::clone(&state);
    let mut open_path = move |logical: &Path| -> Result<PathBuf> {
        // `logical` is always either `src` itself (staged just above) or a
        // library path built the same way `handle_reference` built the key
        // it staged it under, so no re-resolution is needed here -- doing
        // so could disagree with that key (e.g. symlink resolution) and
        // miss the entry.
        let state = open_state.borrow();
        match state.staged.get(logical) {
            Some(staged) => Ok(staged.clone()),
            None => Err(Error::Other(format!("library {:?} was not staged before being opened", logical)))
        }
    };

    let ref_state = Rc::clone(&state);
    let ref_messages = Rc::clone(&messages);
    let mut on_reference = move |container: &mut Container, resolved: &ResolvedReference| -> Result<()> {
        handle_reference(&ref_state, container, resolved, &mut |r| ref_messages.borrow_mut().push(r))
    };

    let adapter_messages = Rc::clone(&messages);
    let mut report_adapter = move |r: Report| adapter_messages.borrow_mut().push(r);

    walker::walk(&src, &walk_opts, false, &mut visit, &mut report_adapter, &mut open_path, &mut on_reference)?;

    drop(open_path);
    drop(on_reference);
    drop(report_adapter);

    for message in Rc::try_unwrap(messages).map(RefCell::into_inner).unwrap_or_default() {
        report(message);
    }

    let state = Rc::try_unwrap(state).map_err(|_| Error::Other("pack state still shared at finalize".into()))?.into_inner();
    finalize(state, dst, opts.mode)
}

fn conflict_check(dst: &Path) -> Result<()>
{
    if let Ok(entries) = fs::read_dir(dst) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().ends_with(STAGING_SUFFIX) {
                return Err(Error::ConcurrentOp(dst.display().to_string()));
            }
        }
    }
    Ok(())
}

fn handle_reference(
    state: &Rc<RefCell<PackState>>,
    container: &mut Container,
    resolved: &ResolvedReference,
    report: &mut dyn FnMut(Report)
) -> Result<()>
{
    let abs = path::resolve_scene_relative(&resolved.path, &resolved.scene_basedir);
    let src_path = path::to_path_buf(&abs);

    let (fakeroot, root_basedir) = {
        let state = state.borrow();
        (state.fakeroot.clone(), state.root_basedir.clone())
    };
    // `base_dir_src` is always the bundle root's own directory, never the
    // referring scene's -- this is what lets `dest_from_root` stay a sane,
    // never-escaping bundle-relative path regardless of which scene file
    // holds the reference; `fp_basedir` is what then reprojects it onto a
    // path relative to wherever that scene file itself lands.
    let fp_basedir = scene_fp_basedir(&resolved.scene_file, &root_basedir, fakeroot.as_deref());
    let (dest_from_root, write_ref) = policy::relpath_remap(&abs, &root_basedir, &fp_basedir, fakeroot.as_deref());

    let mut new_value = b"//".to_vec();
    new_value.extend_from_slice(&write_ref);
    write_path(container, &resolved.raw, &new_value)?;

    let scene_rel = RawPath::from_native_path(&resolved.scene_file).to_string_lossy();
    let dest_from_root_str = String::from_utf8_lossy(&dest_from_root).into_owned();
    let original = resolved.path.to_string_lossy();

    let mut state = state.borrow_mut();
    state
        .deps_remap
        .0
        .entry(scene_rel)
        .or_default()
        .insert(dest_from_root_str.clone(), original);

    // A library's staged copy is what the recursive walk_level call opens
    // next through open_path, but the copy itself is made right here, the
    // same as any other asset -- only the reference kind differs.
    state.path_remap.0.insert(dest_from_root_str.clone(), relative_project_path(&abs, &root_basedir));
    if !src_path.exists() {
        report(Report::Missing(resolved.path.clone()));
        return Ok(());
    }
    let fp = Fingerprint::of_file(&src_path)?;
    state.paths_uuid.0.insert(dest_from_root_str, fp.as_str().to_string());
    let dest_rel = path::to_path_buf(&dest_from_root);
    state.stage(&src_path, &dest_rel)?;
    Ok(())
}

/// The path side-files record each destination against the source path
/// relative to the bundle root (the root scene file's own directory), which
/// doubles as a project root proxy when no project root is otherwise known.
fn relative_project_path(abs: &[u8], root_basedir: &[u8]) -> String
{
    String::from_utf8_lossy(&path::relative(abs, root_basedir)).into_owned()
}

/// Where `scene_file` itself will land once packed, as an absolute
/// directory -- the basedir every reference *it* holds must be remapped
/// against, not the bundle root's own basedir.
///
/// Mirrors `blendfile_pack.py`'s `fp_basedir_conv`: remaps the scene file's
/// own absolute path against the root exactly as any other reference would
/// be (`fp_basedir == base_dir_src` for that one call), then takes the
/// directory of the result. For the root scene file itself this reduces to
/// `root_basedir`; for a nested library staged in its own subdirectory,
/// every reference it holds is remapped relative to where the library
/// lands, not where the root lands -- without this, a nested library whose
/// source directory differs from the root's could have its references
/// remapped with unresolved `..` components that escape the staging root.
fn scene_fp_basedir(scene_file: &Path, root_basedir: &[u8], fakeroot: Option<&[u8]>) -> Vec<u8>
{
    let scene_abs = RawPath::from_native_path(scene_file).as_bytes().to_vec();
    let (self_rel, _) = policy::relpath_remap(&scene_abs, root_basedir, root_basedir, fakeroot);
    path::normalize(&path::join_bytes(&[root_basedir, &path::dirname(&self_rel)]))
}

fn finalize(state: PackState, dst: &Path, mode: PackMode) -> Result<()>
{
    let PackState { staging_root, staged, path_remap, deps_remap, paths_uuid, .. } = state;

    match mode {
        PackMode::File => {
            for staged_path in staged.values() {
                let final_path = strip_staging_suffix(staged_path);
                if let Some(parent) = final_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(staged_path, &final_path)?;
            }
            write_side_file(dst, ".paths_remap.json", &path_remap)?;
            write_side_file(dst, ".deps_remap.json", &deps_remap)?;
            write_side_file(dst, ".paths_uuid.json", &paths_uuid)?;
        },
        PackMode::Archive => {
            let archive = fs::File::create(dst)?;
            let mut zip = zip::ZipWriter::new(archive);
            let options: zip::write::FileOptions<'static> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for staged_path in staged.values() {
                let name = strip_staging_suffix(staged_path);
                let arcname = name.strip_prefix(&staging_root).unwrap_or(&name).to_string_lossy().replace('\\', "/");
                zip.start_file(arcname, options)?;
                let bytes = fs::read(staged_path)?;
                zip.write_all(&bytes)?;
            }
            write_archive_entry(&mut zip, options, ".paths_remap.json", &path_remap)?;
            write_archive_entry(&mut zip, options, ".deps_remap.json", &deps_remap)?;
            write_archive_entry(&mut zip, options, ".paths_uuid.json", &paths_uuid)?;
            zip.finish()?;
            let _ = fs::remove_dir_all(&staging_root);
        }
    }
    Ok(())
}

fn strip_staging_suffix(staged_path: &Path) -> PathBuf
{
    let s = staged_path.to_string_lossy();
    match s.strip_suffix(STAGING_SUFFIX) {
        Some(stripped) => PathBuf::from(stripped),
        None => staged_path.to_path_buf()
    }
}

fn write_side_file<T: serde::Serialize>(dst: &Path, name: &str, value: &T) -> Result<()>
{
    let json = to_canonical_json(value)?;
    fs::write(dst.join(name), json)?;
    Ok(())
}

fn write_archive_entry<W: std::io::Write + std::io::Seek, T: serde::Serialize>(
    zip: &mut zip::ZipWriter<W>,
    options: zip::write::FileOptions<'static>,
    name: &str,
    value: &T
) -> Result<()>
{
    let json = to_canonical_json(value)?;
    zip.start_file(name, options)?;
    zip.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn conflict_check_detects_leftover_staging_files()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shot.blend@"), b"x").unwrap();
        assert!(conflict_check(dir.path()).is_err());
    }

    #[test]
    fn conflict_check_passes_on_clean_directory()
    {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shot.blend"), b"x").unwrap();
        assert!(conflict_check(dir.path()).is_ok());
    }

    #[test]
    fn strip_staging_suffix_removes_trailing_marker()
    {
        assert_eq!(strip_staging_suffix(Path::new("/bundle/shot.blend@")), PathBuf::from("/bundle/shot.blend"));
        assert_eq!(strip_staging_suffix(Path::new("/bundle/maps/a.png@")), PathBuf::from("/bundle/maps/a.png"));
    }
}
