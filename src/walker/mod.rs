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

//! The dependency walker: enumerates every external reference reachable
//! from a root scene file, recursing into linked libraries.

pub mod handlers;

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf}
};

use handlers::{RawReference, HANDLED_CODES};

use crate::{
    container::{BlockHandle, Container},
    dna::field::FieldValue,
    path::RawPath,
    Result
};

/// A notable event during a walk or pack, handed to the caller-supplied
/// report callback rather than logged -- this is the documented "report
/// line" interface (spec.md §5, §7), distinct from the `log` crate
/// instrumentation used for developer diagnostics.
#[derive(Debug, Clone)]
pub enum Report
{
    Info(String),
    Missing(RawPath),
    Warning(String)
}

/// Tuning knobs the caller controls explicitly; nothing here is read from
/// process-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions
{
    /// Follow every library's full exported set rather than only the
    /// objects actually referenced across the link.
    pub recurse_all_deps: bool,
    /// Recurse into linked libraries at all. The remapper's single-file
    /// passes set this to `false`, matching `recursive=False` in
    /// `blendfile_path_walker.FilePath.visit_from_blend`: only the root
    /// file's own direct references are visited, libraries are named but
    /// not opened.
    pub follow_libraries: bool
}

impl Default for WalkOptions
{
    fn default() -> Self
    {
        WalkOptions { recurse_all_deps: false, follow_libraries: true }
    }
}

/// Tracks, per library path, the set of object short-names already
/// expanded -- shared across a recursive walk so that a library visited
/// from two different root-level objects is only expanded once per name.
#[derive(Debug, Default)]
pub struct VisitSet(HashMap<RawPath, HashSet<String>>);

impl VisitSet
{
    pub fn new() -> Self
    {
        VisitSet(HashMap::new())
    }
}

/// One external reference found during a walk, resolved to an absolute
/// path and tagged with the scene file and recursion level it came from.
#[derive(Debug, Clone)]
pub struct ResolvedReference
{
    pub raw: RawReference,
    pub path: RawPath,
    pub scene_basedir: Vec<u8>,
    pub scene_file: PathBuf,
    pub level: u32,
    /// True when this reference came from an `LI` (library) block, i.e.
    /// names another scene file to recurse into rather than a plain asset.
    pub is_library: bool
}

/// Walks `root`, calling `on_reference` once per external reference found.
///
/// `on_reference` is given mutable access to the currently open container
/// so that a caller in read-write mode (the packer) can rewrite the
/// reference's path field in the same pass the walker discovers it --
/// matching the source's `report=`/`temp_remap_cb=` generator-callback
/// style in `blendfile_pack.py`. A read-only walk (deps listing,
/// remap-start) simply ignores the container argument.
///
/// `open_path` translates the logical path of the root or of each
/// discovered library into the path actually opened, before every
/// `Container::open` call -- the packer uses this to redirect mutation
/// onto a staged copy so the source tree is never touched (its own
/// `temp_remap_cb`); a read-only walk passes an identity closure.
pub fn walk(
    root: &Path,
    opts: &WalkOptions,
    read_only: bool,
    visit: &mut VisitSet,
    report: &mut dyn FnMut(Report),
    open_path: &mut dyn FnMut(&Path) -> Result<PathBuf>,
    on_reference: &mut dyn FnMut(&mut Container, &ResolvedReference) -> Result<()>
) -> Result<()>
{
    walk_level(root, opts, read_only, 0, None, visit, report, open_path, on_reference)
}

fn walk_level(
    path: &Path,
    opts: &WalkOptions,
    read_only: bool,
    level: u32,
    object_filter: Option<&HashSet<String>>,
    visit: &mut VisitSet,
    report: &mut dyn FnMut(Report),
    open_path: &mut dyn FnMut(&Path) -> Result<PathBuf>,
    on_reference: &mut dyn FnMut(&mut Container, &ResolvedReference) -> Result<()>
) -> Result<()>
{
    log::debug!("walking {:?} at level {}", path, level);
    let actual_path = open_path(path)?;
    let mut container = match Container::open(&actual_path, read_only) {
        Ok(c) => c,
        Err(e) => {
            report(Report::Warning(format!("skipping malformed library {:?}: {}", path, e)));
            return Ok(());
        }
    };

    let scene_basedir = path
        .parent()
        .map(RawPath::from_native_path)
        .unwrap_or_else(|| RawPath::new(Vec::new()))
        .as_bytes()
        .to_vec();

    let restrict = level > 0 && !opts.recurse_all_deps;
    let expanded = if restrict { object_filter.map(|f| expand_ids(&mut container, f)) } else { None };

    let mut libraries: Vec<(PathBuf, HashSet<String>)> = Vec::new();
    for code_str in HANDLED_CODES {
        for &block in container.find_by_code(*code_str) {
            if restrict {
                let name = id_name(&mut container, block).unwrap_or_default();
                let in_scope = expanded.as_ref().map(|e| e.contains(&name)).unwrap_or(false);
                if !in_scope {
                    continue;
                }
            }
            let raws = handlers::dispatch(&mut container, *code_str, block)?;
            for raw in raws {
                let resolved_path = match handlers::resolve_path(&mut container, &raw) {
                    Ok(p) => p,
                    Err(_) => continue
                };

                if *code_str == "LI" {
                    let abs = crate::path::resolve_scene_relative(&resolved_path, &scene_basedir);
                    let lib_path = crate::path::to_path_buf(&abs);
                    if !lib_path.exists() {
                        report(Report::Missing(resolved_path.clone()));
                    }
                    libraries.push((lib_path, HashSet::new()));
                }

                let resolved = ResolvedReference {
                    raw,
                    path: resolved_path,
                    scene_basedir: scene_basedir.clone(),
                    scene_file: path.to_path_buf(),
                    level,
                    is_library: *code_str == "LI"
                };
                on_reference(&mut container, &resolved)?;
            }
        }
    }

    // The referring file is fully closed before any library it points to
    // is opened, so memory for one file never overlaps another.
    container.close()?;

    if opts.follow_libraries {
        for (lib_path, names) in libraries {
            let key = RawPath::from_native_path(&lib_path);
            let fresh: HashSet<String> = {
                let already = visit.0.entry(key).or_default();
                let fresh: HashSet<String> = names.difference(already).cloned().collect();
                already.extend(fresh.iter().cloned());
                fresh
            };
            if opts.recurse_all_deps || level == 0 || !fresh.is_empty() {
                walk_level(&lib_path, opts, read_only, level + 1, Some(&fresh), visit, report, open_path, on_reference)?;
            }
        }
    }
    Ok(())
}

/// Lists every external reference reachable from each of `paths`, read-only.
/// `recursive` controls whether linked libraries are opened in turn
/// ([WalkOptions::follow_libraries]); `recurse_all_deps` always follows the
/// full exported set of any library that is opened, matching the `deps`
/// CLI command's `--all-deps` flag.
pub fn deps(paths: &[PathBuf], recursive: bool, recurse_all_deps: bool, report: &mut dyn FnMut(Report)) -> Result<Vec<ResolvedReference>>
{
    let opts = WalkOptions { recurse_all_deps, follow_libraries: recursive };
    let mut found = Vec::new();
    for root in paths {
        let mut visit = VisitSet::new();
        let mut identity = |p: &Path| -> Result<PathBuf> { Ok(p.to_path_buf()) };
        let mut collect = |_: &mut Container, resolved: &ResolvedReference| -> Result<()> {
            found.push(resolved.clone());
            Ok(())
        };
        walk(root, &opts, true, &mut visit, report, &mut identity, &mut collect)?;
    }
    Ok(found)
}

/// Reads an ID block's short name (the `id.name` field every ID-derived
/// struct starts with, first two bytes are a two-letter type code).
fn id_name(container: &mut Container, block: BlockHandle) -> Result<String>
{
    container.get_field(block, "id.name")?.as_str_truncated()
}

/// Follows a `ListBase`-style linked list: reads `head_field` off `owner`
/// for the address of the first node, then walks `next_field` off each node
/// in turn, reading `object_field` at each one and resolving it to the
/// referenced ID's short name. Mirrors the `strip.next` chain walk in
/// `walker::handlers::scene`.
fn walk_id_list(container: &mut Container, owner: BlockHandle, head_field: &str, object_field: &str, next_field: &str) -> Vec<String>
{
    let mut names = Vec::new();
    let mut addr = match container.get_field(owner, head_field) {
        Ok(FieldValue::Pointer(a)) => a,
        _ => return names
    };
    while addr != 0 {
        let node = match container.find_by_old_address(addr) {
            Some(n) => n,
            None => break
        };
        if let Ok(FieldValue::Pointer(obj_addr)) = container.get_field(node, object_field) {
            if obj_addr != 0 {
                if let Some(object) = container.find_by_old_address(obj_addr) {
                    if let Ok(name) = id_name(container, object) {
                        names.push(name);
                    }
                }
            }
        }
        addr = match container.get_field(node, next_field) {
            Ok(FieldValue::Pointer(a)) => a,
            _ => 0
        };
    }
    names
}

/// One level of typed outgoing-reference expansion for the ID-expansion
/// pass (spec.md §4.3): given a set of object short-names already in
/// scope, follows direct pointer fields and the scene/group member lists to
/// the further objects they reference, returning the expanded set.
///
/// Expands the direct-pointer relationships (object -> data / dup_group /
/// proxy, material -> nodetree / group, texture -> image, scene -> world /
/// nodetree) as well as the two linked-list relationships named in spec.md
/// §4.3: a scene's object bases (`base.first`/`next`, node field `object`)
/// and a group's group-objects (`gobject.first`/`next`, node field `ob`).
fn expand_ids(container: &mut Container, seed: &HashSet<String>) -> HashSet<String>
{
    let mut expanded = seed.clone();
    const OUTGOING_POINTER_FIELDS: &[&str] =
        &["data", "dup_group", "proxy", "nodetree", "group", "ima", "world"];

    for code_str in ["OB", "MA", "TE", "SC", "GR"] {
        for &block in container.find_by_code(code_str) {
            let name = match id_name(container, block) {
                Ok(n) => n,
                Err(_) => continue
            };
            if !seed.contains(&name) {
                continue;
            }
            for &field in OUTGOING_POINTER_FIELDS {
                if let Ok(FieldValue::Pointer(addr)) = container.get_field(block, field) {
                    if addr == 0 {
                        continue;
                    }
                    if let Some(target) = container.find_by_old_address(addr) {
                        if let Ok(target_name) = id_name(container, target) {
                            expanded.insert(target_name);
                        }
                    }
                }
            }
            if code_str == "SC" {
                expanded.extend(walk_id_list(container, block, "base.first", "object", "next"));
            }
            if code_str == "GR" {
                expanded.extend(walk_id_list(container, block, "gobject.first", "ob", "next"));
            }
        }
    }
    expanded
}
