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

//! scenepack reads, rewrites and repacks a block-structured 3D scene file
//! format together with the external assets (images, fonts, sounds, movies,
//! linked scene files) it references, so that a project can be sliced into
//! self-contained bundles, edited elsewhere and committed back.
//!
//! The crate is organized the way the problem is laid out in layers, leaves
//! first:
//!
//! * [`container`] — header, block index and in-place typed mutation for a
//!   single scene file.
//! * [`dna`] — the self-describing type catalog carried in every scene file,
//!   and the typed field get/set built on top of it.
//! * [`path`] and [`fingerprint`] — byte-path utilities and content hashing
//!   shared by the walker, packer and remapper.
//! * [`walker`] — enumerates every external reference and linked scene file
//!   reachable from a root file.
//! * [`packer`] — rewrites references into a bundle layout (flat directory
//!   or archive).
//! * [`remap`] — the inverse of the packer, plus content-fingerprint-driven
//!   remapping for externally moved/renamed trees.
//! * [`session`] — local checkout bookkeeping (status, ignore patterns,
//!   commit archive assembly) and the wire framing for the remote checkout
//!   stream.

pub mod container;
pub mod dna;
pub mod error;
pub mod fingerprint;
pub mod packer;
pub mod path;
pub mod remap;
pub mod session;
pub mod walker;

pub use error::Error;

/// The result type used everywhere in this crate.
pub type Result<T> = std::result::Result<T, Error>;

// The named entry points a front-end (CLI, service) is expected to wrap
// with argument parsing; re-exported here under their CLI names so that
// front-end is a thin binding layer rather than a second implementation.
pub use packer::{pack, PackMode, PackOptions};
pub use walker::deps;

/// `remap-start(paths)`.
pub use remap::start_persist as remap_start;
/// `remap-finish(paths, force-relative?, dry-run?)`.
pub use remap::finish_persist as remap_finish;
/// `remap-reset()`.
pub use remap::reset as remap_reset;

/// `init`, `checkout`/`update`, `commit`, `status`, `list`.
pub use session::{checkout_apply, commit as session_commit, init as session_init, scan as session_list, status as session_status};
