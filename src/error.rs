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

//! Error declarations.

use std::{
    convert::From,
    fmt::{Display, Formatter},
    string::String
};

/// Represents a scenepack error.
#[derive(Debug)]
pub enum Error
{
    /// The container header is malformed: bad magic, unknown pointer-size or
    /// endian tag, or a truncated 12-byte header.
    ///
    /// # Arguments
    /// * message.
    FormatInvalid(String),

    /// The DNA catalog is malformed, or a field path does not resolve
    /// against a struct (unknown struct index, unknown field name).
    ///
    /// # Arguments
    /// * message.
    DnaInvalid(String),

    /// A referenced asset or linked scene file was not found on disk.
    ///
    /// # Arguments
    /// * the path that could not be found.
    PathMissing(String),

    /// Two distinct source files fingerprinted to the same value during a
    /// remap pass.
    ///
    /// # Arguments
    /// * the first source path to claim the fingerprint.
    /// * the second (losing) source path.
    RemapCollision(String, String),

    /// A packer was invoked while a staging directory from a previous,
    /// unfinished run still exists.
    ///
    /// # Arguments
    /// * the staging path in conflict.
    ConcurrentOp(String),

    /// An operation requiring a writable container was attempted on one
    /// opened read-only.
    ReadOnly,

    /// Describes a data truncation error: a block or the file itself has
    /// been truncated.
    ///
    /// # Arguments
    /// * last operation name before failure.
    Truncation(&'static str),

    /// Describes an utf8 decoding/encoding error.
    ///
    /// # Arguments
    /// * last operation name before failure.
    Utf8(&'static str),

    /// Describes an operation that is currently unsupported (e.g. writing a
    /// non-char primitive field).
    ///
    /// # Arguments
    /// * message.
    Unsupported(String),

    /// A JSON side-file could not be parsed or serialized.
    ///
    /// # Arguments
    /// * error description string.
    Json(serde_json::Error),

    /// Describes an io error.
    ///
    /// # Arguments
    /// * the error that occurred.
    Io(std::io::Error),

    /// Describes a generic unknown error.
    ///
    /// # Arguments
    /// * error message.
    Other(String)
}

impl From<std::io::Error> for Error
{
    fn from(e: std::io::Error) -> Self
    {
        return Error::Io(e);
    }
}

impl From<serde_json::Error> for Error
{
    fn from(e: serde_json::Error) -> Self
    {
        return Error::Json(e);
    }
}

impl From<zip::result::ZipError> for Error
{
    fn from(e: zip::result::ZipError) -> Self
    {
        return Error::Other(format!("zip error ({})", e));
    }
}

impl From<&str> for Error
{
    fn from(e: &str) -> Self
    {
        return Error::Other(String::from(e));
    }
}

impl Display for Error
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        return match self {
            Error::FormatInvalid(e) => f.write_str(&format!("invalid container format ({})", e)),
            Error::DnaInvalid(e) => f.write_str(&format!("invalid DNA catalog ({})", e)),
            Error::PathMissing(p) => f.write_str(&format!("path not found: {}", p)),
            Error::RemapCollision(a, b) => {
                f.write_str(&format!("duplicate fingerprint for {:?} and {:?}", a, b))
            },
            Error::ConcurrentOp(p) => {
                f.write_str(&format!("staging directory already exists, another pack is in progress: {}", p))
            },
            Error::ReadOnly => f.write_str("attempted to mutate a container opened read-only"),
            Error::Truncation(e) => f.write_str(&format!(
                "unexpected EOF while reading {}, are you sure the data is not truncated?",
                e
            )),
            Error::Utf8(e) => f.write_str(&format!("utf8 decoding/encoding error in {}", e)),
            Error::Unsupported(e) => f.write_str(&format!("unsupported operation {}", e)),
            Error::Json(e) => f.write_str(&format!("json error ({})", e)),
            Error::Io(e) => f.write_str(&format!("io error ({})", e)),
            Error::Other(e) => f.write_str(&format!("{}", e))
        };
    }
}

impl std::error::Error for Error {}
