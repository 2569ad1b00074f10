// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Error returned by the provisioning libraries.

use std::fmt::Display;

/// Error for the provisioning protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    ctx: &'static str,
}

impl Error {
    /// Create a new error with the given context.
    pub const fn new(kind: ErrorKind, ctx: &'static str) -> Self {
        Self { kind, ctx }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the context the error was created with.
    pub fn context(&self) -> &'static str {
        self.ctx
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.ctx)
    }
}

impl std::error::Error for Error {}

/// Class of failure for which the [`Error`] was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or duplicate input, detected before any network request.
    Validation,
    /// Unexpected or failed response from a remote device.
    Protocol,
    /// Couldn't allocate a resource needed by the operation.
    ResourceExhaustion,
    /// A local update failed after the matching remote operation succeeded.
    Consistency,
    /// Couldn't complete a link store operation.
    Store,
    /// Couldn't encode data.
    Encode,
    /// Couldn't decode data.
    Decode,
    /// Couldn't complete crypto operation.
    Crypto,
    /// Couldn't complete io operation.
    Io,
    /// Couldn't reach the device or manage its session.
    Transport,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "invalid parameter"),
            ErrorKind::Protocol => write!(f, "unexpected response"),
            ErrorKind::ResourceExhaustion => write!(f, "resources exhausted"),
            ErrorKind::Consistency => write!(f, "inconsistent local state"),
            ErrorKind::Store => write!(f, "couldn't access link store"),
            ErrorKind::Encode => write!(f, "couldn't encode"),
            ErrorKind::Decode => write!(f, "couldn't decode"),
            ErrorKind::Crypto => write!(f, "couldn't complete crypto operation"),
            ErrorKind::Io => write!(f, "couldn't complete io operation"),
            ErrorKind::Transport => write!(f, "couldn't complete transport operation"),
        }
    }
}
