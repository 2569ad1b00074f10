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

//! Certificate revocation list resource (`/oic/sec/crl`).

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use super::{CRL_URI, Resource};

/// Revocation list installed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crl {
    /// Identifier of the list.
    #[serde(rename = "crlid")]
    pub id: u16,
    /// Time of the last update, as `YYMMDDhhmmssZ`.
    #[serde(rename = "tupdate")]
    pub this_update: String,
    /// DER encoded revocation list.
    #[serde(rename = "crldata")]
    pub data: ByteBuf,
}

impl Crl {
    /// Creates a new revocation list document.
    pub fn new(id: u16, this_update: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id,
            this_update: this_update.into(),
            data: ByteBuf::from(data),
        }
    }
}

impl Resource for Crl {
    const URI: &'static str = CRL_URI;
    const NAME: &'static str = "crl";
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn crl_document() {
        let crl = Crl::new(1, "260101000000Z", vec![0x30, 0x03, 0x02, 0x01, 0x00]);

        let buf = crl.encode().unwrap();
        let res = Crl::decode(&buf).unwrap();

        assert_eq!(res.id, 1);
        assert_eq!(res.this_update, "260101000000Z");
        assert_eq!(res, crl);
    }
}
