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

//! Secure virtual resources of an OIC device.
//!
//! Every resource is addressed by a fixed URI and exchanged as a CBOR document. Field names follow
//! the short property names used on the wire.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;
use crate::error::ErrorKind;

pub mod acl;
pub mod cred;
pub mod crl;
pub mod doxm;
pub mod oxm;
pub mod pstat;

/// Ownership transfer resource.
pub const DOXM_URI: &str = "/oic/sec/doxm";
/// Provisioning status resource.
pub const PSTAT_URI: &str = "/oic/sec/pstat";
/// Access control list resource.
pub const ACL_URI: &str = "/oic/sec/acl";
/// Credential resource.
pub const CRED_URI: &str = "/oic/sec/cred";
/// Certificate revocation list resource.
pub const CRL_URI: &str = "/oic/sec/crl";

/// Query parameter selecting the credential subject on the credential resource.
pub const CRED_SUBJECT_QUERY: &str = "sub";

/// Serialize and deserialize a security resource document.
pub trait Resource: Serialize + DeserializeOwned {
    /// URI of the resource on the device.
    const URI: &'static str;

    /// Name of the document, used for logging and error context.
    const NAME: &'static str;

    /// Decodes the document from a CBOR buffer.
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        ciborium::from_reader(buf).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, resource = Self::NAME, "couldn't decode resource");

            #[cfg(not(feature = "tracing"))]
            let _ = err;

            Error::new(ErrorKind::Decode, "resource document")
        })
    }

    /// Encodes the document into a CBOR buffer.
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();

        ciborium::into_writer(self, &mut buf).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %err, resource = Self::NAME, "couldn't encode resource");

            #[cfg(not(feature = "tracing"))]
            let _ = err;

            Error::new(ErrorKind::Encode, "resource document")
        })?;

        Ok(buf)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::oic::doxm::Doxm;
    use crate::oic::oxm::Oxm;

    pub(crate) fn create_uuid() -> Uuid {
        Uuid::from_u128(0x43bc9e0f_731a_4e7f_947c_5d03b0c1e483)
    }

    pub(crate) fn create_owner() -> Uuid {
        Uuid::from_u128(0x0aa1b2c3_d4e5_4f60_8172_839405a6b7c8)
    }

    #[test]
    fn decode_garbage_is_a_decode_error() {
        let err = Doxm::decode(&[0xff, 0x00, 0x13]).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn decode_other_document_fails() {
        let buf = Oxm::JustWorks.label().as_bytes().to_vec();

        assert!(Doxm::decode(&buf).is_err());
    }

    #[test]
    fn resource_uris() {
        let uris = [DOXM_URI, PSTAT_URI, ACL_URI, CRED_URI, CRL_URI].join("\n");

        insta::assert_snapshot!(uris, @r"
        /oic/sec/doxm
        /oic/sec/pstat
        /oic/sec/acl
        /oic/sec/cred
        /oic/sec/crl
        ");
    }
}
