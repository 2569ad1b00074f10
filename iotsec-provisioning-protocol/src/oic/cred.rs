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

//! Credential resource (`/oic/sec/cred`).

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{CRED_URI, Resource};
use crate::Error;
use crate::error::ErrorKind;
use crate::utils::Redacted;

/// Kind of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum CredType {
    /// Symmetric key shared by two devices.
    SymmetricPairwise = 1,
    /// Symmetric key shared by a group.
    SymmetricGroup = 2,
    /// Raw asymmetric key.
    AsymmetricKey = 4,
    /// Certificate chain with its private key.
    Certificate = 8,
    /// PIN or password.
    Pin = 16,
}

impl From<CredType> for u8 {
    fn from(value: CredType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for CredType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CredType::SymmetricPairwise),
            2 => Ok(CredType::SymmetricGroup),
            4 => Ok(CredType::AsymmetricKey),
            8 => Ok(CredType::Certificate),
            16 => Ok(CredType::Pin),
            _ => Err(Error::new(ErrorKind::Decode, "unknown credential type")),
        }
    }
}

/// Secret bytes, zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(Zeroizing<Vec<u8>>);

impl KeyMaterial {
    /// Wraps the secret bytes.
    pub fn new(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    /// Returns the secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Length of the secret.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyMaterial")
            .field(&Redacted::new(self.0.len()))
            .finish()
    }
}

impl From<Vec<u8>> for KeyMaterial {
    fn from(value: Vec<u8>) -> Self {
        Self(Zeroizing::new(value))
    }
}

impl Serialize for KeyMaterial {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes::Bytes::new(&self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyMaterial {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = ByteBuf::deserialize(deserializer)?;

        Ok(Self(Zeroizing::new(bytes.into_vec())))
    }
}

/// A credential installed on a device, or kept locally by the provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Device this credential authenticates.
    #[serde(rename = "subjectuuid")]
    pub subject: Uuid,
    /// Kind of the credential.
    #[serde(rename = "credtype")]
    pub cred_type: CredType,
    /// DER certificate chain, leaf first.
    #[serde(rename = "publicdata", default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_chain: Vec<ByteBuf>,
    /// Symmetric key or private key.
    #[serde(rename = "privatedata")]
    pub private_data: KeyMaterial,
    /// Devices allowed to manage this credential.
    #[serde(rename = "ownrs")]
    pub owners: Vec<Uuid>,
}

impl Credential {
    /// Symmetric pairwise credential for the subject.
    pub fn symmetric(subject: Uuid, key: KeyMaterial, owner: Uuid) -> Self {
        Self {
            subject,
            cred_type: CredType::SymmetricPairwise,
            certificate_chain: Vec::new(),
            private_data: key,
            owners: vec![owner],
        }
    }

    /// Certificate credential for the subject.
    pub fn certificate(
        subject: Uuid,
        chain: Vec<Vec<u8>>,
        private_key: KeyMaterial,
        owner: Uuid,
    ) -> Self {
        Self {
            subject,
            cred_type: CredType::Certificate,
            certificate_chain: chain.into_iter().map(ByteBuf::from).collect(),
            private_data: private_key,
            owners: vec![owner],
        }
    }
}

impl Resource for Credential {
    const URI: &'static str = CRED_URI;
    const NAME: &'static str = "cred";
}
