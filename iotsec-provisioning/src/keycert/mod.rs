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

//! Key derivation and certificate issuance.

use std::future::Future;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::oic::cred::KeyMaterial;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use uuid::Uuid;

use crate::transport::SecureSession;

pub(crate) mod kdf;
pub mod software;

pub use self::software::SoftwareKeyCert;

/// Leaf certificate issued for a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// DER chain, leaf first and CA last.
    pub chain: Vec<Vec<u8>>,
    /// PKCS#8 private key of the leaf.
    pub private_key: KeyMaterial,
}

/// Cryptographic operations needed to provision devices.
pub trait KeyCertService: Send {
    /// Generates a random symmetric key of the given length in bytes.
    fn generate_key(&mut self, len: usize) -> Result<KeyMaterial, Error>;

    /// Derives the owner PSK shared with the device from the secure session.
    ///
    /// The method label and both identities are bound into the key.
    fn derive_shared_secret(
        &mut self,
        session: &SecureSession,
        oxm: Oxm,
        requester: &Uuid,
        target: &Uuid,
        len: usize,
    ) -> Result<KeyMaterial, Error>;

    /// Issues a leaf certificate for the subject, signed by the local CA.
    fn issue_certificate(
        &mut self,
        subject: &Uuid,
    ) -> impl Future<Output = Result<IssuedCertificate, Error>> + Send;
}
