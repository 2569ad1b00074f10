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

//! Software based key and certificate service.

use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use aws_lc_rs::signature::{EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair};
use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::cred::KeyMaterial;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use iotsec_provisioning_protocol::utils::Hex;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyUsagePurpose, SerialNumber,
};
use tracing::{debug, error, instrument};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{IssuedCertificate, KeyCertService, kdf};
use crate::transport::SecureSession;

/// Length of the random serial number of the issued certificates.
const SERIAL_LEN: usize = 16;

/// Common name of the generated CA.
pub const DEFAULT_CA_NAME: &str = "iotsec provisioning CA";

fn alg() -> &'static EcdsaSigningAlgorithm {
    &aws_lc_rs::signature::ECDSA_P256_SHA256_ASN1_SIGNING
}

/// Keys and certificates handled in memory, with a locally generated P-256 CA.
pub struct SoftwareKeyCert {
    rng: SystemRandom,
    ca_key: EcdsaKeyPair,
    ca_params: CertificateParams,
    ca_der: Vec<u8>,
}

impl SoftwareKeyCert {
    /// Creates the service with a new CA.
    pub fn new() -> Result<Self, Error> {
        Self::with_ca_name(DEFAULT_CA_NAME)
    }

    /// Creates the service with a new CA with the given common name.
    pub fn with_ca_name(common_name: &str) -> Result<Self, Error> {
        let rng = SystemRandom::new();

        let (ca_key, _) = generate_key_pair(&rng)?;

        let mut ca_params = CertificateParams::new(Vec::<String>::new()).map_err(|err| {
            error!(error = %err, "couldn't create CA parameters");

            Error::new(ErrorKind::Crypto, "to create CA parameters")
        })?;
        ca_params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let ca_cert = ca_params
            .self_signed(&RcgenKeyCompat::new(&ca_key, &rng))
            .map_err(|err| {
                error!(error = %err, "couldn't self sign CA certificate");

                Error::new(ErrorKind::Crypto, "to self sign CA certificate")
            })?;

        debug!(common_name, "CA certificate created");

        Ok(Self {
            rng,
            ca_key,
            ca_params,
            ca_der: ca_cert.der().to_vec(),
        })
    }

    /// DER certificate of the CA.
    pub fn ca_certificate(&self) -> &[u8] {
        &self.ca_der
    }
}

impl std::fmt::Debug for SoftwareKeyCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeyCert")
            .field("ca_der_len", &self.ca_der.len())
            .finish_non_exhaustive()
    }
}

fn generate_key_pair(rng: &SystemRandom) -> Result<(EcdsaKeyPair, KeyMaterial), Error> {
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg(), rng)
        .map_err(|_| Error::new(ErrorKind::Crypto, "to generate signing key"))?;

    let pkcs8 = KeyMaterial::new(Zeroizing::new(pkcs8.as_ref().to_vec()));

    let key = EcdsaKeyPair::from_pkcs8(alg(), pkcs8.expose()).map_err(|err| {
        error!(error = %err, "couldn't parse signing key");

        Error::new(ErrorKind::Crypto, "to parse signing key")
    })?;

    Ok((key, pkcs8))
}

impl KeyCertService for SoftwareKeyCert {
    fn generate_key(&mut self, len: usize) -> Result<KeyMaterial, Error> {
        let mut key = Zeroizing::new(vec![0u8; len]);

        self.rng
            .fill(key.as_mut_slice())
            .map_err(|_| Error::new(ErrorKind::Crypto, "to generate key"))?;

        Ok(KeyMaterial::new(key))
    }

    #[instrument(skip(self, session))]
    fn derive_shared_secret(
        &mut self,
        session: &SecureSession,
        oxm: Oxm,
        requester: &Uuid,
        target: &Uuid,
        len: usize,
    ) -> Result<KeyMaterial, Error> {
        if session.peer != *target {
            error!(peer = %session.peer, "session peer doesn't match the target");

            return Err(Error::new(ErrorKind::Validation, "session peer"));
        }

        let mut context = [0u8; 32];
        let (req, tgt) = context.split_at_mut(16);
        req.copy_from_slice(requester.as_bytes());
        tgt.copy_from_slice(target.as_bytes());

        kdf::kdf_ctr_hmac_sha256(
            session.exporter.expose(),
            oxm.label().as_bytes(),
            &context,
            len,
        )
    }

    #[instrument(skip(self))]
    async fn issue_certificate(&mut self, subject: &Uuid) -> Result<IssuedCertificate, Error> {
        let (leaf_key, private_key) = generate_key_pair(&self.rng)?;

        let mut serial = [0u8; SERIAL_LEN];
        self.rng
            .fill(&mut serial)
            .map_err(|_| Error::new(ErrorKind::Crypto, "to generate serial number"))?;
        // positive
        serial[0] &= 0x7f;

        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(|err| {
            error!(error = %err, "couldn't create certificate parameters");

            Error::new(ErrorKind::Crypto, "to create certificate parameters")
        })?;
        params
            .distinguished_name
            .push(DnType::CommonName, subject.to_string());
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyAgreement,
        ];
        params.serial_number = Some(SerialNumber::from_slice(&serial));

        let issuer = Issuer::new(
            self.ca_params.clone(),
            RcgenKeyCompat::new(&self.ca_key, &self.rng),
        );

        let leaf = params
            .signed_by(&RcgenKeyCompat::new(&leaf_key, &self.rng), &issuer)
            .map_err(|err| {
                error!(error = %err, "couldn't sign leaf certificate");

                Error::new(ErrorKind::Crypto, "to sign leaf certificate")
            })?;

        debug!(serial = %Hex::new(&serial), "certificate issued");

        Ok(IssuedCertificate {
            chain: vec![leaf.der().to_vec(), self.ca_der.clone()],
            private_key,
        })
    }
}

struct RcgenKeyCompat<'a> {
    keys: &'a EcdsaKeyPair,
    rand: &'a SystemRandom,
}

impl<'a> RcgenKeyCompat<'a> {
    fn new(keys: &'a EcdsaKeyPair, rand: &'a SystemRandom) -> Self {
        Self { keys, rand }
    }
}

impl rcgen::PublicKeyData for RcgenKeyCompat<'_> {
    fn der_bytes(&self) -> &[u8] {
        self.keys.public_key().as_ref()
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        &rcgen::PKCS_ECDSA_P256_SHA256
    }
}

impl rcgen::SigningKey for RcgenKeyCompat<'_> {
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        self.keys
            .sign(self.rand, msg)
            .map(|signature| signature.as_ref().to_vec())
            .map_err(|_| rcgen::Error::RingUnspecified)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};
    use x509_parser::prelude::{FromDer, X509Certificate};

    use super::*;
    use crate::transport::CipherSuite;

    fn common_name(name: &x509_parser::x509::X509Name<'_>) -> String {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap()
            .to_string()
    }

    #[test]
    fn generate_random_keys() {
        let mut keys = SoftwareKeyCert::new().unwrap();

        let a = keys.generate_key(16).unwrap();
        let b = keys.generate_key(16).unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(keys.generate_key(32).unwrap().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn derive_shared_secret_binds_identities() {
        let mut keys = SoftwareKeyCert::new().unwrap();
        let owner = Uuid::from_u128(1);
        let device = Uuid::from_u128(2);

        let session = SecureSession {
            peer: device,
            cipher: CipherSuite::EcdhAnonAes128CbcSha256,
            exporter: KeyMaterial::from(vec![7; 48]),
        };

        let psk = keys
            .derive_shared_secret(&session, Oxm::JustWorks, &owner, &device, 16)
            .unwrap();
        let again = keys
            .derive_shared_secret(&session, Oxm::JustWorks, &owner, &device, 16)
            .unwrap();
        let other_oxm = keys
            .derive_shared_secret(&session, Oxm::RandomDevicePin, &owner, &device, 16)
            .unwrap();

        assert_eq!(psk.len(), 16);
        assert_eq!(psk, again);
        assert_ne!(psk, other_oxm);

        let err = keys
            .derive_shared_secret(&session, Oxm::JustWorks, &device, &owner, 16)
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn issue_leaf_certificate() {
        let mut keys = SoftwareKeyCert::with_ca_name("test CA").unwrap();
        let subject = Uuid::from_u128(0x43bc9e0f_731a_4e7f_947c_5d03b0c1e483);

        let issued = keys.issue_certificate(&subject).await.unwrap();

        assert_eq!(issued.chain.len(), 2);
        assert_eq!(issued.chain[1], keys.ca_certificate());

        let (_, leaf) = X509Certificate::from_der(&issued.chain[0]).unwrap();
        let (_, ca) = X509Certificate::from_der(&issued.chain[1]).unwrap();

        assert_eq!(common_name(leaf.subject()), subject.to_string());
        assert_eq!(common_name(leaf.issuer()), "test CA");
        assert_eq!(common_name(ca.subject()), "test CA");

        EcdsaKeyPair::from_pkcs8(alg(), issued.private_key.expose()).unwrap();
    }
}
