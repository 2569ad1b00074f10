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

//! Random PIN method.
//!
//! The device shows a random PIN once the method is selected, the PSK of the session is derived
//! from it.

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use tracing::{debug, error};
use uuid::Uuid;

use super::OxmHooks;
use crate::device::Device;
use crate::keycert::kdf;
use crate::transport::{CipherSuite, SessionParams};

/// Number of digits of the PIN.
pub const PIN_LEN: usize = 8;

/// Asks for the PIN shown by a device.
pub trait PinProvider: Send + Sync {
    /// Returns the PIN shown by the device.
    fn pin(&self, device: &Uuid) -> Result<String, Error>;
}

impl<F> PinProvider for F
where
    F: Fn(&Uuid) -> Result<String, Error> + Send + Sync,
{
    fn pin(&self, device: &Uuid) -> Result<String, Error> {
        (self)(device)
    }
}

/// Random PIN ownership transfer.
pub struct RandomPin<P> {
    pins: P,
}

impl<P> RandomPin<P> {
    /// Creates the hooks asking the PINs to the provider.
    pub fn new(pins: P) -> Self {
        Self { pins }
    }
}

impl<P> std::fmt::Debug for RandomPin<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPin").finish_non_exhaustive()
    }
}

fn check_pin(pin: &str) -> Result<(), Error> {
    if pin.len() != PIN_LEN || !pin.bytes().all(|b| b.is_ascii_digit()) {
        error!(len = pin.len(), "invalid PIN");

        return Err(Error::new(ErrorKind::Validation, "invalid PIN"));
    }

    Ok(())
}

impl<P> OxmHooks for RandomPin<P>
where
    P: PinProvider,
{
    fn oxm(&self) -> Oxm {
        Oxm::RandomDevicePin
    }

    fn load_secret(&self, device: &Device, owner: &Uuid) -> Result<Option<Credential>, Error> {
        let pin = self.pins.pin(device.uuid())?;

        check_pin(&pin)?;

        let psk = kdf::pin_psk(&pin, device.uuid())?;

        debug!(device = %device.uuid(), "temporary PSK derived from PIN");

        Ok(Some(Credential::symmetric(*device.uuid(), psk, *owner)))
    }

    fn create_secure_session(
        &self,
        device: &Device,
        secret: Option<&Credential>,
    ) -> Result<SessionParams, Error> {
        let secret = secret.ok_or_else(|| {
            error!(device = %device.uuid(), "missing temporary PSK");

            Error::new(ErrorKind::Validation, "missing temporary PSK")
        })?;

        Ok(SessionParams::with_psk(
            CipherSuite::EcdhePskAes128CbcSha256,
            secret.subject,
            secret.private_data.clone(),
        ))
    }
}
