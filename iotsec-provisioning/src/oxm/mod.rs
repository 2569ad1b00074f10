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

//! Pluggable ownership transfer methods.

use std::collections::HashMap;
use std::fmt::Debug;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::doxm::Doxm;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use tracing::debug;
use uuid::Uuid;

use crate::device::Device;
use crate::transport::SessionParams;

pub mod certificate;
pub mod just_works;
pub mod random_pin;

pub use self::certificate::ManufacturerCertificate;
pub use self::just_works::JustWorks;
pub use self::random_pin::{PinProvider, RandomPin};

/// Method specific steps of the ownership transfer.
pub trait OxmHooks: Send + Sync {
    /// Method implemented by the hooks.
    fn oxm(&self) -> Oxm;

    /// Loads the temporary secret used to authenticate the secure session, if the method has one.
    ///
    /// The secret is stored as a local credential until the device confirms the ownership.
    fn load_secret(&self, device: &Device, owner: &Uuid) -> Result<Option<Credential>, Error> {
        let _ = (device, owner);

        Ok(None)
    }

    /// Parameters of the secure session with the device.
    fn create_secure_session(
        &self,
        device: &Device,
        secret: Option<&Credential>,
    ) -> Result<SessionParams, Error>;

    /// Document announcing the selected method.
    fn build_select_payload(&self, device: &Device) -> Result<Doxm, Error> {
        Ok(device.doxm.with_selected(self.oxm()))
    }

    /// Document announcing the new owner.
    fn build_ownership_payload(&self, device: &Device, owner: &Uuid) -> Result<Doxm, Error> {
        Ok(device.doxm.with_selected(self.oxm()).owned_by(*owner))
    }
}

/// Registered ownership transfer methods.
#[derive(Default)]
pub struct OxmRegistry {
    hooks: HashMap<Oxm, Box<dyn OxmHooks>>,
}

impl OxmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in methods.
    ///
    /// The PIN provider is asked for the PIN shown by the devices using the random PIN method.
    pub fn with_defaults<P>(pins: P) -> Self
    where
        P: PinProvider + 'static,
    {
        Self::new()
            .with(JustWorks)
            .with(RandomPin::new(pins))
            .with(ManufacturerCertificate)
    }

    /// Registers the hooks, replacing the previous ones for the same method.
    pub fn with<H>(mut self, hooks: H) -> Self
    where
        H: OxmHooks + 'static,
    {
        self.register(Box::new(hooks));

        self
    }

    /// Registers the hooks, replacing the previous ones for the same method.
    pub fn register(&mut self, hooks: Box<dyn OxmHooks>) {
        let oxm = hooks.oxm();

        debug!(%oxm, "registering ownership transfer method");

        self.hooks.insert(oxm, hooks);
    }

    /// Hooks of the method.
    pub fn get(&self, oxm: Oxm) -> Option<&dyn OxmHooks> {
        self.hooks.get(&oxm).map(|hooks| hooks.as_ref())
    }

    /// Checks if the method is registered.
    pub fn contains(&self, oxm: Oxm) -> bool {
        self.hooks.contains_key(&oxm)
    }

    /// Picks the most preferred method both advertised by the device and registered.
    pub fn select(&self, preference: &[Oxm], device: &Device) -> Option<Oxm> {
        preference
            .iter()
            .copied()
            .find(|oxm| device.doxm.supports(*oxm) && self.contains(*oxm))
    }
}

impl Debug for OxmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.hooks.keys().collect();
        methods.sort();

        f.debug_struct("OxmRegistry")
            .field("methods", &methods)
            .finish()
    }
}
