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

#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

//! Ownership transfer and pairwise credential provisioning of IoT devices.

pub mod config;
pub mod credential_store;
pub mod device;
pub mod keycert;
pub mod link_store;
pub mod oxm;
pub mod results;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transport;

pub mod otm;
pub mod pairwise;
pub mod provisioning;
pub mod unlink;

pub use iotsec_provisioning_protocol;
pub use url;

pub use self::config::ProvisioningConfig;
pub use self::credential_store::{CredentialStore, FileCredentialStore};
pub use self::keycert::KeyCertService;
pub use self::link_store::LinkStore;
pub use self::oxm::OxmRegistry;
pub use self::pairwise::CredentialKind;
pub use self::provisioning::Provisioning;
pub use self::results::{BatchResult, ProvisionResult, ResultCode};
pub use self::transport::Transport;
pub use self::unlink::RemoveStatus;

/// Collaborators shared by the provisioning operations.
#[derive(Debug)]
pub struct Ctx<'a, T, K, S> {
    transport: &'a mut T,
    keys: &'a mut K,
    links: &'a LinkStore,
    creds: &'a S,
    config: &'a ProvisioningConfig,
    registry: &'a OxmRegistry,
}

impl<'a, T, K, S> Ctx<'a, T, K, S> {
    /// Creates a new context.
    pub fn new(
        transport: &'a mut T,
        keys: &'a mut K,
        links: &'a LinkStore,
        creds: &'a S,
        config: &'a ProvisioningConfig,
        registry: &'a OxmRegistry,
    ) -> Self
    where
        T: Transport,
        K: KeyCertService,
        S: CredentialStore,
    {
        Self {
            transport,
            keys,
            links,
            creds,
            config,
            registry,
        }
    }

    /// Returns the link store.
    pub fn links(&self) -> &LinkStore {
        self.links
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProvisioningConfig {
        self.config
    }
}
