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

//! Configuration of the provisioning tool.

use std::time::Duration;

use iotsec_provisioning_protocol::oic::oxm::Oxm;
use iotsec_provisioning_protocol::oic::pstat::OperationMode;
use uuid::Uuid;

/// Default length of the owner PSK in bytes.
pub const DEFAULT_OWNER_PSK_LEN: usize = 16;

/// Default wait time for the discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables of the provisioning tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    owner: Uuid,
    method_preference: Vec<Oxm>,
    operation_modes: Vec<OperationMode>,
    owner_psk_len: usize,
    discovery_timeout: Duration,
}

impl ProvisioningConfig {
    /// Creates the configuration for the given provisioning tool identity.
    pub fn new(owner: Uuid) -> Self {
        Self {
            owner,
            method_preference: vec![
                Oxm::ManufacturerCertificate,
                Oxm::RandomDevicePin,
                Oxm::JustWorks,
            ],
            operation_modes: vec![OperationMode::SingleServiceClientDriven],
            owner_psk_len: DEFAULT_OWNER_PSK_LEN,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Sets the ownership transfer methods to use, most preferred first.
    pub fn with_method_preference(mut self, methods: Vec<Oxm>) -> Self {
        self.method_preference = methods;

        self
    }

    /// Sets the operation modes supported locally.
    pub fn with_operation_modes(mut self, modes: Vec<OperationMode>) -> Self {
        self.operation_modes = modes;

        self
    }

    /// Sets the length of the owner PSK in bytes.
    pub fn with_owner_psk_len(mut self, len: usize) -> Self {
        self.owner_psk_len = len;

        self
    }

    /// Sets the default discovery timeout.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;

        self
    }

    /// Identity of the provisioning tool.
    pub fn owner(&self) -> &Uuid {
        &self.owner
    }

    /// Ownership transfer methods, most preferred first.
    pub fn method_preference(&self) -> &[Oxm] {
        &self.method_preference
    }

    /// Operation modes supported locally.
    pub fn operation_modes(&self) -> &[OperationMode] {
        &self.operation_modes
    }

    /// Length of the owner PSK in bytes.
    pub fn owner_psk_len(&self) -> usize {
        self.owner_psk_len
    }

    /// Default discovery timeout.
    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let config = ProvisioningConfig::new(Uuid::nil());

        assert_eq!(
            config.method_preference(),
            [
                Oxm::ManufacturerCertificate,
                Oxm::RandomDevicePin,
                Oxm::JustWorks
            ]
        );
        assert_eq!(
            config.operation_modes(),
            [OperationMode::SingleServiceClientDriven]
        );
        assert_eq!(config.owner_psk_len(), 16);
    }

    #[test]
    fn builder() {
        let config = ProvisioningConfig::new(Uuid::nil())
            .with_method_preference(vec![Oxm::JustWorks])
            .with_owner_psk_len(32)
            .with_discovery_timeout(Duration::from_millis(10));

        assert_eq!(config.method_preference(), [Oxm::JustWorks]);
        assert_eq!(config.owner_psk_len(), 32);
        assert_eq!(config.discovery_timeout(), Duration::from_millis(10));
    }
}
