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

//! Devices found on the network.

use std::fmt::Display;
use std::net::{IpAddr, Ipv6Addr};

use iotsec_provisioning_protocol::oic::doxm::Doxm;
use iotsec_provisioning_protocol::oic::pstat::Pstat;
use uuid::Uuid;

/// Default port of the secure endpoint.
pub const DEFAULT_SECURE_PORT: u16 = 5684;

/// Address of a device, per connectivity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IPv4 or IPv6 address.
    Ip(IpAddr),
    /// Bluetooth LE GATT address.
    Gatt(String),
    /// Bluetooth EDR RFCOMM address.
    Rfcomm(String),
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Ip(IpAddr::V4(ip)) => write!(f, "{ip}"),
            Address::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]"),
            Address::Gatt(addr) => write!(f, "gatt:{addr}"),
            Address::Rfcomm(addr) => write!(f, "rfcomm:{addr}"),
        }
    }
}

/// Unsecured endpoint of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Address of the device.
    pub address: Address,
    /// Port of the unsecured endpoint.
    pub port: u16,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Reachability of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Answered the last discovery.
    #[default]
    On,
    /// Known but not seen on the network.
    Off,
}

/// A device and the security state it advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Unsecured endpoint.
    pub endpoint: Endpoint,
    /// Port of the secure endpoint.
    pub secure_port: u16,
    /// Ownership snapshot.
    pub doxm: Doxm,
    /// Provisioning status snapshot, fetched during the ownership transfer.
    pub pstat: Option<Pstat>,
    /// Reachability.
    pub status: DeviceStatus,
}

impl Device {
    /// Creates a reachable device with the default secure port.
    pub fn new(endpoint: Endpoint, doxm: Doxm) -> Self {
        Self {
            endpoint,
            secure_port: DEFAULT_SECURE_PORT,
            doxm,
            pstat: None,
            status: DeviceStatus::On,
        }
    }

    /// Device recorded as owned but not seen on the network.
    ///
    /// The endpoint is unknown, so it's left unspecified.
    pub fn offline(uuid: Uuid, owner: Uuid) -> Self {
        let endpoint = Endpoint {
            address: Address::Ip(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            port: 0,
        };

        Self {
            endpoint,
            secure_port: 0,
            doxm: Doxm::unowned(uuid, Vec::new()).owned_by(owner),
            pstat: None,
            status: DeviceStatus::Off,
        }
    }

    /// Sets the secure port.
    pub fn with_secure_port(mut self, port: u16) -> Self {
        self.secure_port = port;

        self
    }

    /// Identifier of the device.
    pub fn uuid(&self) -> &Uuid {
        &self.doxm.device_uuid
    }

    /// Whether the device advertised an owner.
    pub fn is_owned(&self) -> bool {
        self.doxm.owned
    }
}

/// Owned and unowned devices, as seen on the network and in the link store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInventory {
    /// Owned devices, including the ones not reachable.
    pub owned: Vec<Device>,
    /// Devices waiting for an owner.
    pub unowned: Vec<Device>,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn endpoint_display() {
        let v4 = Endpoint {
            address: Address::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            port: 5683,
        };
        let v6 = Endpoint {
            address: Address::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            port: 5683,
        };
        let gatt = Endpoint {
            address: Address::Gatt("00:11:22:33:44:55".to_string()),
            port: 0,
        };

        insta::assert_snapshot!(format!("{v4}\n{v6}\n{gatt}"), @r"
        10.0.0.1:5683
        [::1]:5683
        gatt:00:11:22:33:44:55:0
        ");
    }
}
