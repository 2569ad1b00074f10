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

//! Provisioning status resource (`/oic/sec/pstat`).

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PSTAT_URI, Resource};
use crate::Error;
use crate::error::ErrorKind;

/// Who drives provisioning and how many services manage the device.
///
/// The ordering follows the numeric identifier, lists of modes are compared in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum OperationMode {
    /// Multiple services, the device drives provisioning.
    MultipleServiceServerDriven = 0,
    /// Single service, the device drives provisioning.
    SingleServiceServerDriven = 1,
    /// Multiple services, the provisioning tool drives provisioning.
    MultipleServiceClientDriven = 2,
    /// Single service, the provisioning tool drives provisioning.
    SingleServiceClientDriven = 3,
}

impl From<OperationMode> for u8 {
    fn from(value: OperationMode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OperationMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OperationMode::MultipleServiceServerDriven),
            1 => Ok(OperationMode::SingleServiceServerDriven),
            2 => Ok(OperationMode::MultipleServiceClientDriven),
            3 => Ok(OperationMode::SingleServiceClientDriven),
            _ => Err(Error::new(ErrorKind::Decode, "unknown operation mode")),
        }
    }
}

/// Provisioning state flags of the device lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisioningMode(u16);

impl ProvisioningMode {
    /// Device in normal operation.
    pub const NORMAL: Self = Self(0);
    /// Device being reset.
    pub const RESET: Self = Self(1 << 0);
    /// Device waiting for an owner.
    pub const TAKE_OWNER: Self = Self(1 << 1);
    /// Bootstrap service needed.
    pub const BOOTSTRAP_SERVICE: Self = Self(1 << 2);
    /// Security management services needed.
    pub const SECURITY_MANAGEMENT_SERVICES: Self = Self(1 << 3);
    /// Credentials need to be provisioned.
    pub const PROVISION_CREDENTIALS: Self = Self(1 << 4);
    /// Access control lists need to be provisioned.
    pub const PROVISION_ACLS: Self = Self(1 << 5);

    /// Raw value of the flags.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Checks if all the flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of the two flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Display for ProvisioningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Provisioning status of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pstat {
    /// Whether the device is operational.
    #[serde(rename = "isop")]
    pub is_op: bool,
    /// Current mode.
    pub cm: ProvisioningMode,
    /// Target mode requested by the provisioning tool.
    pub tm: ProvisioningMode,
    /// Operation mode in use.
    pub om: OperationMode,
    /// Operation modes supported by the device.
    pub sm: Vec<OperationMode>,
    /// Commit hash of the provisioned state.
    #[serde(rename = "ch")]
    pub commit_hash: u16,
    /// Identifier of the device.
    #[serde(rename = "deviceuuid")]
    pub device_uuid: Uuid,
}

impl Pstat {
    /// Copy of the status with the operation mode changed.
    pub fn with_operation_mode(&self, om: OperationMode) -> Self {
        Self {
            om,
            ..self.clone()
        }
    }

    /// Copy of the status that moves the device to normal operation.
    pub fn finalized(&self) -> Self {
        Self {
            is_op: true,
            tm: ProvisioningMode::NORMAL,
            commit_hash: 0,
            ..self.clone()
        }
    }
}

impl Resource for Pstat {
    const URI: &'static str = PSTAT_URI;
    const NAME: &'static str = "pstat";
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::oic::tests::create_uuid;

    fn unowned_pstat() -> Pstat {
        Pstat {
            is_op: false,
            cm: ProvisioningMode::TAKE_OWNER.union(ProvisioningMode::PROVISION_CREDENTIALS),
            tm: ProvisioningMode::TAKE_OWNER,
            om: OperationMode::SingleServiceServerDriven,
            sm: vec![
                OperationMode::SingleServiceServerDriven,
                OperationMode::SingleServiceClientDriven,
            ],
            commit_hash: 42,
            device_uuid: create_uuid(),
        }
    }

    #[test]
    fn finalize_moves_to_normal() {
        let pstat = unowned_pstat();

        let finalized = pstat
            .with_operation_mode(OperationMode::SingleServiceClientDriven)
            .finalized();

        assert!(finalized.is_op);
        assert_eq!(finalized.tm, ProvisioningMode::NORMAL);
        assert_eq!(finalized.commit_hash, 0);
        assert_eq!(finalized.om, OperationMode::SingleServiceClientDriven);
        assert_eq!(finalized.cm, pstat.cm);
    }

    #[test]
    fn provisioning_mode_flags() {
        let mode = ProvisioningMode::TAKE_OWNER.union(ProvisioningMode::PROVISION_ACLS);

        assert!(mode.contains(ProvisioningMode::TAKE_OWNER));
        assert!(!mode.contains(ProvisioningMode::RESET));
        assert!(mode.contains(ProvisioningMode::NORMAL));

        insta::assert_snapshot!(mode, @"0x0022");
    }

    #[test]
    fn operation_modes_are_ordered() {
        let mut modes = vec![
            OperationMode::SingleServiceClientDriven,
            OperationMode::MultipleServiceServerDriven,
            OperationMode::MultipleServiceClientDriven,
        ];
        modes.sort();

        assert_eq!(
            modes,
            [
                OperationMode::MultipleServiceServerDriven,
                OperationMode::MultipleServiceClientDriven,
                OperationMode::SingleServiceClientDriven,
            ]
        );
    }

    #[test]
    fn pstat_document() {
        let pstat = unowned_pstat();

        let buf = pstat.encode().unwrap();
        let res = Pstat::decode(&buf).unwrap();

        assert_eq!(res, pstat);
    }
}
