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

//! Ownership transfer methods (OxM).

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::ErrorKind;

/// Trust bootstrap scheme used to take ownership of an unowned device.
///
/// The numeric value is the identifier advertised by the device in the `oxms` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Oxm {
    /// Anonymous key agreement, no prior secret.
    JustWorks = 0,
    /// PIN shown by the device and entered by the operator.
    RandomDevicePin = 1,
    /// Certificate installed by the manufacturer.
    ManufacturerCertificate = 2,
}

impl Oxm {
    /// All the known methods.
    pub const ALL: [Oxm; 3] = [
        Oxm::JustWorks,
        Oxm::RandomDevicePin,
        Oxm::ManufacturerCertificate,
    ];

    /// Label of the method.
    ///
    /// It's used as the KDF label when deriving the owner PSK.
    pub const fn label(&self) -> &'static str {
        match self {
            Oxm::JustWorks => "oic.sec.doxm.jw",
            Oxm::RandomDevicePin => "oic.sec.doxm.rdp",
            Oxm::ManufacturerCertificate => "oic.sec.doxm.mfgcert",
        }
    }
}

impl Display for Oxm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Oxm> for u8 {
    fn from(value: Oxm) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Oxm {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Oxm::JustWorks),
            1 => Ok(Oxm::RandomDevicePin),
            2 => Ok(Oxm::ManufacturerCertificate),
            _ => Err(Error::new(ErrorKind::Decode, "unknown ownership transfer method")),
        }
    }
}
