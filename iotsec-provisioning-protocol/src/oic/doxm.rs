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

//! Device ownership transfer resource (`/oic/sec/doxm`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::oxm::Oxm;
use super::{DOXM_URI, Resource};

/// Ownership state of a device.
///
/// ```cddl
/// Doxm = {
///     oxms: [* uint],
///     ? oxmsel: uint,
///     owned: bool,
///     deviceuuid: bstr .size 16,
///     ? devowneruuid: bstr .size 16,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doxm {
    /// Ownership transfer methods supported by the device.
    pub oxms: Vec<Oxm>,
    /// Method selected by the provisioning tool.
    #[serde(rename = "oxmsel", default, skip_serializing_if = "Option::is_none")]
    pub oxm_sel: Option<Oxm>,
    /// Whether the device already has an owner.
    pub owned: bool,
    /// Identifier of the device.
    #[serde(rename = "deviceuuid")]
    pub device_uuid: Uuid,
    /// Identifier of the owner, once owned.
    #[serde(
        rename = "devowneruuid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_uuid: Option<Uuid>,
}

impl Doxm {
    /// Document of a device still waiting for an owner.
    pub fn unowned(device_uuid: Uuid, oxms: Vec<Oxm>) -> Self {
        Self {
            oxms,
            oxm_sel: None,
            owned: false,
            device_uuid,
            owner_uuid: None,
        }
    }

    /// Copy of the document with the selected method set.
    pub fn with_selected(&self, oxm: Oxm) -> Self {
        Self {
            oxm_sel: Some(oxm),
            ..self.clone()
        }
    }

    /// Copy of the document marked as owned by the given owner.
    pub fn owned_by(&self, owner: Uuid) -> Self {
        Self {
            owned: true,
            owner_uuid: Some(owner),
            ..self.clone()
        }
    }

    /// Checks if the device supports the method.
    pub fn supports(&self, oxm: Oxm) -> bool {
        self.oxms.contains(&oxm)
    }
}

impl Resource for Doxm {
    const URI: &'static str = DOXM_URI;
    const NAME: &'static str = "doxm";
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::oic::tests::{create_owner, create_uuid};

    #[test]
    fn take_ownership_documents() {
        let doxm = Doxm::unowned(create_uuid(), vec![Oxm::JustWorks, Oxm::RandomDevicePin]);

        let select = doxm.with_selected(Oxm::RandomDevicePin);
        assert_eq!(select.oxm_sel, Some(Oxm::RandomDevicePin));
        assert!(!select.owned);

        let owned = select.owned_by(create_owner());
        assert!(owned.owned);
        assert_eq!(owned.owner_uuid, Some(create_owner()));
        assert_eq!(owned.oxm_sel, Some(Oxm::RandomDevicePin));
        assert_eq!(owned.device_uuid, create_uuid());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let doxm = Doxm::unowned(create_uuid(), vec![Oxm::JustWorks]);

        let buf = doxm.encode().unwrap();
        let value: ciborium::Value = ciborium::from_reader(buf.as_slice()).unwrap();

        let keys: Vec<String> = value
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_text().map(str::to_string))
            .collect();

        assert_eq!(keys, ["oxms", "owned", "deviceuuid"]);

        let res = Doxm::decode(&buf).unwrap();
        assert_eq!(res, doxm);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let value = ciborium::Value::Map(vec![
            ("oxms".into(), ciborium::Value::Array(vec![9.into()])),
            ("owned".into(), false.into()),
            (
                "deviceuuid".into(),
                ciborium::Value::Bytes(create_uuid().as_bytes().to_vec()),
            ),
        ]);
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).unwrap();

        assert!(Doxm::decode(&buf).is_err());
    }
}
