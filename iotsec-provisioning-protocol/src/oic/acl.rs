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

//! Access control list resource (`/oic/sec/acl`).

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ACL_URI, Resource};

/// Wildcard matching every resource of the device.
pub const ALL_RESOURCES: &str = "*";

/// CRUDN permission bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u16);

impl Permission {
    /// Create a resource.
    pub const CREATE: Self = Self(1 << 0);
    /// Read a resource.
    pub const READ: Self = Self(1 << 1);
    /// Update a resource.
    pub const UPDATE: Self = Self(1 << 2);
    /// Delete a resource.
    pub const DELETE: Self = Self(1 << 3);
    /// Observe a resource.
    pub const NOTIFY: Self = Self(1 << 4);
    /// Every permission.
    pub const FULL: Self = Self(0x1f);

    /// Permission from the raw bits, unknown bits are dropped.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::FULL.0)
    }

    /// Raw value of the bits.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Checks if all the bits in `other` are granted.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (Self::CREATE, 'C'),
            (Self::READ, 'R'),
            (Self::UPDATE, 'U'),
            (Self::DELETE, 'D'),
            (Self::NOTIFY, 'N'),
        ];

        for (flag, c) in flags {
            if self.contains(flag) {
                write!(f, "{c}")?;
            } else {
                write!(f, "-")?;
            }
        }

        Ok(())
    }
}

/// Access granted to a subject on a set of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Device the entry applies to.
    #[serde(rename = "sub")]
    pub subject: Uuid,
    /// Resource paths, [`ALL_RESOURCES`] for every resource.
    #[serde(rename = "rsrc")]
    pub resources: Vec<String>,
    /// Granted permissions.
    #[serde(rename = "perms")]
    pub permission: Permission,
    /// Devices allowed to change this entry.
    #[serde(rename = "ownrs")]
    pub owners: Vec<Uuid>,
}

impl Acl {
    /// Entry granting every permission on every resource.
    ///
    /// Installed on a device after taking ownership, with the owner as subject.
    pub fn full_access(subject: Uuid, owner: Uuid) -> Self {
        Self {
            subject,
            resources: vec![ALL_RESOURCES.to_string()],
            permission: Permission::FULL,
            owners: vec![owner],
        }
    }

    /// Checks if the entry grants the permission on the given resource.
    pub fn allows(&self, resource: &str, permission: Permission) -> bool {
        self.permission.contains(permission)
            && self
                .resources
                .iter()
                .any(|r| r == ALL_RESOURCES || r == resource)
    }
}

impl Resource for Acl {
    const URI: &'static str = ACL_URI;
    const NAME: &'static str = "acl";
}
