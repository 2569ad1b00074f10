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

//! Just works method, anonymous ECDH without any prior secret.

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::oxm::Oxm;

use super::OxmHooks;
use crate::device::Device;
use crate::transport::{CipherSuite, SessionParams};

/// Just works ownership transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JustWorks;

impl OxmHooks for JustWorks {
    fn oxm(&self) -> Oxm {
        Oxm::JustWorks
    }

    fn create_secure_session(
        &self,
        _device: &Device,
        _secret: Option<&Credential>,
    ) -> Result<SessionParams, Error> {
        Ok(SessionParams::new(CipherSuite::EcdhAnonAes128CbcSha256))
    }
}
