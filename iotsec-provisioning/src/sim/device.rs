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

//! Security resources served by a simulated device.

use std::collections::BTreeMap;
use std::net::IpAddr;

use iotsec_provisioning_protocol::oic::acl::Acl;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::crl::Crl;
use iotsec_provisioning_protocol::oic::doxm::Doxm;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use iotsec_provisioning_protocol::oic::pstat::{OperationMode, Pstat, ProvisioningMode};
use iotsec_provisioning_protocol::oic::{
    ACL_URI, CRED_URI, CRL_URI, DOXM_URI, PSTAT_URI, Resource,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::device::{Address, DEFAULT_SECURE_PORT, Device, Endpoint};
use crate::oxm::random_pin::PIN_LEN;
use crate::transport::query::credential_subject;
use crate::transport::{CipherSuite, Method, Request, Response, ResponseCode};

/// Unsecured port of every simulated device.
pub const SIM_PORT: u16 = 5683;

/// State of a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDevice {
    /// Address of the device.
    pub address: IpAddr,
    /// Secure port of the device.
    pub secure_port: u16,
    /// Ownership state.
    pub doxm: Doxm,
    /// Provisioning state.
    pub pstat: Pstat,
    /// Installed access control entries.
    pub acls: Vec<Acl>,
    /// Installed credentials, by subject.
    pub credentials: BTreeMap<Uuid, Credential>,
    /// Installed revocation list.
    pub crl: Option<Crl>,
    /// PIN currently shown, for the random PIN method.
    pub pin: Option<String>,
    /// Cipher of the active secure session.
    pub session: Option<CipherSuite>,
    /// Whether the device answers.
    pub reachable: bool,
    /// Whether the device refuses every handshake.
    pub refuse_sessions: bool,
}

impl SimDevice {
    pub(crate) fn unowned(uuid: Uuid, address: IpAddr, oxms: Vec<Oxm>) -> Self {
        Self {
            address,
            secure_port: DEFAULT_SECURE_PORT,
            doxm: Doxm::unowned(uuid, oxms),
            pstat: Pstat {
                is_op: false,
                cm: ProvisioningMode::TAKE_OWNER,
                tm: ProvisioningMode::TAKE_OWNER,
                om: OperationMode::SingleServiceServerDriven,
                sm: vec![
                    OperationMode::SingleServiceServerDriven,
                    OperationMode::SingleServiceClientDriven,
                ],
                commit_hash: 0,
                device_uuid: uuid,
            },
            acls: Vec::new(),
            credentials: BTreeMap::new(),
            crl: None,
            pin: None,
            session: None,
            reachable: true,
            refuse_sessions: false,
        }
    }

    /// Identifier of the device.
    pub fn uuid(&self) -> &Uuid {
        &self.doxm.device_uuid
    }

    /// Device as returned by a discovery.
    pub fn snapshot(&self) -> Device {
        Device::new(
            Endpoint {
                address: Address::Ip(self.address),
                port: SIM_PORT,
            },
            self.doxm.clone(),
        )
        .with_secure_port(self.secure_port)
    }

    /// Serves the request.
    pub(crate) fn handle(&mut self, request: &Request, secure: bool) -> Response {
        if secure && self.session.is_none() && !self.doxm.owned {
            warn!(device = %self.uuid(), "secure request without session");

            return Response::new(ResponseCode::Unauthorized);
        }

        match (request.method, request.url.path()) {
            (Method::Get, DOXM_URI) => ok_with(&self.doxm),
            (Method::Put, DOXM_URI) => self.put_doxm(request, secure),
            (Method::Get, PSTAT_URI) => ok_with(&self.pstat),
            (Method::Put, PSTAT_URI) => self.put_pstat(request, secure),
            (_, ACL_URI | CRED_URI | CRL_URI) if !secure => {
                Response::new(ResponseCode::Unauthorized)
            }
            (Method::Post, ACL_URI) => match Acl::decode(&request.payload) {
                Ok(acl) => {
                    self.acls.push(acl);

                    Response::new(ResponseCode::Created)
                }
                Err(_) => Response::new(ResponseCode::BadRequest),
            },
            (Method::Post, CRED_URI) => match Credential::decode(&request.payload) {
                Ok(cred) => {
                    self.credentials.insert(cred.subject, cred);

                    Response::new(ResponseCode::Created)
                }
                Err(_) => Response::new(ResponseCode::BadRequest),
            },
            (Method::Delete, CRED_URI) => {
                let Some(subject) = credential_subject(&request.url) else {
                    return Response::new(ResponseCode::BadRequest);
                };

                match self.credentials.remove(&subject) {
                    Some(_) => Response::new(ResponseCode::Deleted),
                    None => Response::new(ResponseCode::NotFound),
                }
            }
            (Method::Post, CRL_URI) => match Crl::decode(&request.payload) {
                Ok(crl) => {
                    self.crl = Some(crl);

                    Response::new(ResponseCode::Created)
                }
                Err(_) => Response::new(ResponseCode::BadRequest),
            },
            (Method::Get | Method::Put | Method::Post | Method::Delete, _) => {
                Response::new(ResponseCode::NotFound)
            }
        }
    }

    fn put_doxm(&mut self, request: &Request, secure: bool) -> Response {
        let Ok(doxm) = Doxm::decode(&request.payload) else {
            return Response::new(ResponseCode::BadRequest);
        };

        if self.doxm.owned || doxm.device_uuid != *self.uuid() {
            return Response::new(ResponseCode::NotAllowed);
        }

        if doxm.owned {
            let Some(owner) = doxm.owner_uuid.filter(|_| secure) else {
                return Response::new(ResponseCode::Unauthorized);
            };

            self.doxm = self.doxm.owned_by(owner);
            self.pin = None;

            debug!(device = %self.uuid(), %owner, "owned");

            return Response::new(ResponseCode::Ok);
        }

        let Some(oxm) = doxm.oxm_sel.filter(|oxm| self.doxm.supports(*oxm)) else {
            return Response::new(ResponseCode::BadRequest);
        };

        self.doxm = self.doxm.with_selected(oxm);

        if oxm == Oxm::RandomDevicePin {
            let max = 10u32.pow(PIN_LEN as u32);
            let pin = format!("{:0width$}", rand::random_range(0..max), width = PIN_LEN);

            debug!(device = %self.uuid(), "showing PIN");

            self.pin = Some(pin);
        }

        Response::new(ResponseCode::Ok)
    }

    fn put_pstat(&mut self, request: &Request, secure: bool) -> Response {
        let Ok(pstat) = Pstat::decode(&request.payload) else {
            return Response::new(ResponseCode::BadRequest);
        };

        if !self.pstat.sm.contains(&pstat.om) {
            return Response::new(ResponseCode::BadRequest);
        }

        self.pstat.om = pstat.om;

        if secure {
            self.pstat.is_op = pstat.is_op;
            self.pstat.tm = pstat.tm;
            self.pstat.commit_hash = pstat.commit_hash;

            if pstat.is_op {
                self.pstat.cm = ProvisioningMode::NORMAL;
            }
        }

        Response::new(ResponseCode::Ok)
    }
}

fn ok_with<R>(document: &R) -> Response
where
    R: Resource,
{
    match document.encode() {
        Ok(payload) => Response {
            code: ResponseCode::Ok,
            payload,
        },
        Err(_) => Response::new(ResponseCode::InternalError),
    }
}
