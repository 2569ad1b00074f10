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

//! Simulated network of devices.
//!
//! Implements [`Transport`] in memory, so every flow can run without a CoAP and DTLS stack. The
//! network records the traffic and can inject faults per device and resource.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::cred::KeyMaterial;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use tracing::{debug, error, warn};
use url::{Host, Url};
use uuid::Uuid;

use crate::device::{Address, Device};
use crate::keycert::kdf;
use crate::oxm::PinProvider;
use crate::transport::{
    CipherSuite, DiscoveryScope, Method, Request, Response, ResponseCode, SecureSession,
    SessionParams, Transport,
};

mod device;

pub use self::device::{SIM_PORT, SimDevice};

/// Failure injected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The device answers with the given code.
    Respond(ResponseCode),
    /// The request is lost.
    Drop,
}

#[derive(Debug, Clone)]
struct FaultRule {
    device: Uuid,
    method: Method,
    uri: String,
    fault: Fault,
}

/// Traffic seen by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// Multicast discovery.
    Discover(DiscoveryScope),
    /// Request to a device resource.
    Request {
        /// Method of the request.
        method: Method,
        /// URL of the request.
        url: Url,
    },
    /// Handshake of a secure session.
    Upgrade {
        /// Peer device.
        device: Uuid,
        /// Requested cipher suite.
        cipher: CipherSuite,
    },
    /// Secure session dropped.
    Downgrade {
        /// Peer device.
        device: Uuid,
    },
}

impl Display for SimEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimEvent::Discover(scope) => write!(f, "DISCOVER {scope:?}"),
            SimEvent::Request { method, url } => write!(f, "{method} {url}"),
            SimEvent::Upgrade { device, cipher } => write!(f, "UPGRADE {device} {cipher:?}"),
            SimEvent::Downgrade { device } => write!(f, "DOWNGRADE {device}"),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimDevice>,
    faults: Vec<FaultRule>,
    events: Vec<SimEvent>,
    next_host: u8,
}

impl SimState {
    fn device_mut(&mut self, uuid: &Uuid) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|dev| dev.uuid() == uuid)
    }

    fn device_at(&mut self, ip: &IpAddr) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|dev| dev.address == *ip)
    }

    fn fault(&self, device: &Uuid, method: Method, uri: &str) -> Option<Fault> {
        self.faults
            .iter()
            .rev()
            .find(|rule| rule.device == *device && rule.method == method && rule.uri == uri)
            .map(|rule| rule.fault)
    }
}

/// In-memory network of simulated devices.
///
/// Clones share the same network.
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    state: Arc<Mutex<SimState>>,
}

impl SimNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an unowned device supporting the methods, with the next free IPv4 address.
    pub fn add_unowned(&self, uuid: Uuid, oxms: Vec<Oxm>) -> Device {
        let mut state = self.state();

        state.next_host = state.next_host.wrapping_add(1);
        let address = IpAddr::V4(Ipv4Addr::new(10, 0, 0, state.next_host));

        let device = SimDevice::unowned(uuid, address, oxms);
        let snapshot = device.snapshot();

        state.devices.push(device);

        snapshot
    }

    /// Adds an unowned device at the given address.
    pub fn add_unowned_at(&self, uuid: Uuid, oxms: Vec<Oxm>, address: IpAddr) -> Device {
        let device = SimDevice::unowned(uuid, address, oxms);
        let snapshot = device.snapshot();

        self.state().devices.push(device);

        snapshot
    }

    /// Adds a device already owned by the owner.
    pub fn add_owned(&self, uuid: Uuid, owner: Uuid) -> Device {
        let mut device = self.add_unowned(uuid, vec![Oxm::JustWorks]);

        let mut state = self.state();
        if let Some(dev) = state.device_mut(&uuid) {
            dev.doxm = dev.doxm.with_selected(Oxm::JustWorks).owned_by(owner);
            dev.pstat = dev.pstat.finalized();

            device.doxm = dev.doxm.clone();
        }

        device
    }

    /// Makes the device answer or not.
    pub fn set_reachable(&self, uuid: &Uuid, reachable: bool) {
        if let Some(dev) = self.state().device_mut(uuid) {
            dev.reachable = reachable;
        }
    }

    /// Makes the device refuse every secure session.
    pub fn refuse_sessions(&self, uuid: &Uuid) {
        if let Some(dev) = self.state().device_mut(uuid) {
            dev.refuse_sessions = true;
        }
    }

    /// Injects a fault for the requests matching device, method and resource.
    pub fn inject(&self, device: Uuid, method: Method, uri: &str, fault: Fault) {
        self.state().faults.push(FaultRule {
            device,
            method,
            uri: uri.to_string(),
            fault,
        });
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// State of the device.
    pub fn device(&self, uuid: &Uuid) -> Option<SimDevice> {
        self.state().device_mut(uuid).map(|dev| dev.clone())
    }

    /// PIN shown by the device, if any.
    pub fn pin(&self, uuid: &Uuid) -> Option<String> {
        self.state().device_mut(uuid).and_then(|dev| dev.pin.clone())
    }

    /// Reads the PINs shown by the simulated devices.
    pub fn pin_provider(&self) -> impl PinProvider + 'static {
        let network = self.clone();

        move |device: &Uuid| -> Result<String, Error> {
            network
                .pin(device)
                .ok_or(Error::new(ErrorKind::Validation, "no PIN shown"))
        }
    }

    /// Every event seen so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.state().events.clone()
    }

    /// Number of events seen so far.
    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }

    /// Events, one per line.
    pub fn event_log(&self) -> String {
        self.state()
            .events
            .iter()
            .map(|event| event.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Forgets the events seen so far.
    pub fn clear_events(&self) {
        self.state().events.clear();
    }
}

fn host_ip(url: &Url) -> Option<IpAddr> {
    match url.host()? {
        Host::Ipv4(ip) => Some(IpAddr::V4(ip)),
        Host::Ipv6(ip) => Some(IpAddr::V6(ip)),
        Host::Domain(domain) => domain.parse().ok(),
    }
}

fn device_ip(device: &Device) -> Result<IpAddr, Error> {
    match &device.endpoint.address {
        Address::Ip(ip) => Ok(*ip),
        Address::Gatt(_) | Address::Rfcomm(_) => {
            Err(Error::new(ErrorKind::Transport, "unsupported connectivity"))
        }
    }
}

fn unreachable(ctx: &'static str) -> Error {
    warn!("device unreachable: {ctx}");

    Error::new(ErrorKind::Transport, ctx)
}

impl Transport for SimNetwork {
    async fn send(&mut self, request: Request) -> Result<Response, Error> {
        let mut state = self.state();

        state.events.push(SimEvent::Request {
            method: request.method,
            url: request.url.clone(),
        });

        let ip = host_ip(&request.url).ok_or_else(|| unreachable("no route to host"))?;
        let port = request.url.port();

        let uuid = match state.device_at(&ip) {
            Some(dev) if dev.reachable => *dev.uuid(),
            Some(_) | None => return Err(unreachable("no device at address")),
        };

        let fault = state.fault(&uuid, request.method, request.url.path());

        let Some(dev) = state.device_at(&ip) else {
            return Err(unreachable("no device at address"));
        };

        let secure = match (request.url.scheme(), port) {
            ("coap", Some(SIM_PORT)) => false,
            ("coaps", Some(port)) if port == dev.secure_port => true,
            _ => return Err(unreachable("no endpoint at port")),
        };

        match fault {
            Some(Fault::Drop) => return Err(unreachable("request dropped")),
            Some(Fault::Respond(code)) => {
                debug!(device = %dev.uuid(), ?code, "injected response");

                return Ok(Response::new(code));
            }
            None => {}
        }

        Ok(dev.handle(&request, secure))
    }

    async fn upgrade_to_secure_session(
        &mut self,
        device: &Device,
        params: &SessionParams,
    ) -> Result<SecureSession, Error> {
        let ip = device_ip(device)?;

        let mut state = self.state();

        state.events.push(SimEvent::Upgrade {
            device: *device.uuid(),
            cipher: params.cipher,
        });

        let Some(dev) = state.device_at(&ip).filter(|dev| dev.reachable) else {
            return Err(unreachable("no device at address"));
        };

        let accepted = match (dev.doxm.oxm_sel, params.cipher) {
            _ if dev.refuse_sessions => false,
            (Some(Oxm::JustWorks), CipherSuite::EcdhAnonAes128CbcSha256) => true,
            (Some(Oxm::ManufacturerCertificate), CipherSuite::EcdheEcdsaAes128Ccm8) => true,
            (Some(Oxm::RandomDevicePin), CipherSuite::EcdhePskAes128CbcSha256) => {
                match (&dev.pin, &params.psk) {
                    (Some(pin), Some((_, psk))) => kdf::pin_psk(pin, dev.uuid())? == *psk,
                    _ => false,
                }
            }
            _ => false,
        };

        if !accepted {
            error!(device = %dev.uuid(), cipher = ?params.cipher, "handshake failed");

            return Err(Error::new(ErrorKind::Transport, "handshake failed"));
        }

        dev.session = Some(params.cipher);

        Ok(SecureSession {
            peer: *dev.uuid(),
            cipher: params.cipher,
            exporter: KeyMaterial::from(rand::random::<[u8; 48]>().to_vec()),
        })
    }

    async fn downgrade_session(&mut self, device: &Device) -> Result<(), Error> {
        let ip = device_ip(device)?;

        let mut state = self.state();

        state.events.push(SimEvent::Downgrade {
            device: *device.uuid(),
        });

        let Some(dev) = state.device_at(&ip) else {
            return Err(unreachable("no device at address"));
        };

        dev.session = None;

        Ok(())
    }

    async fn discover(
        &mut self,
        timeout: Duration,
        scope: DiscoveryScope,
    ) -> Result<Vec<Device>, Error> {
        let mut state = self.state();

        state.events.push(SimEvent::Discover(scope));

        let found: Vec<Device> = state
            .devices
            .iter()
            .filter(|dev| dev.reachable)
            .filter(|dev| match scope {
                DiscoveryScope::Unowned => !dev.doxm.owned,
                DiscoveryScope::Owned => dev.doxm.owned,
            })
            .map(SimDevice::snapshot)
            .collect();

        debug!(?timeout, ?scope, found = found.len(), "discovery finished");

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use iotsec_provisioning_protocol::oic::doxm::Doxm;
    use iotsec_provisioning_protocol::oic::{DOXM_URI, PSTAT_URI};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::query::resource_url;

    #[tokio::test]
    async fn discover_by_ownership() {
        let mut net = SimNetwork::new();
        let unowned = net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);
        let owned = net.add_owned(Uuid::from_u128(2), Uuid::from_u128(9));
        net.add_unowned(Uuid::from_u128(3), vec![Oxm::JustWorks]);
        net.set_reachable(&Uuid::from_u128(3), false);

        let found = net
            .discover(Duration::from_millis(1), DiscoveryScope::Unowned)
            .await
            .unwrap();
        assert_eq!(found, [unowned]);

        let found = net
            .discover(Duration::from_millis(1), DiscoveryScope::Owned)
            .await
            .unwrap();
        assert_eq!(found, [owned]);
    }

    #[tokio::test]
    async fn secure_requests_need_a_session() {
        let mut net = SimNetwork::new();
        let dev = net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        let get = Request::new(Method::Get, resource_url(&dev, false, DOXM_URI).unwrap());
        let response = net.send(get).await.unwrap();
        assert_eq!(response.code, ResponseCode::Ok);
        assert_eq!(response.document::<Doxm>().unwrap(), dev.doxm);

        let get = Request::new(Method::Get, resource_url(&dev, true, PSTAT_URI).unwrap());
        let response = net.send(get).await.unwrap();
        assert_eq!(response.code, ResponseCode::Unauthorized);

        insta::assert_snapshot!(net.event_log(), @r"
        GET coap://10.0.0.1:5683/oic/sec/doxm
        GET coaps://10.0.0.1:5684/oic/sec/pstat
        ");
    }

    #[tokio::test]
    async fn injected_faults() {
        let mut net = SimNetwork::new();
        let dev = net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        net.inject(
            *dev.uuid(),
            Method::Get,
            DOXM_URI,
            Fault::Respond(ResponseCode::InternalError),
        );
        net.inject(*dev.uuid(), Method::Get, PSTAT_URI, Fault::Drop);

        let get = Request::new(Method::Get, resource_url(&dev, false, DOXM_URI).unwrap());
        let response = net.send(get).await.unwrap();
        assert_eq!(response.code, ResponseCode::InternalError);

        let get = Request::new(Method::Get, resource_url(&dev, false, PSTAT_URI).unwrap());
        let err = net.send(get).await.unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Transport);

        net.clear_faults();
        net.set_reachable(dev.uuid(), false);

        let get = Request::new(Method::Get, resource_url(&dev, false, DOXM_URI).unwrap());
        let err = net.send(get).await.unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Transport);
        assert_eq!(net.event_count(), 3);
    }

    #[tokio::test]
    async fn handshake_follows_selected_method() {
        let mut net = SimNetwork::new();
        let dev = net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        // Nothing selected yet.
        let params = SessionParams::new(CipherSuite::EcdhAnonAes128CbcSha256);
        let err = net
            .upgrade_to_secure_session(&dev, &params)
            .await
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Transport);

        let select = Request::with_document(
            Method::Put,
            resource_url(&dev, false, DOXM_URI).unwrap(),
            &dev.doxm.with_selected(Oxm::JustWorks),
        )
        .unwrap();
        assert_eq!(net.send(select).await.unwrap().code, ResponseCode::Ok);

        let session = net.upgrade_to_secure_session(&dev, &params).await.unwrap();
        assert_eq!(session.peer, *dev.uuid());
        assert_eq!(session.exporter.len(), 48);

        net.downgrade_session(&dev).await.unwrap();
        assert_eq!(net.device(dev.uuid()).unwrap().session, None);
    }

    #[tokio::test]
    async fn pin_is_shown_after_selection() {
        let mut net = SimNetwork::new();
        let dev = net.add_unowned(Uuid::from_u128(1), vec![Oxm::RandomDevicePin]);

        assert_eq!(net.pin(dev.uuid()), None);

        let select = Request::with_document(
            Method::Put,
            resource_url(&dev, false, DOXM_URI).unwrap(),
            &dev.doxm.with_selected(Oxm::RandomDevicePin),
        )
        .unwrap();
        net.send(select).await.unwrap();

        let pin = net.pin_provider().pin(dev.uuid()).unwrap();
        assert_eq!(pin.len(), 8);

        let psk = kdf::pin_psk(&pin, dev.uuid()).unwrap();
        let wrong = kdf::pin_psk("00000000", dev.uuid()).unwrap();

        let params =
            SessionParams::with_psk(CipherSuite::EcdhePskAes128CbcSha256, *dev.uuid(), wrong);
        // The random PIN could be all zeros.
        if pin != "00000000" {
            assert!(net.upgrade_to_secure_session(&dev, &params).await.is_err());
        }

        let params =
            SessionParams::with_psk(CipherSuite::EcdhePskAes128CbcSha256, *dev.uuid(), psk);
        assert!(net.upgrade_to_secure_session(&dev, &params).await.is_ok());
    }
}
