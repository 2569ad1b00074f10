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

//! URLs of the security resources of a device.

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::{CRED_SUBJECT_QUERY, CRED_URI};
use tracing::error;
use url::Url;
use uuid::Uuid;

use crate::device::{Address, Device};

const COAP: &str = "coap";
const COAPS: &str = "coaps";

/// URL of a resource on the device.
///
/// The secure URL points to the secure port with the `coaps` scheme.
pub fn resource_url(device: &Device, secure: bool, uri: &str) -> Result<Url, Error> {
    let ip = match &device.endpoint.address {
        Address::Ip(ip) => ip,
        Address::Gatt(_) | Address::Rfcomm(_) => {
            error!(endpoint = %device.endpoint, "unsupported connectivity type");

            return Err(Error::new(ErrorKind::Transport, "unsupported connectivity"));
        }
    };

    let (scheme, port) = if secure {
        (COAPS, device.secure_port)
    } else {
        (COAP, device.endpoint.port)
    };

    let host = match ip {
        std::net::IpAddr::V4(ip) => ip.to_string(),
        std::net::IpAddr::V6(ip) => format!("[{ip}]"),
    };

    Url::parse(&format!("{scheme}://{host}:{port}{uri}")).map_err(|err| {
        error!(error = %err, "couldn't parse URL");

        Error::new(ErrorKind::Transport, "resource url")
    })
}

/// Secure URL of the credential resource, selecting the credentials of the subject.
pub fn credential_url(device: &Device, subject: &Uuid) -> Result<Url, Error> {
    let mut url = resource_url(device, true, CRED_URI)?;

    url.query_pairs_mut()
        .append_pair(CRED_SUBJECT_QUERY, &subject.to_string());

    Ok(url)
}

/// Subject selected by a credential URL.
pub fn credential_subject(url: &Url) -> Option<Uuid> {
    url.query_pairs()
        .find(|(key, _)| key == CRED_SUBJECT_QUERY)
        .and_then(|(_, value)| Uuid::parse_str(&value).ok())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use iotsec_provisioning_protocol::oic::doxm::Doxm;
    use iotsec_provisioning_protocol::oic::{DOXM_URI, PSTAT_URI};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::Endpoint;

    fn device(address: Address) -> Device {
        Device::new(
            Endpoint {
                address,
                port: 5683,
            },
            Doxm::unowned(Uuid::from_u128(1), Vec::new()),
        )
    }

    #[test]
    fn unsecure_and_secure_urls() {
        let v4 = device(Address::Ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 4))));
        let v6 = device(Address::Ip(IpAddr::V6(Ipv6Addr::new(
            0xfe80, 0, 0, 0, 0, 0, 0, 0x1,
        ))))
        .with_secure_port(49152);

        let urls = [
            resource_url(&v4, false, DOXM_URI).unwrap(),
            resource_url(&v4, true, PSTAT_URI).unwrap(),
            resource_url(&v6, false, DOXM_URI).unwrap(),
            resource_url(&v6, true, PSTAT_URI).unwrap(),
        ]
        .map(|url| url.to_string())
        .join("\n");

        insta::assert_snapshot!(urls, @r"
        coap://192.168.1.4:5683/oic/sec/doxm
        coaps://192.168.1.4:5684/oic/sec/pstat
        coap://[fe80::1]:5683/oic/sec/doxm
        coaps://[fe80::1]:49152/oic/sec/pstat
        ");
    }

    #[test]
    fn credential_subject_query() {
        let dev = device(Address::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        let subject = Uuid::from_u128(0x42);

        let url = credential_url(&dev, &subject).unwrap();

        insta::assert_snapshot!(url, @"coaps://127.0.0.1:5684/oic/sec/cred?sub=00000000-0000-0000-0000-000000000042");
        assert_eq!(credential_subject(&url), Some(subject));
    }

    #[test]
    fn non_ip_is_rejected() {
        let dev = device(Address::Rfcomm("00:11:22:33:44:55".to_string()));

        let err = resource_url(&dev, false, DOXM_URI).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Transport);
    }
}
