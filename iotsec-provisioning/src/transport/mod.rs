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

//! Seam to the CoAP transport and its secure sessions.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::Resource;
use iotsec_provisioning_protocol::oic::cred::KeyMaterial;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use crate::device::Device;
use crate::results::ResultCode;

pub mod query;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a resource.
    Get,
    /// Update a resource.
    Put,
    /// Create a resource.
    Post,
    /// Delete a resource.
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Put => write!(f, "PUT"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Request to a device resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method of the request.
    pub method: Method,
    /// Resource URL, the scheme selects the secure endpoint.
    pub url: Url,
    /// CBOR payload.
    pub payload: Vec<u8>,
}

impl Request {
    /// Creates a request without payload.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            payload: Vec::new(),
        }
    }

    /// Creates a request carrying the encoded document.
    pub fn with_document<R>(method: Method, url: Url, document: &R) -> Result<Self, Error>
    where
        R: Resource,
    {
        let payload = document.encode()?;

        Ok(Self {
            method,
            url,
            payload,
        })
    }
}

/// Response code of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Changed or content.
    Ok,
    /// Resource created.
    Created,
    /// Resource deleted.
    Deleted,
    /// Malformed request.
    BadRequest,
    /// Not authorized for the resource.
    Unauthorized,
    /// Unknown resource.
    NotFound,
    /// Method not allowed in the current state.
    NotAllowed,
    /// Generic server error.
    InternalError,
}

impl From<ResponseCode> for ResultCode {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::Ok => ResultCode::Ok,
            ResponseCode::Created => ResultCode::ResourceCreated,
            ResponseCode::Deleted => ResultCode::ResourceDeleted,
            ResponseCode::BadRequest => ResultCode::InvalidParam,
            ResponseCode::Unauthorized => ResultCode::Unauthorized,
            ResponseCode::NotFound => ResultCode::NoResource,
            ResponseCode::NotAllowed | ResponseCode::InternalError => ResultCode::Error,
        }
    }
}

/// Response of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response code.
    pub code: ResponseCode,
    /// CBOR payload.
    pub payload: Vec<u8>,
}

impl Response {
    /// Creates a response without payload.
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            payload: Vec::new(),
        }
    }

    /// Checks the response code, failing with a protocol error on mismatch.
    pub fn expect(self, code: ResponseCode, ctx: &'static str) -> Result<Self, Error> {
        if self.code != code {
            error!(expected = ?code, received = ?self.code, "unexpected response for {ctx}");

            return Err(Error::new(ErrorKind::Protocol, ctx));
        }

        Ok(self)
    }

    /// Decodes the payload.
    pub fn document<R>(&self) -> Result<R, Error>
    where
        R: Resource,
    {
        R::decode(&self.payload)
    }
}

/// Cipher suite of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// No encryption, used after the owner credential is in place.
    Null,
    /// Anonymous ECDH, for the just works method.
    EcdhAnonAes128CbcSha256,
    /// Pre-shared key authenticated ECDHE, for the random PIN method.
    EcdhePskAes128CbcSha256,
    /// Certificate based, for the manufacturer certificate method.
    EcdheEcdsaAes128Ccm8,
}

/// Parameters used to upgrade to a secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Cipher suite to negotiate.
    pub cipher: CipherSuite,
    /// PSK and its identity, for PSK suites.
    pub psk: Option<(Uuid, KeyMaterial)>,
}

impl SessionParams {
    /// Session without a pre-shared key.
    pub fn new(cipher: CipherSuite) -> Self {
        Self { cipher, psk: None }
    }

    /// Session authenticated with a pre-shared key.
    pub fn with_psk(cipher: CipherSuite, identity: Uuid, psk: KeyMaterial) -> Self {
        Self {
            cipher,
            psk: Some((identity, psk)),
        }
    }
}

/// An established secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureSession {
    /// Peer of the session.
    pub peer: Uuid,
    /// Negotiated cipher suite.
    pub cipher: CipherSuite,
    /// Keying material exported from the session, input of the owner PSK derivation.
    pub exporter: KeyMaterial,
}

/// Which devices to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryScope {
    /// Devices waiting for an owner.
    Unowned,
    /// Devices owned by this provisioning tool.
    Owned,
}

/// Sends requests to devices and manages the secure sessions with them.
pub trait Transport: Send {
    /// Sends a request and waits for the response.
    ///
    /// An error means the device couldn't be reached, a response with a failure code is still an
    /// `Ok`.
    fn send(&mut self, request: Request) -> impl Future<Output = Result<Response, Error>> + Send;

    /// Upgrades the connection with the device to a secure session.
    fn upgrade_to_secure_session(
        &mut self,
        device: &Device,
        params: &SessionParams,
    ) -> impl Future<Output = Result<SecureSession, Error>> + Send;

    /// Drops the secure session, the following secure requests use the null cipher.
    fn downgrade_session(
        &mut self,
        device: &Device,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Lists the devices answering within the timeout.
    fn discover(
        &mut self,
        timeout: Duration,
        scope: DiscoveryScope,
    ) -> impl Future<Output = Result<Vec<Device>, Error>> + Send;
}

/// Sends the request, logging it.
pub(crate) async fn exchange<T>(transport: &mut T, request: Request) -> Result<Response, Error>
where
    T: Transport,
{
    debug!(method = %request.method, url = %request.url, "sending request");

    let response = transport.send(request).await?;

    debug!(code = ?response.code, "received response");

    Ok(response)
}

/// Sends the request, turning the outcome into the result code of a batch slot.
///
/// Any response other than the expected one is a failure, even if it's a success code.
pub(crate) async fn deliver<T>(
    transport: &mut T,
    request: Result<Request, Error>,
    expected: ResponseCode,
) -> ResultCode
where
    T: Transport,
{
    let response = match request {
        Ok(request) => exchange(transport, request).await,
        Err(err) => Err(err),
    };

    match response {
        Ok(response) if response.code == expected => ResultCode::from(response.code),
        Ok(response) => {
            error!(expected = ?expected, received = ?response.code, "unexpected response");

            match ResultCode::from(response.code) {
                code if code.is_success() => ResultCode::Error,
                code => code,
            }
        }
        Err(err) => {
            error!(error = %err, "request failed");

            ResultCode::from(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use iotsec_provisioning_protocol::oic::doxm::Doxm;
    use iotsec_provisioning_protocol::oic::oxm::Oxm;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn expect_response_code() {
        let ok = Response::new(ResponseCode::Ok).expect(ResponseCode::Ok, "doxm");
        assert!(ok.is_ok());

        let err = Response::new(ResponseCode::Unauthorized)
            .expect(ResponseCode::Created, "acl")
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Protocol);
        assert_eq!(err.context(), "acl");
    }

    #[test]
    fn response_document() {
        let doxm = Doxm::unowned(Uuid::from_u128(7), vec![Oxm::JustWorks]);

        let response = Response {
            code: ResponseCode::Ok,
            payload: doxm.encode().unwrap(),
        };

        assert_eq!(response.document::<Doxm>().unwrap(), doxm);
    }

    #[test]
    fn response_to_result_code() {
        assert_eq!(
            ResultCode::from(ResponseCode::Deleted),
            ResultCode::ResourceDeleted
        );
        assert_eq!(
            ResultCode::from(ResponseCode::NotFound),
            ResultCode::NoResource
        );
        assert_eq!(
            ResultCode::from(ResponseCode::NotAllowed),
            ResultCode::Error
        );
    }
}
