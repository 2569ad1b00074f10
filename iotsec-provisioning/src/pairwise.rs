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

//! Pairwise provisioning of credentials, ACLs and CRLs.

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::Resource;
use iotsec_provisioning_protocol::oic::acl::Acl;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::crl::Crl;
use iotsec_provisioning_protocol::oic::{ACL_URI, CRED_URI, CRL_URI};
use tracing::{debug, error, info, instrument};

use crate::Ctx;
use crate::credential_store::CredentialStore;
use crate::device::Device;
use crate::keycert::KeyCertService;
use crate::results::{BatchResult, ResultCollector};
use crate::transport::query::resource_url;
use crate::transport::{Method, Request, ResponseCode, Transport, deliver};

/// Kind of credential provisioned to a pair of devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Shared symmetric key, installed on both devices.
    SymmetricPairwise,
    /// Certificate issued by the local CA, installed on the first device only.
    Certificate,
}

/// Sends a document to a device resource over the secure endpoint, recording the outcome.
///
/// Returns whether the device created the resource.
async fn post<T, F, R>(
    transport: &mut T,
    collector: &mut ResultCollector<F>,
    device: &Device,
    uri: &'static str,
    document: &R,
) -> bool
where
    T: Transport,
    F: FnOnce(&BatchResult),
    R: Resource,
{
    let request = resource_url(device, true, uri)
        .and_then(|url| Request::with_document(Method::Post, url, document));

    let code = deliver(transport, request, ResponseCode::Created).await;

    collector.record(*device.uuid(), code);

    if code.is_success() {
        info!(device = %device.uuid(), "{} provisioned", R::NAME);
    }

    code.is_success()
}

fn check_not_linked<T, K, S>(ctx: &Ctx<'_, T, K, S>, a: &Device, b: &Device) -> Result<(), Error> {
    if ctx.links.link_exists(a.uuid(), b.uuid())? {
        error!(a = %a.uuid(), b = %b.uuid(), "devices already linked");

        return Err(Error::new(ErrorKind::Validation, "devices already linked"));
    }

    Ok(())
}

async fn credentials<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    collector: &mut ResultCollector<F>,
    kind: CredentialKind,
    key_bits: usize,
    a: &Device,
    b: &Device,
) -> bool
where
    T: Transport,
    K: KeyCertService,
    S: CredentialStore,
    F: FnOnce(&BatchResult),
{
    let owner = *ctx.config.owner();

    match kind {
        CredentialKind::SymmetricPairwise => {
            let key = match ctx.keys.generate_key(key_bits / 8) {
                Ok(key) => key,
                Err(err) => {
                    collector.record_error(*a.uuid(), &err);

                    return false;
                }
            };

            let for_a = Credential::symmetric(*b.uuid(), key.clone(), owner);
            if !post(ctx.transport, collector, a, CRED_URI, &for_a).await {
                return false;
            }

            let for_b = Credential::symmetric(*a.uuid(), key, owner);
            if !post(ctx.transport, collector, b, CRED_URI, &for_b).await {
                error!(
                    a = %a.uuid(),
                    b = %b.uuid(),
                    "credential delivered only to the first device"
                );

                return false;
            }

            if let Err(err) = ctx.links.link(a.uuid(), b.uuid()) {
                error!(
                    error = %err,
                    "credentials provisioned but linking in the link store failed"
                );

                collector.record_inconsistent();

                return false;
            }

            debug!(a = %a.uuid(), b = %b.uuid(), "devices linked");
        }
        CredentialKind::Certificate => {
            let issued = match ctx.keys.issue_certificate(a.uuid()).await {
                Ok(issued) => issued,
                Err(err) => {
                    collector.record_error(*a.uuid(), &err);

                    return false;
                }
            };

            let cred = Credential::certificate(*a.uuid(), issued.chain, issued.private_key, owner);
            if !post(ctx.transport, collector, a, CRED_URI, &cred).await {
                return false;
            }
        }
    }

    true
}

/// Provisions the credentials shared by two devices.
///
/// A symmetric key is sent to the first device, then to the second one, and the pair is linked only
/// after both accepted it. A credential already delivered to the first device isn't rolled back if
/// the second delivery fails.
#[instrument(skip_all, fields(?kind, key_bits = key_bits, a = %a.uuid(), b = %b.uuid()))]
pub async fn provision_credentials<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    kind: CredentialKind,
    key_bits: usize,
    a: &Device,
    b: &Device,
    callback: F,
) -> Result<BatchResult, Error>
where
    T: Transport,
    K: KeyCertService,
    S: CredentialStore,
    F: FnOnce(&BatchResult),
{
    check_not_linked(ctx, a, b)?;

    let mut collector = ResultCollector::new(callback);

    credentials(ctx, &mut collector, kind, key_bits, a, b).await;

    Ok(collector.finish())
}

/// Provisions an ACL to the device.
#[instrument(skip_all, fields(device = %device.uuid()))]
pub async fn provision_acl<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    device: &Device,
    acl: &Acl,
    callback: F,
) -> BatchResult
where
    T: Transport,
    F: FnOnce(&BatchResult),
{
    let mut collector = ResultCollector::new(callback);

    post(ctx.transport, &mut collector, device, ACL_URI, acl).await;

    collector.finish()
}

/// Provisions a certificate revocation list to the device.
#[instrument(skip_all, fields(device = %device.uuid(), crl = crl.id))]
pub async fn provision_crl<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    device: &Device,
    crl: &Crl,
    callback: F,
) -> BatchResult
where
    T: Transport,
    F: FnOnce(&BatchResult),
{
    let mut collector = ResultCollector::new(callback);

    post(ctx.transport, &mut collector, device, CRL_URI, crl).await;

    collector.finish()
}

/// Provisions the credentials of the pair, then the ACLs of each device.
///
/// Stops at the first failure, every result ends up in the same batch.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(?kind, key_bits = key_bits, a = %a.uuid(), b = %b.uuid()))]
pub async fn provision_pairwise_devices<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    kind: CredentialKind,
    key_bits: usize,
    a: &Device,
    acl_a: Option<&Acl>,
    b: &Device,
    acl_b: Option<&Acl>,
    callback: F,
) -> Result<BatchResult, Error>
where
    T: Transport,
    K: KeyCertService,
    S: CredentialStore,
    F: FnOnce(&BatchResult),
{
    check_not_linked(ctx, a, b)?;

    let mut collector = ResultCollector::new(callback);

    if !credentials(ctx, &mut collector, kind, key_bits, a, b).await {
        return Ok(collector.finish());
    }

    for (device, acl) in [(a, acl_a), (b, acl_b)] {
        let Some(acl) = acl else {
            continue;
        };

        if !post(ctx.transport, &mut collector, device, ACL_URI, acl).await {
            break;
        }
    }

    Ok(collector.finish())
}
