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

//! Removal of pairwise credentials.
//!
//! Links are marked stale before any request. A link is deleted only once the devices confirmed the
//! deletion of the credentials, otherwise it stays stale until reconciled.

use std::time::Duration;

use iotsec_provisioning_protocol::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::Ctx;
use crate::device::Device;
use crate::results::{BatchResult, ResultCode, ResultCollector};
use crate::transport::query::credential_url;
use crate::transport::{DiscoveryScope, Method, Request, ResponseCode, Transport, deliver};

/// Outcome of the removal of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveStatus {
    /// The device isn't linked to any other, nothing was sent.
    NoLinkedDevices,
    /// None of the linked devices answered the discovery.
    NoReachableDevices,
    /// The credentials were removed from the reachable linked devices.
    Completed(BatchResult),
}

/// Deletes from the device the credential of the subject.
async fn delete_credential<T>(transport: &mut T, device: &Device, subject: &Uuid) -> ResultCode
where
    T: Transport,
{
    let request = credential_url(device, subject).map(|url| Request::new(Method::Delete, url));

    deliver(transport, request, ResponseCode::Deleted).await
}

/// Removes the credentials shared by the two devices, then their link.
///
/// The second device is contacted only after the first one confirmed the deletion.
#[instrument(skip_all, fields(a = %a.uuid(), b = %b.uuid()))]
pub async fn unlink<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    a: &Device,
    b: &Device,
    callback: F,
) -> Result<BatchResult, Error>
where
    T: Transport,
    F: FnOnce(&BatchResult),
{
    ctx.links.set_stale(a.uuid(), b.uuid())?;

    let mut collector = ResultCollector::new(callback);

    for (device, subject) in [(a, b.uuid()), (b, a.uuid())] {
        let code = delete_credential(ctx.transport, device, subject).await;

        collector.record(*device.uuid(), code);

        if !code.is_success() {
            warn!(device = %device.uuid(), %code, "link left stale");

            return Ok(collector.finish());
        }

        info!(device = %device.uuid(), "credential removed");
    }

    if let Err(err) = ctx.links.unlink(a.uuid(), b.uuid()) {
        error!(
            error = %err,
            "credential removed remotely but unlinking in the link store failed"
        );

        collector.record_inconsistent();
    }

    Ok(collector.finish())
}

/// Removes the credentials of the target from every reachable device linked to it.
///
/// Every link of the target is marked stale before any request, including the links to devices
/// that don't answer the discovery, which stay stale until reconciled. Only the reachable devices
/// are contacted.
#[instrument(skip_all, fields(%target))]
pub async fn remove<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    wait: Duration,
    target: &Uuid,
    callback: F,
) -> Result<RemoveStatus, Error>
where
    T: Transport,
    F: FnOnce(&BatchResult),
{
    let linked = ctx.links.linked(target)?;

    if linked.is_empty() {
        info!("no linked devices");

        return Ok(RemoveStatus::NoLinkedDevices);
    }

    let discovered = ctx.transport.discover(wait, DiscoveryScope::Owned).await?;

    for device in &linked {
        ctx.links.set_stale(target, device)?;
    }

    let reachable: Vec<Device> = linked
        .iter()
        .filter_map(|uuid| {
            let found = discovered.iter().find(|dev| dev.uuid() == uuid).cloned();

            if found.is_none() {
                warn!(device = %uuid, "linked device unreachable");
            }

            found
        })
        .collect();

    if reachable.is_empty() {
        warn!("no reachable linked devices");

        return Ok(RemoveStatus::NoReachableDevices);
    }

    debug!(
        linked = linked.len(),
        reachable = reachable.len(),
        "removing credentials"
    );

    let mut collector = ResultCollector::new(callback);

    for device in &reachable {
        let code = delete_credential(ctx.transport, device, target).await;

        if !code.is_success() {
            collector.record(*device.uuid(), code);

            continue;
        }

        match ctx.links.unlink(target, device.uuid()) {
            Ok(()) => {
                info!(device = %device.uuid(), "credential removed");

                collector.record(*device.uuid(), code);
            }
            Err(err) => {
                error!(
                    device = %device.uuid(),
                    error = %err,
                    "credential removed remotely but unlinking in the link store failed"
                );

                collector.record(*device.uuid(), ResultCode::InconsistentDb);
            }
        }
    }

    Ok(RemoveStatus::Completed(collector.finish()))
}
