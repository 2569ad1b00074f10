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

//! Single entry point to the provisioning operations.
//!
//! Validates the inputs before any request and owns the collaborators shared by the operations.

use std::collections::HashSet;
use std::time::Duration;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::acl::Acl;
use iotsec_provisioning_protocol::oic::crl::Crl;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ProvisioningConfig;
use crate::credential_store::CredentialStore;
use crate::device::{Device, DeviceInventory};
use crate::keycert::KeyCertService;
use crate::link_store::LinkStore;
use crate::oxm::OxmRegistry;
use crate::pairwise::CredentialKind;
use crate::results::BatchResult;
use crate::transport::{DiscoveryScope, Transport};
use crate::unlink::RemoveStatus;
use crate::{Ctx, otm, pairwise, unlink};

/// Symmetric key sizes accepted, in bits.
pub const SYMMETRIC_KEY_BITS: [usize; 2] = [128, 256];

/// Provisioning tool, managing the devices it owns.
#[derive(Debug)]
pub struct Provisioning<T, K, S> {
    transport: T,
    keys: K,
    links: LinkStore,
    creds: S,
    config: ProvisioningConfig,
    registry: OxmRegistry,
}

impl<T, K, S> Provisioning<T, K, S>
where
    T: Transport,
    K: KeyCertService,
    S: CredentialStore,
{
    /// Creates the provisioning tool.
    pub fn new(
        transport: T,
        keys: K,
        links: LinkStore,
        creds: S,
        config: ProvisioningConfig,
        registry: OxmRegistry,
    ) -> Self {
        Self {
            transport,
            keys,
            links,
            creds,
            config,
            registry,
        }
    }

    fn ctx(&mut self) -> Ctx<'_, T, K, S> {
        Ctx::new(
            &mut self.transport,
            &mut self.keys,
            &self.links,
            &self.creds,
            &self.config,
            &self.registry,
        )
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Returns the link store.
    pub fn links(&self) -> &LinkStore {
        &self.links
    }

    /// Returns the local credential store.
    pub fn credentials(&self) -> &S {
        &self.creds
    }

    /// Discovers the unowned devices, or the owned ones.
    #[instrument(skip(self))]
    pub async fn discover(
        &mut self,
        timeout: Duration,
        owned_only: bool,
    ) -> Result<Vec<Device>, Error> {
        let scope = if owned_only {
            DiscoveryScope::Owned
        } else {
            DiscoveryScope::Unowned
        };

        let devices = self.transport.discover(timeout, scope).await?;

        if devices.is_empty() {
            warn!(?scope, "no devices found");
        } else {
            info!(?scope, found = devices.len(), "discovery successful");
        }

        Ok(devices)
    }

    /// Lists the unowned devices and the ones owned by this tool.
    ///
    /// Each discovery gets half of the wait. Owned devices that didn't answer are listed as off.
    #[instrument(skip(self))]
    pub async fn network_inventory(&mut self, wait: Duration) -> Result<DeviceInventory, Error> {
        let half = wait / 2;

        let unowned = self.transport.discover(half, DiscoveryScope::Unowned).await?;
        let seen = self.transport.discover(half, DiscoveryScope::Owned).await?;

        let owner = *self.config.owner();

        let mut owned: Vec<Device> = seen
            .into_iter()
            .filter(|dev| dev.doxm.owner_uuid == Some(owner))
            .collect();

        for uuid in self.links.owned()? {
            if owned.iter().any(|dev| *dev.uuid() == uuid) {
                continue;
            }

            debug!(device = %uuid, "owned device not on the network");

            owned.push(Device::offline(uuid, owner));
        }

        Ok(DeviceInventory { owned, unowned })
    }

    /// Transfers the ownership of the devices, one at a time.
    pub async fn begin_ownership_transfer<F>(
        &mut self,
        devices: &[Device],
        callback: F,
    ) -> Result<BatchResult, Error>
    where
        F: FnOnce(&BatchResult),
    {
        if devices.is_empty() {
            error!("no devices to transfer");

            return Err(Error::new(ErrorKind::Validation, "empty device list"));
        }

        let mut seen = HashSet::with_capacity(devices.len());
        if let Some(repeated) = devices.iter().find(|dev| !seen.insert(*dev.uuid())) {
            error!(device = %repeated.uuid(), "device listed more than once");

            return Err(Error::new(ErrorKind::Validation, "repeated device"));
        }

        otm::begin_ownership_transfer(&mut self.ctx(), devices, callback).await
    }

    /// Provisions the credentials shared by two devices.
    ///
    /// The symmetric key size is in bits.
    pub async fn provision_credentials<F>(
        &mut self,
        kind: CredentialKind,
        key_bits: usize,
        a: &Device,
        b: &Device,
        callback: F,
    ) -> Result<BatchResult, Error>
    where
        F: FnOnce(&BatchResult),
    {
        check_pair(kind, key_bits, a, b)?;

        pairwise::provision_credentials(&mut self.ctx(), kind, key_bits, a, b, callback).await
    }

    /// Provisions an ACL to the device.
    pub async fn provision_acl<F>(&mut self, device: &Device, acl: &Acl, callback: F) -> BatchResult
    where
        F: FnOnce(&BatchResult),
    {
        pairwise::provision_acl(&mut self.ctx(), device, acl, callback).await
    }

    /// Provisions a certificate revocation list to the device.
    pub async fn provision_crl<F>(&mut self, device: &Device, crl: &Crl, callback: F) -> BatchResult
    where
        F: FnOnce(&BatchResult),
    {
        pairwise::provision_crl(&mut self.ctx(), device, crl, callback).await
    }

    /// Provisions the credentials of the pair, then the optional ACLs of each device.
    #[allow(clippy::too_many_arguments)]
    pub async fn provision_pairwise_devices<F>(
        &mut self,
        kind: CredentialKind,
        key_bits: usize,
        a: &Device,
        acl_a: Option<&Acl>,
        b: &Device,
        acl_b: Option<&Acl>,
        callback: F,
    ) -> Result<BatchResult, Error>
    where
        F: FnOnce(&BatchResult),
    {
        check_pair(kind, key_bits, a, b)?;

        pairwise::provision_pairwise_devices(
            &mut self.ctx(),
            kind,
            key_bits,
            a,
            acl_a,
            b,
            acl_b,
            callback,
        )
        .await
    }

    /// Removes the credentials shared by two linked devices.
    pub async fn unlink<F>(
        &mut self,
        a: &Device,
        b: &Device,
        callback: F,
    ) -> Result<BatchResult, Error>
    where
        F: FnOnce(&BatchResult),
    {
        if !self.links.linked(a.uuid())?.contains(b.uuid()) {
            error!(a = %a.uuid(), b = %b.uuid(), "devices not linked");

            return Err(Error::new(ErrorKind::Validation, "devices not linked"));
        }

        unlink::unlink(&mut self.ctx(), a, b, callback).await
    }

    /// Revokes the device.
    ///
    /// Removes its credentials from the reachable linked devices, then forgets it locally, whatever
    /// the linked devices answered.
    #[instrument(skip(self, callback))]
    pub async fn remove<F>(
        &mut self,
        wait: Duration,
        target: &Uuid,
        callback: F,
    ) -> Result<RemoveStatus, Error>
    where
        F: FnOnce(&BatchResult),
    {
        if wait.is_zero() {
            error!("zero discovery wait");

            return Err(Error::new(ErrorKind::Validation, "zero wait time"));
        }

        let status = unlink::remove(&mut self.ctx(), wait, target, callback).await?;

        if !self.creds.remove(target).await? {
            warn!("no local credential for the device");
        }

        self.links.delete_device(target).map_err(|err| {
            error!(
                error = %err,
                "credentials revoked but deleting the device from the link store failed"
            );

            Error::new(ErrorKind::Consistency, "delete removed device")
        })?;

        info!("device removed");

        Ok(status)
    }

    /// Returns the devices linked to the given one.
    pub fn linked_devices(&self, uuid: &Uuid) -> Result<Vec<Uuid>, Error> {
        self.links.linked(uuid)
    }

    /// Returns the stale links, left by failed unlink or remove operations.
    pub fn stale_links(&self) -> Result<Vec<(Uuid, Uuid)>, Error> {
        self.links.stale_links()
    }

    /// Returns every device owned by this tool.
    pub fn owned_devices(&self) -> Result<Vec<Uuid>, Error> {
        self.links.owned()
    }
}

fn check_pair(kind: CredentialKind, key_bits: usize, a: &Device, b: &Device) -> Result<(), Error> {
    if a.uuid() == b.uuid() {
        error!(device = %a.uuid(), "cannot pair a device with itself");

        return Err(Error::new(ErrorKind::Validation, "same device"));
    }

    if kind == CredentialKind::SymmetricPairwise && !SYMMETRIC_KEY_BITS.contains(&key_bits) {
        error!(key_bits, "unsupported symmetric key size");

        return Err(Error::new(ErrorKind::Validation, "symmetric key size"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use iotsec_provisioning_protocol::oic::acl::Permission;
    use iotsec_provisioning_protocol::oic::oxm::Oxm;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::FileCredentialStore;
    use crate::device::DeviceStatus;
    use crate::keycert::SoftwareKeyCert;
    use crate::link_store::DEFAULT_DB_FILE;
    use crate::results::ResultCode;
    use crate::results::tests::capture;
    use crate::sim::SimNetwork;
    use crate::tests::OWNER;

    const WAIT: Duration = Duration::from_millis(10);

    type SimProvisioning = Provisioning<SimNetwork, SoftwareKeyCert, FileCredentialStore>;

    async fn provisioning() -> (SimProvisioning, SimNetwork, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let net = SimNetwork::new();

        let links = LinkStore::open(&dir.path().join(DEFAULT_DB_FILE)).unwrap();
        let creds = FileCredentialStore::open(dir.path().join("creds"))
            .await
            .unwrap();

        let provisioning = Provisioning::new(
            net.clone(),
            SoftwareKeyCert::new().unwrap(),
            links,
            creds,
            ProvisioningConfig::new(OWNER),
            OxmRegistry::with_defaults(net.pin_provider()),
        );

        (provisioning, net, dir)
    }

    fn acl_for(subject: &Device) -> Acl {
        Acl {
            subject: *subject.uuid(),
            resources: vec!["/a/led".to_string()],
            permission: Permission::READ | Permission::UPDATE,
            owners: vec![OWNER],
        }
    }

    #[tokio::test]
    async fn device_lifecycle() {
        let (mut provisioning, net, _dir) = provisioning().await;
        let u1 = Uuid::from_u128(1);
        let u2 = Uuid::from_u128(2);
        net.add_unowned(u1, vec![Oxm::JustWorks]);
        net.add_unowned(u2, vec![Oxm::RandomDevicePin, Oxm::JustWorks]);

        let unowned = provisioning.discover(WAIT, false).await.unwrap();
        assert_eq!(unowned.len(), 2);

        let batch = provisioning
            .begin_ownership_transfer(&unowned, |_: &BatchResult| {})
            .await
            .unwrap();
        assert!(!batch.has_error);
        assert_eq!(provisioning.owned_devices().unwrap(), [u1, u2]);

        let owned = provisioning.discover(WAIT, true).await.unwrap();
        let [d1, d2] = owned.as_slice() else {
            panic!("expected two owned devices, got {owned:?}");
        };

        let (calls, callback) = capture();
        let batch = provisioning
            .provision_pairwise_devices(
                CredentialKind::SymmetricPairwise,
                256,
                d1,
                Some(&acl_for(d2)),
                d2,
                Some(&acl_for(d1)),
                callback,
            )
            .await
            .unwrap();
        assert!(!batch.has_error);
        assert_eq!(batch.len(), 4);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(provisioning.linked_devices(&u1).unwrap(), [u2]);

        let batch = provisioning
            .unlink(d2, d1, |_: &BatchResult| {})
            .await
            .unwrap();
        assert!(!batch.has_error);
        assert!(provisioning.linked_devices(&u1).unwrap().is_empty());

        let batch = provisioning
            .provision_credentials(
                CredentialKind::SymmetricPairwise,
                128,
                d1,
                d2,
                |_: &BatchResult| {},
            )
            .await
            .unwrap();
        assert!(!batch.has_error);

        let (calls, callback) = capture();
        let status = provisioning.remove(WAIT, &u1, callback).await.unwrap();
        let RemoveStatus::Completed(batch) = status else {
            panic!("expected completed, got {status:?}");
        };
        assert!(!batch.has_error);
        assert_eq!(batch.code_of(&u2), Some(ResultCode::ResourceDeleted));
        assert_eq!(calls.borrow().len(), 1);

        assert_eq!(provisioning.owned_devices().unwrap(), [u2]);
        assert!(provisioning.stale_links().unwrap().is_empty());
        assert_eq!(provisioning.credentials().load(&u1).await.unwrap(), None);
        assert!(provisioning.credentials().load(&u2).await.unwrap().is_some());
        assert!(net.device(&u2).unwrap().credentials.is_empty());
    }

    #[tokio::test]
    async fn inputs_are_validated_before_any_request() {
        let (mut provisioning, net, _dir) = provisioning().await;
        let d1 = net.add_owned(Uuid::from_u128(1), OWNER);
        let d2 = net.add_owned(Uuid::from_u128(2), OWNER);
        provisioning.links().add_device(d1.uuid()).unwrap();
        provisioning.links().add_device(d2.uuid()).unwrap();

        let noop = |_: &BatchResult| {};

        let errors = [
            provisioning
                .begin_ownership_transfer(&[], noop)
                .await
                .unwrap_err(),
            provisioning
                .begin_ownership_transfer(&[d1.clone(), d1.clone()], noop)
                .await
                .unwrap_err(),
            provisioning
                .provision_credentials(CredentialKind::SymmetricPairwise, 128, &d1, &d1, noop)
                .await
                .unwrap_err(),
            provisioning
                .provision_credentials(CredentialKind::SymmetricPairwise, 192, &d1, &d2, noop)
                .await
                .unwrap_err(),
            provisioning
                .provision_pairwise_devices(
                    CredentialKind::SymmetricPairwise,
                    64,
                    &d1,
                    None,
                    &d2,
                    None,
                    noop,
                )
                .await
                .unwrap_err(),
            provisioning.unlink(&d1, &d2, noop).await.unwrap_err(),
            provisioning
                .remove(Duration::ZERO, d1.uuid(), noop)
                .await
                .unwrap_err(),
        ];

        for err in errors {
            assert_eq!(*err.kind(), ErrorKind::Validation, "{err}");
        }

        assert_eq!(net.event_count(), 0);
        assert_eq!(provisioning.owned_devices().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remove_without_links_forgets_the_device() {
        let (mut provisioning, net, _dir) = provisioning().await;
        let d1 = net.add_owned(Uuid::from_u128(1), OWNER);
        provisioning.links().add_device(d1.uuid()).unwrap();

        let status = provisioning
            .remove(WAIT, d1.uuid(), |_: &BatchResult| {})
            .await
            .unwrap();

        assert_eq!(status, RemoveStatus::NoLinkedDevices);
        assert_eq!(net.event_count(), 0);
        assert!(provisioning.owned_devices().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_links_survive_removing_the_device() {
        let (mut provisioning, net, _dir) = provisioning().await;
        let target = net.add_owned(Uuid::from_u128(1), OWNER);
        let offline = net.add_owned(Uuid::from_u128(2), OWNER);
        provisioning.links().add_device(target.uuid()).unwrap();
        provisioning.links().add_device(offline.uuid()).unwrap();

        let batch = provisioning
            .provision_credentials(
                CredentialKind::SymmetricPairwise,
                128,
                &target,
                &offline,
                |_: &BatchResult| {},
            )
            .await
            .unwrap();
        assert!(!batch.has_error);

        net.set_reachable(offline.uuid(), false);

        let status = provisioning
            .remove(WAIT, target.uuid(), |_: &BatchResult| {})
            .await
            .unwrap();

        assert_eq!(status, RemoveStatus::NoReachableDevices);
        assert_eq!(provisioning.owned_devices().unwrap(), [*offline.uuid()]);
        assert!(provisioning.linked_devices(offline.uuid()).unwrap().is_empty());
        // The unreachable device still holds the credential of the removed one.
        assert_eq!(
            provisioning.stale_links().unwrap(),
            [(Uuid::nil(), *offline.uuid())]
        );
    }

    #[tokio::test]
    async fn inventory_lists_offline_devices() {
        let (mut provisioning, net, _dir) = provisioning().await;
        let unowned = net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);
        let online = net.add_owned(Uuid::from_u128(2), OWNER);
        let offline = net.add_owned(Uuid::from_u128(3), OWNER);
        // Owned by someone else.
        net.add_owned(Uuid::from_u128(4), Uuid::from_u128(0xff));

        provisioning.links().add_device(online.uuid()).unwrap();
        provisioning.links().add_device(offline.uuid()).unwrap();
        net.set_reachable(offline.uuid(), false);

        let inventory = provisioning.network_inventory(WAIT).await.unwrap();

        assert_eq!(inventory.unowned, [unowned]);
        assert_eq!(inventory.owned.len(), 2);
        assert_eq!(inventory.owned[0], online);
        assert_eq!(inventory.owned[1].uuid(), offline.uuid());
        assert_eq!(inventory.owned[1].status, DeviceStatus::Off);

        insta::assert_snapshot!(net.event_log(), @r"
        DISCOVER Unowned
        DISCOVER Owned
        ");
    }
}
