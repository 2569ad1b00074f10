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

//! Ownership Transfer (OTM)
//!
//! Drives unowned devices, one at a time, through the selection of the transfer method, the secure
//! session authenticated by the method, the announcement of the new owner and the provisioning of
//! the owner credential and default policy. A failing device doesn't stop the batch.

use std::cmp::Ordering;
use std::fmt::Display;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::acl::Acl;
use iotsec_provisioning_protocol::oic::cred::Credential;
use iotsec_provisioning_protocol::oic::oxm::Oxm;
use iotsec_provisioning_protocol::oic::pstat::{OperationMode, Pstat};
use iotsec_provisioning_protocol::oic::{ACL_URI, DOXM_URI, PSTAT_URI};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::Ctx;
use crate::credential_store::CredentialStore;
use crate::device::Device;
use crate::keycert::KeyCertService;
use crate::oxm::{OxmHooks, OxmRegistry};
use crate::results::{BatchResult, ResultCode, ResultCollector};
use crate::transport::query::resource_url;
use crate::transport::{Method, Request, ResponseCode, SecureSession, Transport, exchange};

/// Step of the ownership transfer of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Pick the transfer method.
    SelectMethod,
    /// Tell the device the selected method.
    AnnounceMethod,
    /// Read the provisioning status.
    FetchStatus,
    /// Pick the operation mode.
    SelectOperationMode,
    /// Tell the device the selected operation mode.
    AnnounceOperationMode,
    /// Open the secure session authenticated by the method.
    EstablishSecureSession,
    /// Tell the device its new owner.
    AnnounceOwnership,
    /// Derive and store the owner PSK.
    DeriveSessionCredential,
    /// Drop the secure session.
    DowngradeSession,
    /// Give the owner full access.
    ProvisionDefaultPolicy,
    /// Move the device to normal operation.
    CommitNormalState,
    /// Add the device to the link store.
    RecordOwned,
    /// Terminal step.
    Done,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OTM.{self:?}")
    }
}

/// Picks the first operation mode supported by both sides, in ascending order.
///
/// Both lists are sorted before the merge, so the order the device advertises them in doesn't
/// matter.
pub fn select_operation_mode(
    local: &[OperationMode],
    remote: &[OperationMode],
) -> Option<OperationMode> {
    let mut local = local.to_vec();
    local.sort_unstable();
    local.dedup();

    let mut remote = remote.to_vec();
    remote.sort_unstable();
    remote.dedup();

    let (mut l, mut r) = (0, 0);
    while let (Some(a), Some(b)) = (local.get(l), remote.get(r)) {
        match a.cmp(b) {
            Ordering::Less => l += 1,
            Ordering::Greater => r += 1,
            Ordering::Equal => return Some(*a),
        }
    }

    None
}

fn hooks_for(registry: &OxmRegistry, oxm: Option<Oxm>) -> Result<&dyn OxmHooks, Error> {
    oxm.and_then(|oxm| registry.get(oxm))
        .ok_or(Error::new(ErrorKind::Validation, "method not selected"))
}

/// Transfers the ownership of the devices, one at a time.
///
/// Fails before any request if a device is already in the link store. Otherwise the callback is
/// invoked once, with one result per device.
#[instrument(skip_all, fields(devices = devices.len()))]
pub async fn begin_ownership_transfer<T, K, S, F>(
    ctx: &mut Ctx<'_, T, K, S>,
    devices: &[Device],
    callback: F,
) -> Result<BatchResult, Error>
where
    T: Transport,
    K: KeyCertService,
    S: CredentialStore,
    F: FnOnce(&BatchResult),
{
    for device in devices {
        if ctx.links.is_duplicate(device.uuid())? {
            error!(device = %device.uuid(), "device already owned");

            return Err(Error::new(ErrorKind::Validation, "device already owned"));
        }
    }

    let mut collector = ResultCollector::new(callback);

    for device in devices {
        let uuid = *device.uuid();

        let mut transfer = Transfer::new(device.clone());

        match transfer.run(ctx).await {
            Ok(()) => {
                info!(device = %uuid, "ownership transfer complete");

                collector.record(uuid, ResultCode::Ok);
            }
            Err(err) => {
                transfer.abort(ctx).await;

                collector.record_error(uuid, &err);
            }
        }
    }

    Ok(collector.finish())
}

/// Ownership transfer of a single device.
struct Transfer {
    device: Device,
    oxm: Option<Oxm>,
    mode: Option<OperationMode>,
    temporary: Option<Credential>,
    session: Option<SecureSession>,
}

impl Transfer {
    fn new(device: Device) -> Self {
        Self {
            device,
            oxm: None,
            mode: None,
            temporary: None,
            session: None,
        }
    }

    fn uuid(&self) -> Uuid {
        *self.device.uuid()
    }

    async fn run<T, K, S>(&mut self, ctx: &mut Ctx<'_, T, K, S>) -> Result<(), Error>
    where
        T: Transport,
        K: KeyCertService,
        S: CredentialStore,
    {
        let mut step = Step::SelectMethod;

        while step != Step::Done {
            let next = self.advance(ctx, step).await.inspect_err(|err| {
                error!(device = %self.uuid(), %step, error = %err, "ownership transfer failed");
            })?;

            info!(device = %self.uuid(), "{step} successful");

            step = next;
        }

        Ok(())
    }

    /// Executes the step, returning the next one.
    async fn advance<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
        step: Step,
    ) -> Result<Step, Error>
    where
        T: Transport,
        K: KeyCertService,
        S: CredentialStore,
    {
        match step {
            Step::SelectMethod => {
                self.select_method(ctx)?;

                Ok(Step::AnnounceMethod)
            }
            Step::AnnounceMethod => {
                self.announce_method(ctx).await?;

                Ok(Step::FetchStatus)
            }
            Step::FetchStatus => {
                self.fetch_status(ctx).await?;

                Ok(Step::SelectOperationMode)
            }
            Step::SelectOperationMode => {
                self.select_operation_mode(ctx)?;

                Ok(Step::AnnounceOperationMode)
            }
            Step::AnnounceOperationMode => {
                self.announce_operation_mode(ctx).await?;

                Ok(Step::EstablishSecureSession)
            }
            Step::EstablishSecureSession => {
                self.establish_secure_session(ctx).await?;

                Ok(Step::AnnounceOwnership)
            }
            Step::AnnounceOwnership => {
                self.announce_ownership(ctx).await?;

                Ok(Step::DeriveSessionCredential)
            }
            Step::DeriveSessionCredential => {
                self.derive_session_credential(ctx).await?;

                Ok(Step::DowngradeSession)
            }
            Step::DowngradeSession => {
                ctx.transport.downgrade_session(&self.device).await?;
                self.session = None;

                Ok(Step::ProvisionDefaultPolicy)
            }
            Step::ProvisionDefaultPolicy => {
                self.provision_default_policy(ctx).await?;

                Ok(Step::CommitNormalState)
            }
            Step::CommitNormalState => {
                self.commit_normal_state(ctx).await?;

                Ok(Step::RecordOwned)
            }
            Step::RecordOwned => {
                self.record_owned(ctx)?;

                Ok(Step::Done)
            }
            Step::Done => Ok(Step::Done),
        }
    }

    fn select_method<T, K, S>(&mut self, ctx: &Ctx<'_, T, K, S>) -> Result<(), Error> {
        let oxm = ctx
            .registry
            .select(ctx.config.method_preference(), &self.device)
            .ok_or_else(|| {
                error!(advertised = ?self.device.doxm.oxms, "no common ownership transfer method");

                Error::new(ErrorKind::Protocol, "no common ownership transfer method")
            })?;

        debug!(%oxm, "ownership transfer method selected");

        self.oxm = Some(oxm);

        Ok(())
    }

    async fn announce_method<T, K, S>(&mut self, ctx: &mut Ctx<'_, T, K, S>) -> Result<(), Error>
    where
        T: Transport,
    {
        let doxm = hooks_for(ctx.registry, self.oxm)?.build_select_payload(&self.device)?;

        let url = resource_url(&self.device, false, DOXM_URI)?;
        let request = Request::with_document(Method::Put, url, &doxm)?;

        exchange(ctx.transport, request)
            .await?
            .expect(ResponseCode::Ok, "announce method")?;

        self.device.doxm = doxm;

        Ok(())
    }

    async fn fetch_status<T, K, S>(&mut self, ctx: &mut Ctx<'_, T, K, S>) -> Result<(), Error>
    where
        T: Transport,
    {
        let url = resource_url(&self.device, false, PSTAT_URI)?;

        let pstat: Pstat = exchange(ctx.transport, Request::new(Method::Get, url))
            .await?
            .expect(ResponseCode::Ok, "fetch status")?
            .document()?;

        if pstat.device_uuid != self.uuid() {
            error!(received = %pstat.device_uuid, "status of another device");

            return Err(Error::new(ErrorKind::Protocol, "status device uuid"));
        }

        debug!(cm = %pstat.cm, tm = %pstat.tm, sm = ?pstat.sm, "status fetched");

        self.device.pstat = Some(pstat);

        Ok(())
    }

    fn pstat(&self) -> Result<&Pstat, Error> {
        self.device
            .pstat
            .as_ref()
            .ok_or(Error::new(ErrorKind::Validation, "status not fetched"))
    }

    fn select_operation_mode<T, K, S>(&mut self, ctx: &Ctx<'_, T, K, S>) -> Result<(), Error> {
        let remote = &self.pstat()?.sm;

        let mode = select_operation_mode(ctx.config.operation_modes(), remote).ok_or_else(|| {
            error!(local = ?ctx.config.operation_modes(), ?remote, "no common operation mode");

            Error::new(ErrorKind::Protocol, "no common operation mode")
        })?;

        debug!(?mode, "operation mode selected");

        self.mode = Some(mode);

        Ok(())
    }

    async fn announce_operation_mode<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        T: Transport,
    {
        let mode = self
            .mode
            .ok_or(Error::new(ErrorKind::Validation, "operation mode not selected"))?;
        let pstat = self.pstat()?.with_operation_mode(mode);

        let url = resource_url(&self.device, false, PSTAT_URI)?;
        let request = Request::with_document(Method::Put, url, &pstat)?;

        exchange(ctx.transport, request)
            .await?
            .expect(ResponseCode::Ok, "announce operation mode")?;

        self.device.pstat = Some(pstat);

        Ok(())
    }

    async fn establish_secure_session<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        T: Transport,
        S: CredentialStore,
    {
        let hooks = hooks_for(ctx.registry, self.oxm)?;

        if let Some(secret) = hooks.load_secret(&self.device, ctx.config.owner())? {
            ctx.creds.save(&secret).await?;

            self.temporary = Some(secret);
        }

        let params = hooks.create_secure_session(&self.device, self.temporary.as_ref())?;

        let session = ctx
            .transport
            .upgrade_to_secure_session(&self.device, &params)
            .await?;

        debug!(cipher = ?session.cipher, "secure session established");

        self.session = Some(session);

        Ok(())
    }

    async fn announce_ownership<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        T: Transport,
        S: CredentialStore,
    {
        let doxm = hooks_for(ctx.registry, self.oxm)?
            .build_ownership_payload(&self.device, ctx.config.owner())?;

        let url = resource_url(&self.device, true, DOXM_URI)?;
        let request = Request::with_document(Method::Put, url, &doxm)?;

        exchange(ctx.transport, request)
            .await?
            .expect(ResponseCode::Ok, "announce ownership")?;

        self.device.doxm = doxm;

        if let Some(secret) = self.temporary.take() {
            ctx.creds.remove(&secret.subject).await?;

            debug!("temporary secret removed");
        }

        Ok(())
    }

    async fn derive_session_credential<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        K: KeyCertService,
        S: CredentialStore,
    {
        let session = self
            .session
            .as_ref()
            .ok_or(Error::new(ErrorKind::Validation, "missing secure session"))?;
        let oxm = self
            .oxm
            .ok_or(Error::new(ErrorKind::Validation, "method not selected"))?;

        let owner = *ctx.config.owner();
        let uuid = self.uuid();

        let psk = ctx.keys.derive_shared_secret(
            session,
            oxm,
            &owner,
            &uuid,
            ctx.config.owner_psk_len(),
        )?;

        ctx.creds
            .save(&Credential::symmetric(uuid, psk, owner))
            .await?;

        Ok(())
    }

    async fn provision_default_policy<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        T: Transport,
    {
        let owner = *ctx.config.owner();
        let acl = Acl::full_access(owner, owner);

        let url = resource_url(&self.device, true, ACL_URI)?;
        let request = Request::with_document(Method::Post, url, &acl)?;

        exchange(ctx.transport, request)
            .await?
            .expect(ResponseCode::Created, "default acl")?;

        Ok(())
    }

    async fn commit_normal_state<T, K, S>(
        &mut self,
        ctx: &mut Ctx<'_, T, K, S>,
    ) -> Result<(), Error>
    where
        T: Transport,
    {
        let pstat = self.pstat()?.finalized();

        let url = resource_url(&self.device, true, PSTAT_URI)?;
        let request = Request::with_document(Method::Put, url, &pstat)?;

        exchange(ctx.transport, request)
            .await?
            .expect(ResponseCode::Ok, "commit normal state")?;

        self.device.pstat = Some(pstat);

        Ok(())
    }

    fn record_owned<T, K, S>(&mut self, ctx: &Ctx<'_, T, K, S>) -> Result<(), Error> {
        ctx.links.add_device(self.device.uuid()).map_err(|err| {
            error!(
                error = %err,
                "ownership transfer is complete but adding the device to the link store failed"
            );

            Error::new(ErrorKind::Consistency, "record owned device")
        })?;

        Ok(())
    }

    /// Releases what a failed transfer left behind.
    async fn abort<T, K, S>(&mut self, ctx: &mut Ctx<'_, T, K, S>)
    where
        T: Transport,
        S: CredentialStore,
    {
        if let Some(secret) = self.temporary.take() {
            if let Err(err) = ctx.creds.remove(&secret.subject).await {
                warn!(error = %err, "couldn't remove temporary secret");
            }
        }

        if self.session.take().is_some() {
            if let Err(err) = ctx.transport.downgrade_session(&self.device).await {
                warn!(error = %err, "couldn't drop secure session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use iotsec_provisioning_protocol::oic::doxm::Doxm;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::link_store::LinkStore;
    use crate::link_store::tests::open_store;
    use crate::oxm::JustWorks;
    use crate::results::tests::capture;
    use crate::sim::Fault;
    use crate::tests::{Fixture, OWNER};
    use crate::transport::SessionParams;

    #[test]
    fn operation_mode_from_unsorted_lists() {
        use OperationMode::*;

        let cases = [
            (
                vec![SingleServiceClientDriven],
                vec![SingleServiceClientDriven, SingleServiceServerDriven],
                Some(SingleServiceClientDriven),
            ),
            (
                vec![SingleServiceClientDriven, MultipleServiceServerDriven],
                vec![SingleServiceClientDriven, SingleServiceServerDriven, MultipleServiceServerDriven],
                Some(MultipleServiceServerDriven),
            ),
            (
                vec![MultipleServiceClientDriven, MultipleServiceClientDriven],
                vec![MultipleServiceClientDriven],
                Some(MultipleServiceClientDriven),
            ),
            (vec![SingleServiceClientDriven], vec![SingleServiceServerDriven], None),
            (vec![], vec![SingleServiceServerDriven], None),
        ];

        for (local, remote, exp) in cases {
            assert_eq!(select_operation_mode(&local, &remote), exp, "{local:?} {remote:?}");
        }
    }

    #[test]
    fn step_display() {
        insta::assert_snapshot!(Step::AnnounceMethod, @"OTM.AnnounceMethod");
    }

    #[tokio::test]
    async fn transfer_with_every_method() {
        let mut fixture = Fixture::new().await;

        let devices = [
            fixture.net.add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]),
            fixture
                .net
                .add_unowned(Uuid::from_u128(2), vec![Oxm::RandomDevicePin]),
            fixture.net.add_unowned(
                Uuid::from_u128(3),
                vec![Oxm::JustWorks, Oxm::ManufacturerCertificate],
            ),
        ];

        let (calls, callback) = capture();
        let batch = begin_ownership_transfer(&mut fixture.ctx(), &devices, callback)
            .await
            .unwrap();

        assert!(!batch.has_error);
        assert_eq!(batch.len(), 3);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0], batch);

        for device in &devices {
            let uuid = device.uuid();

            assert_eq!(batch.code_of(uuid), Some(ResultCode::Ok));
            assert!(fixture.links.is_duplicate(uuid).unwrap());

            let sim = fixture.net.device(uuid).unwrap();
            assert_eq!(sim.doxm.owner_uuid, Some(OWNER));
            assert!(sim.pstat.is_op);
            assert_eq!(sim.pstat.om, OperationMode::SingleServiceClientDriven);
            assert_eq!(sim.session, None);
            assert_eq!(sim.acls, [Acl::full_access(OWNER, OWNER)]);

            let cred = fixture.creds.load(uuid).await.unwrap().unwrap();
            assert_eq!(cred.private_data.len(), 16);
            assert_eq!(cred.owners, [OWNER]);
        }

        assert_eq!(
            fixture.net.device(devices[2].uuid()).unwrap().doxm.oxm_sel,
            Some(Oxm::ManufacturerCertificate)
        );
    }

    #[tokio::test]
    async fn just_works_exchange() {
        let mut fixture = Fixture::new().await;

        let device = fixture.net.add_unowned(
            Uuid::from_u128(0x0123_4567_89ab_4def_8123_4567_89ab_cdef),
            vec![Oxm::JustWorks],
        );

        let (_, callback) = capture();
        let batch = begin_ownership_transfer(&mut fixture.ctx(), &[device], callback)
            .await
            .unwrap();
        assert!(!batch.has_error);

        insta::assert_snapshot!(fixture.net.event_log(), @r"
        PUT coap://10.0.0.1:5683/oic/sec/doxm
        GET coap://10.0.0.1:5683/oic/sec/pstat
        PUT coap://10.0.0.1:5683/oic/sec/pstat
        UPGRADE 01234567-89ab-4def-8123-456789abcdef EcdhAnonAes128CbcSha256
        PUT coaps://10.0.0.1:5684/oic/sec/doxm
        DOWNGRADE 01234567-89ab-4def-8123-456789abcdef
        POST coaps://10.0.0.1:5684/oic/sec/acl
        PUT coaps://10.0.0.1:5684/oic/sec/pstat
        ");
    }

    #[tokio::test]
    async fn failed_device_does_not_stop_the_batch() {
        let mut fixture = Fixture::new().await;

        let refused = fixture
            .net
            .add_unowned(Uuid::from_u128(1), vec![Oxm::RandomDevicePin]);
        let rejected = fixture
            .net
            .add_unowned(Uuid::from_u128(2), vec![Oxm::JustWorks]);
        let good = fixture
            .net
            .add_unowned(Uuid::from_u128(3), vec![Oxm::JustWorks]);

        fixture.net.refuse_sessions(refused.uuid());
        fixture.net.inject(
            *rejected.uuid(),
            Method::Post,
            ACL_URI,
            Fault::Respond(ResponseCode::Unauthorized),
        );

        let devices = [refused.clone(), rejected.clone(), good.clone()];
        let (calls, callback) = capture();
        let batch = begin_ownership_transfer(&mut fixture.ctx(), &devices, callback)
            .await
            .unwrap();

        assert!(batch.has_error);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(batch.code_of(refused.uuid()), Some(ResultCode::CommFailure));
        assert_eq!(batch.code_of(rejected.uuid()), Some(ResultCode::Error));
        assert_eq!(batch.code_of(good.uuid()), Some(ResultCode::Ok));

        // The temporary PIN secret doesn't outlive the failed transfer.
        assert_eq!(fixture.creds.load(refused.uuid()).await.unwrap(), None);
        assert!(!fixture.links.is_duplicate(refused.uuid()).unwrap());
        assert!(!fixture.links.is_duplicate(rejected.uuid()).unwrap());
        assert!(fixture.links.is_duplicate(good.uuid()).unwrap());
    }

    #[tokio::test]
    async fn duplicate_device_is_rejected_before_any_request() {
        let mut fixture = Fixture::new().await;

        let fresh = fixture
            .net
            .add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);
        let known = fixture
            .net
            .add_unowned(Uuid::from_u128(2), vec![Oxm::JustWorks]);
        fixture.links.add_device(known.uuid()).unwrap();

        let (calls, callback) = capture();
        let err = begin_ownership_transfer(&mut fixture.ctx(), &[fresh, known], callback)
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Validation);
        assert_eq!(fixture.net.event_count(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn no_common_method() {
        let mut fixture = Fixture::new().await;
        fixture.config = fixture
            .config
            .clone()
            .with_method_preference(vec![Oxm::ManufacturerCertificate]);

        let device = fixture
            .net
            .add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        let (_, callback) = capture();
        let batch = begin_ownership_transfer(&mut fixture.ctx(), &[device], callback)
            .await
            .unwrap();

        assert!(batch.has_error);
        assert_eq!(batch.code_of(&Uuid::from_u128(1)), Some(ResultCode::Error));
        assert_eq!(fixture.net.event_count(), 0);
    }

    #[tokio::test]
    async fn no_common_operation_mode() {
        let mut fixture = Fixture::new().await;
        fixture.config = fixture
            .config
            .clone()
            .with_operation_modes(vec![OperationMode::MultipleServiceClientDriven]);

        let device = fixture
            .net
            .add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        let (_, callback) = capture();
        let batch = begin_ownership_transfer(&mut fixture.ctx(), &[device], callback)
            .await
            .unwrap();

        assert!(batch.has_error);
        insta::assert_snapshot!(fixture.net.event_log(), @r"
        PUT coap://10.0.0.1:5683/oic/sec/doxm
        GET coap://10.0.0.1:5683/oic/sec/pstat
        ");
    }

    /// Just works, but the device lands in the link store while the ownership is announced.
    struct RecordEarly {
        links: Arc<LinkStore>,
    }

    impl OxmHooks for RecordEarly {
        fn oxm(&self) -> Oxm {
            Oxm::JustWorks
        }

        fn create_secure_session(
            &self,
            device: &Device,
            secret: Option<&Credential>,
        ) -> Result<SessionParams, Error> {
            JustWorks.create_secure_session(device, secret)
        }

        fn build_ownership_payload(&self, device: &Device, owner: &Uuid) -> Result<Doxm, Error> {
            self.links.add_device(device.uuid())?;

            Ok(device.doxm.with_selected(Oxm::JustWorks).owned_by(*owner))
        }
    }

    #[tokio::test]
    async fn record_owned_failure_is_inconsistent() {
        let mut fixture = Fixture::new().await;
        let dir = tempfile::tempdir().unwrap();
        let links = Arc::new(open_store(&dir));
        let registry = OxmRegistry::new().with(RecordEarly {
            links: Arc::clone(&links),
        });

        let device = fixture
            .net
            .add_unowned(Uuid::from_u128(1), vec![Oxm::JustWorks]);

        let mut ctx = Ctx::new(
            &mut fixture.net,
            &mut fixture.keys,
            &links,
            &fixture.creds,
            &fixture.config,
            &registry,
        );

        let (_, callback) = capture();
        let batch = begin_ownership_transfer(&mut ctx, &[device], callback)
            .await
            .unwrap();

        assert!(batch.has_error);
        assert_eq!(
            batch.code_of(&Uuid::from_u128(1)),
            Some(ResultCode::InconsistentDb)
        );
        // The remote side is owned regardless.
        assert!(fixture.net.device(&Uuid::from_u128(1)).unwrap().doxm.owned);
    }
}
