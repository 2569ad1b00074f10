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

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{WrapErr, bail};
use iotsec_provisioning::device::Device;
use iotsec_provisioning::iotsec_provisioning_protocol::oic::acl::{Acl, Permission};
use iotsec_provisioning::iotsec_provisioning_protocol::oic::oxm::Oxm;
use iotsec_provisioning::keycert::SoftwareKeyCert;
use iotsec_provisioning::link_store::DEFAULT_DB_FILE;
use iotsec_provisioning::sim::SimNetwork;
use iotsec_provisioning::{
    BatchResult, CredentialKind, CredentialStore, FileCredentialStore, LinkStore, OxmRegistry,
    Provisioning, ProvisioningConfig, RemoveStatus,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

const OWNER_FILE: &str = "owner";
const CREDS_DIR: &str = "creds";
const LIGHT_URI: &str = "/a/light";

type SimProvisioning = Provisioning<SimNetwork, SoftwareKeyCert, FileCredentialStore>;

#[derive(Debug, Parser)]
struct Cli {
    /// Directory of the link store and of the local credentials
    #[arg(long, default_value = ".tmp/iotsec")]
    store_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Runs every flow against a simulated network
    Demo {
        /// Number of simulated devices
        #[arg(long, default_value_t = 4)]
        devices: usize,

        /// Discovery wait, in seconds
        #[arg(long)]
        wait: Option<u64>,

        /// Transfer every device with the random PIN method
        #[arg(long)]
        pin: bool,
    },
    /// Prints the content of the stores
    Inspect,
}

/// Reads the UUID of this tool, creating it on the first run.
async fn owner_uuid(store_dir: &Path) -> eyre::Result<Uuid> {
    let path = store_dir.join(OWNER_FILE);

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Uuid::parse_str(content.trim()).wrap_err("invalid owner file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let owner = Uuid::new_v4();

            tokio::fs::write(&path, owner.to_string()).await?;

            info!(%owner, "owner created");

            Ok(owner)
        }
        Err(err) => Err(err).wrap_err("couldn't read owner file"),
    }
}

fn log_batch(operation: &'static str) -> impl FnOnce(&BatchResult) {
    move |batch: &BatchResult| {
        for result in &batch.results {
            info!(operation, device = %result.device, code = %result.code);
        }

        if batch.has_error {
            warn!(operation, "completed with errors");
        }
    }
}

fn read_acl(subject: &Device, owner: Uuid) -> Acl {
    Acl {
        subject: *subject.uuid(),
        resources: vec![LIGHT_URI.to_string()],
        permission: Permission::READ,
        owners: vec![owner],
    }
}

async fn demo(
    provisioning: &mut SimProvisioning,
    net: &SimNetwork,
    devices: usize,
    wait: Duration,
    pin: bool,
) -> eyre::Result<()> {
    let oxms: &[Oxm] = if pin {
        &[Oxm::RandomDevicePin]
    } else {
        &Oxm::ALL
    };

    for i in 0..devices {
        let oxm = oxms[i % oxms.len()];

        net.add_unowned(Uuid::new_v4(), vec![oxm]);
    }

    let unowned = provisioning.discover(wait, false).await?;
    if unowned.is_empty() {
        bail!("no unowned devices found");
    }

    provisioning
        .begin_ownership_transfer(&unowned, log_batch("ownership transfer"))
        .await?;

    let owner = *provisioning.config().owner();
    let owned: Vec<Device> = provisioning
        .discover(wait, true)
        .await?
        .into_iter()
        .filter(|dev| dev.doxm.owner_uuid == Some(owner))
        .collect();

    let [first, second, ..] = owned.as_slice() else {
        info!(owned = owned.len(), "not enough devices to pair");

        return Ok(());
    };

    for pair in owned.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);

        let acl_a = read_acl(b, owner);
        let acl_b = read_acl(a, owner);

        provisioning
            .provision_pairwise_devices(
                CredentialKind::SymmetricPairwise,
                128,
                a,
                Some(&acl_a),
                b,
                Some(&acl_b),
                log_batch("pairwise provisioning"),
            )
            .await?;
    }

    for device in &owned {
        let linked = provisioning.linked_devices(device.uuid())?;

        info!(device = %device.uuid(), ?linked, "linked devices");
    }

    provisioning
        .unlink(first, second, log_batch("unlink"))
        .await?;

    let target = owned.last().map_or(*second.uuid(), |dev| *dev.uuid());
    match provisioning
        .remove(wait, &target, log_batch("remove"))
        .await?
    {
        RemoveStatus::NoLinkedDevices => info!(%target, "removed, no linked devices"),
        RemoveStatus::NoReachableDevices => warn!(%target, "removed, linked devices unreachable"),
        RemoveStatus::Completed(batch) => {
            info!(%target, devices = batch.len(), error = batch.has_error, "removed")
        }
    }

    let inventory = provisioning.network_inventory(wait).await?;
    for device in &inventory.owned {
        info!(device = %device.uuid(), status = ?device.status, "owned");
    }

    Ok(())
}

async fn inspect(provisioning: &SimProvisioning) -> eyre::Result<()> {
    info!(owner = %provisioning.config().owner());

    for device in provisioning.owned_devices()? {
        let linked = provisioning.linked_devices(&device)?;

        info!(%device, ?linked, "owned device");
    }

    for (a, b) in provisioning.stale_links()? {
        warn!(%a, %b, "stale link");
    }

    let subjects = provisioning.credentials().subjects().await?;
    info!(?subjects, "local credentials");

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .try_init()?;

    tokio::fs::create_dir_all(&cli.store_dir).await?;

    let owner = owner_uuid(&cli.store_dir).await?;

    let links = LinkStore::open(&cli.store_dir.join(DEFAULT_DB_FILE))?;
    let creds = FileCredentialStore::open(cli.store_dir.join(CREDS_DIR)).await?;
    let net = SimNetwork::new();

    let mut provisioning = Provisioning::new(
        net.clone(),
        SoftwareKeyCert::new()?,
        links,
        creds,
        ProvisioningConfig::new(owner),
        OxmRegistry::with_defaults(net.pin_provider()),
    );

    match cli.command {
        Command::Demo { devices, wait, pin } => {
            let wait = wait
                .map(Duration::from_secs)
                .unwrap_or(provisioning.config().discovery_timeout());

            demo(&mut provisioning, &net, devices, wait, pin).await?;
        }
        Command::Inspect => inspect(&provisioning).await?,
    }

    Ok(())
}
