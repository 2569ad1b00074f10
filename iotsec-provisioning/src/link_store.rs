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

//! Persistent relation of owned devices and their pairwise links.
//!
//! Devices get a surrogate integer id the first time they are owned. A link between two devices is
//! stored once, under the canonical `(low, high)` pair of their ids, so lookups don't depend on the
//! order of the arguments.

use std::fmt::Display;
use std::path::Path;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use redb::{Database, ReadOnlyTable, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// Default file name of the link store.
pub const DEFAULT_DB_FILE: &str = "provisioning.redb";

const DEVICES: TableDefinition<u64, &[u8]> = TableDefinition::new("devices");
const DEVICE_IDS: TableDefinition<&[u8], u64> = TableDefinition::new("device_ids");
const LINKS: TableDefinition<(u64, u64), u8> = TableDefinition::new("links");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_DEVICE_ID: &str = "next_device_id";

/// State of a pairwise link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkState {
    /// Both devices hold the pairwise credential.
    Active = 0,
    /// Removal in flight, or failed and waiting for reconciliation.
    Stale = 1,
}

impl TryFrom<u8> for LinkState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LinkState::Active),
            1 => Ok(LinkState::Stale),
            _ => Err(Error::new(ErrorKind::Store, "unknown link state")),
        }
    }
}

fn store_err<E>(ctx: &'static str) -> impl FnOnce(E) -> Error
where
    E: Display,
{
    move |err| {
        error!(error = %err, "couldn't {ctx}");

        Error::new(ErrorKind::Store, ctx)
    }
}

fn canonical(a: u64, b: u64) -> (u64, u64) {
    if a <= b { (a, b) } else { (b, a) }
}

fn decode_uuid(bytes: &[u8]) -> Result<Uuid, Error> {
    Uuid::from_slice(bytes).map_err(store_err("decode stored uuid"))
}

/// Owned devices and pairwise links, persisted with [`redb`].
pub struct LinkStore {
    db: Database,
}

impl std::fmt::Debug for LinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStore").finish_non_exhaustive()
    }
}

impl LinkStore {
    /// Opens the store at the given path, creating the tables if missing.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self, Error> {
        let db = Database::create(path).map_err(store_err("open link store"))?;

        let this = Self { db };

        this.write("create link store tables", |txn| {
            txn.open_table(DEVICES)
                .map_err(store_err("open devices table"))?;
            txn.open_table(DEVICE_IDS)
                .map_err(store_err("open device ids table"))?;
            txn.open_table(LINKS).map_err(store_err("open links table"))?;
            txn.open_table(META).map_err(store_err("open meta table"))?;

            Ok(())
        })?;

        debug!(path = %path.display(), "link store opened");

        Ok(this)
    }

    /// Runs the closure in a write transaction.
    ///
    /// The transaction is committed only if the closure succeeds, otherwise it's aborted and the
    /// store is left in its prior state.
    fn write<T, F>(&self, ctx: &'static str, f: F) -> Result<T, Error>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, Error>,
    {
        let txn = self.db.begin_write().map_err(store_err(ctx))?;

        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(store_err(ctx))?;

                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = txn.abort() {
                    error!(error = %abort, "couldn't abort transaction");
                }

                Err(err)
            }
        }
    }

    fn id_in(txn: &WriteTransaction, uuid: &Uuid) -> Result<u64, Error> {
        let ids = txn
            .open_table(DEVICE_IDS)
            .map_err(store_err("open device ids table"))?;

        let id = ids
            .get(uuid.as_bytes().as_slice())
            .map_err(store_err("read device id"))?
            .map(|id| id.value());

        id.ok_or_else(|| {
            error!(%uuid, "device not found in link store");

            Error::new(ErrorKind::Validation, "device not found")
        })
    }

    fn pair_in(txn: &WriteTransaction, a: &Uuid, b: &Uuid) -> Result<(u64, u64), Error> {
        let a = Self::id_in(txn, a)?;
        let b = Self::id_in(txn, b)?;

        Ok(canonical(a, b))
    }

    /// Adds an owned device.
    ///
    /// Fails with [`ErrorKind::Validation`] if the UUID is already present.
    #[instrument(skip(self))]
    pub fn add_device(&self, uuid: &Uuid) -> Result<u64, Error> {
        self.write("add device", |txn| {
            let mut ids = txn
                .open_table(DEVICE_IDS)
                .map_err(store_err("open device ids table"))?;

            let duplicate = ids
                .get(uuid.as_bytes().as_slice())
                .map_err(store_err("read device id"))?
                .is_some();

            if duplicate {
                error!("duplicate device uuid");

                return Err(Error::new(ErrorKind::Validation, "duplicate uuid"));
            }

            let mut meta = txn.open_table(META).map_err(store_err("open meta table"))?;
            let id = meta
                .get(NEXT_DEVICE_ID)
                .map_err(store_err("read next device id"))?
                .map_or(1, |id| id.value());
            meta.insert(NEXT_DEVICE_ID, id.saturating_add(1))
                .map_err(store_err("write next device id"))?;

            ids.insert(uuid.as_bytes().as_slice(), id)
                .map_err(store_err("write device id"))?;

            let mut devices = txn
                .open_table(DEVICES)
                .map_err(store_err("open devices table"))?;
            devices
                .insert(id, uuid.as_bytes().as_slice())
                .map_err(store_err("write device"))?;

            debug!(id, "device added");

            Ok(id)
        })
    }

    /// Checks if the device is already owned.
    pub fn is_duplicate(&self, uuid: &Uuid) -> Result<bool, Error> {
        match self.device_id(uuid) {
            Ok(_) => Ok(true),
            Err(err) if *err.kind() == ErrorKind::Validation => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns the surrogate id of the device.
    ///
    /// Fails with [`ErrorKind::Validation`] if the device is unknown.
    pub fn device_id(&self, uuid: &Uuid) -> Result<u64, Error> {
        let txn = self
            .db
            .begin_read()
            .map_err(store_err("begin read transaction"))?;
        let ids = txn
            .open_table(DEVICE_IDS)
            .map_err(store_err("open device ids table"))?;

        let id = ids
            .get(uuid.as_bytes().as_slice())
            .map_err(store_err("read device id"))?
            .map(|id| id.value());

        id.ok_or(Error::new(ErrorKind::Validation, "device not found"))
    }

    /// Deletes the device.
    ///
    /// The links touching the device are kept.
    #[instrument(skip(self))]
    pub fn delete_device(&self, uuid: &Uuid) -> Result<(), Error> {
        self.write("delete device", |txn| {
            let id = Self::id_in(txn, uuid)?;

            let mut ids = txn
                .open_table(DEVICE_IDS)
                .map_err(store_err("open device ids table"))?;
            ids.remove(uuid.as_bytes().as_slice())
                .map_err(store_err("remove device id"))?;

            let mut devices = txn
                .open_table(DEVICES)
                .map_err(store_err("open devices table"))?;
            devices.remove(id).map_err(store_err("remove device"))?;

            Ok(())
        })
    }

    /// Creates an active link between the two devices.
    #[instrument(skip(self))]
    pub fn link(&self, a: &Uuid, b: &Uuid) -> Result<(), Error> {
        self.write("link devices", |txn| {
            let pair = Self::pair_in(txn, a, b)?;

            if pair.0 == pair.1 {
                return Err(Error::new(ErrorKind::Validation, "device linked to itself"));
            }

            let mut links = txn.open_table(LINKS).map_err(store_err("open links table"))?;

            let exists = links
                .get(pair)
                .map_err(store_err("read link"))?
                .is_some();

            if exists {
                error!(?pair, "link already exists");

                return Err(Error::new(ErrorKind::Validation, "link already exists"));
            }

            links
                .insert(pair, LinkState::Active as u8)
                .map_err(store_err("write link"))?;

            Ok(())
        })
    }

    /// Deletes the link between the two devices.
    #[instrument(skip(self))]
    pub fn unlink(&self, a: &Uuid, b: &Uuid) -> Result<(), Error> {
        self.write("unlink devices", |txn| {
            let pair = Self::pair_in(txn, a, b)?;

            let mut links = txn.open_table(LINKS).map_err(store_err("open links table"))?;
            let removed = links
                .remove(pair)
                .map_err(store_err("remove link"))?
                .is_some();

            if !removed {
                debug!(?pair, "link already removed");
            }

            Ok(())
        })
    }

    /// Marks the link between the two devices as stale.
    #[instrument(skip(self))]
    pub fn set_stale(&self, a: &Uuid, b: &Uuid) -> Result<(), Error> {
        self.write("set link stale", |txn| {
            let pair = Self::pair_in(txn, a, b)?;

            let mut links = txn.open_table(LINKS).map_err(store_err("open links table"))?;

            let exists = links
                .get(pair)
                .map_err(store_err("read link"))?
                .is_some();

            if !exists {
                debug!(?pair, "no link to mark as stale");

                return Ok(());
            }

            links
                .insert(pair, LinkState::Stale as u8)
                .map_err(store_err("write link"))?;

            Ok(())
        })
    }

    /// Returns the state of the link between the two devices, if any.
    pub fn link_state(&self, a: &Uuid, b: &Uuid) -> Result<Option<LinkState>, Error> {
        let pair = canonical(self.device_id(a)?, self.device_id(b)?);

        let txn = self
            .db
            .begin_read()
            .map_err(store_err("begin read transaction"))?;
        let links = txn.open_table(LINKS).map_err(store_err("open links table"))?;

        let state = links
            .get(pair)
            .map_err(store_err("read link"))?
            .map(|state| state.value());

        state.map(LinkState::try_from).transpose()
    }

    /// Checks if the two devices are linked, in any state.
    pub fn link_exists(&self, a: &Uuid, b: &Uuid) -> Result<bool, Error> {
        self.link_state(a, b).map(|state| state.is_some())
    }

    fn uuid_of(devices: &ReadOnlyTable<u64, &'static [u8]>, id: u64) -> Result<Uuid, Error> {
        let guard = devices
            .get(id)
            .map_err(store_err("read device"))?
            .ok_or(Error::new(ErrorKind::Store, "linked device missing"))?;

        decode_uuid(guard.value())
    }

    /// Returns the devices linked to the given one.
    pub fn linked(&self, uuid: &Uuid) -> Result<Vec<Uuid>, Error> {
        let id = self.device_id(uuid)?;

        let txn = self
            .db
            .begin_read()
            .map_err(store_err("begin read transaction"))?;
        let links = txn.open_table(LINKS).map_err(store_err("open links table"))?;
        let devices = txn
            .open_table(DEVICES)
            .map_err(store_err("open devices table"))?;

        let mut linked = Vec::new();
        for entry in links.iter().map_err(store_err("iterate links"))? {
            let (pair, _) = entry.map_err(store_err("read link"))?;
            let (low, high) = pair.value();

            let other = if low == id {
                high
            } else if high == id {
                low
            } else {
                continue;
            };

            match Self::uuid_of(&devices, other) {
                Ok(uuid) => linked.push(uuid),
                Err(err) => {
                    error!(error = %err, other, "skipping link to deleted device");
                }
            }
        }

        Ok(linked)
    }

    /// Returns every owned device.
    pub fn owned(&self) -> Result<Vec<Uuid>, Error> {
        let txn = self
            .db
            .begin_read()
            .map_err(store_err("begin read transaction"))?;
        let devices = txn
            .open_table(DEVICES)
            .map_err(store_err("open devices table"))?;

        devices
            .iter()
            .map_err(store_err("iterate devices"))?
            .map(|entry| {
                let (_, uuid) = entry.map_err(store_err("read device"))?;

                decode_uuid(uuid.value())
            })
            .collect()
    }

    /// Returns the stale links, as pairs of device UUIDs.
    ///
    /// A side whose device was deleted from the store is reported as the nil UUID, so the link
    /// stays visible for reconciliation.
    pub fn stale_links(&self) -> Result<Vec<(Uuid, Uuid)>, Error> {
        let txn = self
            .db
            .begin_read()
            .map_err(store_err("begin read transaction"))?;
        let links = txn.open_table(LINKS).map_err(store_err("open links table"))?;
        let devices = txn
            .open_table(DEVICES)
            .map_err(store_err("open devices table"))?;

        let mut stale = Vec::new();
        for entry in links.iter().map_err(store_err("iterate links"))? {
            let (pair, state) = entry.map_err(store_err("read link"))?;

            if LinkState::try_from(state.value())? != LinkState::Stale {
                continue;
            }

            let (low, high) = pair.value();

            let [low, high] = [low, high].map(|id| {
                Self::uuid_of(&devices, id).unwrap_or_else(|err| {
                    error!(error = %err, id, "stale link to deleted device");

                    Uuid::nil()
                })
            });

            stale.push((low, high));
        }

        Ok(stale)
    }
}
