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

//! Credentials kept by the provisioning tool.
//!
//! Holds the owner PSK of every owned device and the temporary secrets used while transferring the
//! ownership.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use iotsec_provisioning_protocol::oic::Resource;
use iotsec_provisioning_protocol::oic::cred::Credential;
use tokio::fs::{DirBuilder, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use zeroize::Zeroizing;

const CRED_EXT: &str = "cred";

/// Stores the local credentials, one per subject.
pub trait CredentialStore: Send + Sync {
    /// Saves the credential, replacing the one of the same subject.
    fn save(&self, credential: &Credential) -> impl Future<Output = Result<(), Error>> + Send;

    /// Loads the credential of the subject, if present.
    fn load(
        &self,
        subject: &Uuid,
    ) -> impl Future<Output = Result<Option<Credential>, Error>> + Send;

    /// Removes the credential of the subject, returns if it was present.
    fn remove(&self, subject: &Uuid) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Subjects of the stored credentials.
    fn subjects(&self) -> impl Future<Output = Result<Vec<Uuid>, Error>> + Send;
}

/// Credentials stored as CBOR files in a directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Opens the directory to use as credential store
    pub async fn open(dir: PathBuf) -> io::Result<Self> {
        let mut builder = DirBuilder::new();
        builder.recursive(true).mode(0o700);

        builder.create(&dir).await?;

        Ok(Self { dir })
    }

    fn path(&self, subject: &Uuid) -> PathBuf {
        self.dir.join(format!("{subject}.{CRED_EXT}"))
    }
}

impl CredentialStore for FileCredentialStore {
    #[instrument(skip(self, credential), fields(subject = %credential.subject))]
    async fn save(&self, credential: &Credential) -> Result<(), Error> {
        let content = Zeroizing::new(credential.encode()?);

        let mut file = File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(self.path(&credential.subject))
            .await
            .map_err(|err| {
                error!(error = %err, "couldn't create file");

                Error::new(ErrorKind::Io, "couldn't create file")
            })?;

        file.write_all(&content).await.map_err(|err| {
            error!(error = %err, "couldn't write to file");

            Error::new(ErrorKind::Io, "couldn't write to file")
        })?;

        file.flush().await.map_err(|err| {
            error!(error = %err, "couldn't flush file");

            Error::new(ErrorKind::Io, "couldn't flush file")
        })?;

        debug!(cred_type = ?credential.cred_type, "credential saved");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, subject: &Uuid) -> Result<Option<Credential>, Error> {
        match tokio::fs::read(self.path(subject)).await {
            Ok(content) => {
                let content = Zeroizing::new(content);

                Credential::decode(&content).map(Some)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                error!(error = %err, "couldn't read file");

                Err(Error::new(ErrorKind::Io, "couldn't read file"))
            }
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, subject: &Uuid) -> Result<bool, Error> {
        match tokio::fs::remove_file(self.path(subject)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                error!(error = %err, "couldn't remove file");

                Err(Error::new(ErrorKind::Io, "couldn't remove file"))
            }
        }
    }

    #[instrument(skip(self))]
    async fn subjects(&self) -> Result<Vec<Uuid>, Error> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|err| {
            error!(error = %err, "couldn't read directory");

            Error::new(ErrorKind::Io, "couldn't read directory")
        })?;

        let mut subjects = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|err| {
            error!(error = %err, "couldn't read directory entry");

            Error::new(ErrorKind::Io, "couldn't read directory entry")
        })? {
            let path = entry.path();

            if path.extension().is_none_or(|ext| ext != CRED_EXT) {
                continue;
            }

            let Some(subject) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                debug!(path = %path.display(), "skipping unknown file");

                continue;
            };

            subjects.push(subject);
        }

        subjects.sort();

        Ok(subjects)
    }
}
