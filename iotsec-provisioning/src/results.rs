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

//! Per-device results of a batch operation.

use std::fmt::Display;

use iotsec_provisioning_protocol::Error;
use iotsec_provisioning_protocol::error::ErrorKind;
use tracing::debug;
use uuid::Uuid;

/// Outcome of a single device or pair step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Completed.
    Ok,
    /// The remote resource was created.
    ResourceCreated,
    /// The remote resource was deleted.
    ResourceDeleted,
    /// Nothing to do.
    Continue,
    /// Invalid input.
    InvalidParam,
    /// Generic failure.
    Error,
    /// The remote operation succeeded, but the link store couldn't be updated.
    InconsistentDb,
    /// The device refused the request.
    Unauthorized,
    /// The resource doesn't exist on the device.
    NoResource,
    /// Couldn't reach the device.
    CommFailure,
}

impl ResultCode {
    /// Checks if the code represents a successful step.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResultCode::Ok | ResultCode::ResourceCreated | ResultCode::ResourceDeleted
        )
    }
}

impl From<&Error> for ResultCode {
    fn from(value: &Error) -> Self {
        match value.kind() {
            ErrorKind::Validation => ResultCode::InvalidParam,
            ErrorKind::Consistency => ResultCode::InconsistentDb,
            ErrorKind::Transport => ResultCode::CommFailure,
            ErrorKind::Protocol
            | ErrorKind::ResourceExhaustion
            | ErrorKind::Store
            | ErrorKind::Encode
            | ErrorKind::Decode
            | ErrorKind::Crypto
            | ErrorKind::Io => ResultCode::Error,
        }
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Ok => "ok",
            ResultCode::ResourceCreated => "resource created",
            ResultCode::ResourceDeleted => "resource deleted",
            ResultCode::Continue => "continue",
            ResultCode::InvalidParam => "invalid param",
            ResultCode::Error => "error",
            ResultCode::InconsistentDb => "inconsistent db",
            ResultCode::Unauthorized => "unauthorized",
            ResultCode::NoResource => "no resource",
            ResultCode::CommFailure => "communication failure",
        };

        write!(f, "{name}")
    }
}

/// Result slot of a single device.
///
/// A slot with the nil UUID reports a link store update that failed after the remote side
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionResult {
    /// Device the result refers to.
    pub device: Uuid,
    /// Outcome.
    pub code: ResultCode,
}

/// Results of a batch, passed to the user callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// One slot per step, in completion order.
    pub results: Vec<ProvisionResult>,
    /// Whether any slot failed.
    pub has_error: bool,
}

impl BatchResult {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Checks if no slot was recorded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the code recorded for the device, if any.
    pub fn code_of(&self, device: &Uuid) -> Option<ResultCode> {
        self.results
            .iter()
            .find(|result| result.device == *device)
            .map(|result| result.code)
    }
}

/// Accumulates the results of a batch and invokes the callback once.
pub struct ResultCollector<F> {
    batch: BatchResult,
    callback: F,
}

impl<F> ResultCollector<F>
where
    F: FnOnce(&BatchResult),
{
    /// Creates an empty collector.
    pub fn new(callback: F) -> Self {
        Self {
            batch: BatchResult::default(),
            callback,
        }
    }

    /// Records the outcome for a device.
    pub fn record(&mut self, device: Uuid, code: ResultCode) {
        debug!(%device, %code, "result recorded");

        self.batch.has_error |= !code.is_success();
        self.batch.results.push(ProvisionResult { device, code });
    }

    /// Records a failure for a device.
    pub fn record_error(&mut self, device: Uuid, error: &Error) {
        self.record(device, ResultCode::from(error));
    }

    /// Records a link store failure after a completed remote operation.
    pub fn record_inconsistent(&mut self) {
        self.record(Uuid::nil(), ResultCode::InconsistentDb);
    }

    /// Whether any slot failed so far.
    pub fn has_error(&self) -> bool {
        self.batch.has_error
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Checks if no slot was recorded.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Invokes the callback with the collected results and returns them.
    pub fn finish(self) -> BatchResult {
        let Self { batch, callback } = self;

        debug!(len = batch.len(), has_error = batch.has_error, "batch finished");

        callback(&batch);

        batch
    }
}

impl<F> std::fmt::Debug for ResultCollector<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCollector")
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Callback that stores every invocation.
    pub(crate) fn capture() -> (Rc<RefCell<Vec<BatchResult>>>, impl FnOnce(&BatchResult)) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&calls);

        (calls, move |batch: &BatchResult| {
            inner.borrow_mut().push(batch.clone())
        })
    }

    #[test]
    fn success_codes() {
        let codes = [
            ResultCode::Ok,
            ResultCode::ResourceCreated,
            ResultCode::ResourceDeleted,
            ResultCode::Continue,
            ResultCode::InvalidParam,
            ResultCode::Error,
            ResultCode::InconsistentDb,
            ResultCode::Unauthorized,
            ResultCode::NoResource,
            ResultCode::CommFailure,
        ]
        .map(|code| format!("{code}: {}", code.is_success()))
        .join("\n");

        insta::assert_snapshot!(codes, @r"
        ok: true
        resource created: true
        resource deleted: true
        continue: false
        invalid param: false
        error: false
        inconsistent db: false
        unauthorized: false
        no resource: false
        communication failure: false
        ");
    }

    #[test]
    fn error_kind_to_code() {
        let err = Error::new(ErrorKind::Consistency, "link store diverged");
        assert_eq!(ResultCode::from(&err), ResultCode::InconsistentDb);

        let err = Error::new(ErrorKind::Transport, "unreachable");
        assert_eq!(ResultCode::from(&err), ResultCode::CommFailure);

        let err = Error::new(ErrorKind::Protocol, "unexpected response");
        assert_eq!(ResultCode::from(&err), ResultCode::Error);
    }

    #[test]
    fn collector_calls_back_once() {
        let (calls, callback) = capture();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);

        let mut collector = ResultCollector::new(callback);
        collector.record(a, ResultCode::ResourceCreated);
        assert!(!collector.has_error());

        collector.record(b, ResultCode::Unauthorized);
        assert!(collector.has_error());

        // A later success doesn't clear the error flag.
        collector.record(b, ResultCode::Ok);

        let batch = collector.finish();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], batch);
        assert_eq!(batch.len(), 3);
        assert!(batch.has_error);
        assert_eq!(batch.code_of(&a), Some(ResultCode::ResourceCreated));
    }

    #[test]
    fn inconsistent_slot_uses_nil_uuid() {
        let mut collector = ResultCollector::new(|_: &BatchResult| {});

        collector.record_inconsistent();

        let batch = collector.finish();

        assert_eq!(
            batch.results,
            [ProvisionResult {
                device: Uuid::nil(),
                code: ResultCode::InconsistentDb
            }]
        );
        assert!(batch.has_error);
    }
}
