use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Protocol step at which an infrastructure failure happened.
///
/// Each step maps to a stable diagnostic code, returned to the caller and
/// attached to the error log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStep {
    Acquire,
    Expire,
    Lookup,
    Decode,
    Capture,
    Encode,
    Store,
    Release,
}

impl FailureStep {
    pub fn code(&self) -> &'static str {
        match self {
            FailureStep::Acquire => "0x00057",
            FailureStep::Expire => "0x00075",
            FailureStep::Lookup => "0x00095",
            FailureStep::Decode => "0x00106",
            FailureStep::Capture => "0x00118",
            FailureStep::Encode => "0x00124",
            FailureStep::Store => "0x00132",
            FailureStep::Release => "0x00141",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStep::Acquire => "acquire",
            FailureStep::Expire => "expire",
            FailureStep::Lookup => "lookup",
            FailureStep::Decode => "decode",
            FailureStep::Capture => "capture",
            FailureStep::Encode => "encode",
            FailureStep::Store => "store",
            FailureStep::Release => "release",
        }
    }
}

impl fmt::Display for FailureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infrastructure failures of the idempotency protocol.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("coordination store failed during {step}: {source}")]
    Store {
        step: FailureStep,
        #[source]
        source: StoreError,
    },

    #[error("cached response at {key} could not be decoded: {source}")]
    CorruptEntry {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("downstream response could not be captured: {reason}")]
    Capture { reason: String },

    #[error("response snapshot could not be encoded: {reason}")]
    Encode { reason: String },
}

impl IdempotencyError {
    pub fn store(step: FailureStep, source: StoreError) -> Self {
        IdempotencyError::Store { step, source }
    }

    pub fn step(&self) -> FailureStep {
        match self {
            IdempotencyError::Store { step, .. } => *step,
            IdempotencyError::CorruptEntry { .. } => FailureStep::Decode,
            IdempotencyError::Capture { .. } => FailureStep::Capture,
            IdempotencyError::Encode { .. } => FailureStep::Encode,
        }
    }

    pub fn code(&self) -> &'static str {
        self.step().code()
    }
}
