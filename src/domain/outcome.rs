use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::rule::ResolvedEndpoint;

/// Why a single delivery failed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("connection failed: {message}")]
    Connect { message: String },

    #[error("analyzer responded with status {code}")]
    Status { code: u16, body: serde_json::Value },

    #[error("request failed: {message}")]
    Request { message: String },
}

impl DeliveryError {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Timeout { .. })
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered { code: u16, body: serde_json::Value },
    Failed { error: DeliveryError },
}

impl DeliveryStatus {
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered { .. })
    }
}

/// Outcome of delivering the payload to one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub endpoint: ResolvedEndpoint,
    pub status: DeliveryStatus,
    pub elapsed_ms: u64,
}

impl DeliveryOutcome {
    pub fn delivered(endpoint: ResolvedEndpoint, code: u16, body: serde_json::Value, elapsed_ms: u64) -> Self {
        DeliveryOutcome {
            endpoint,
            status: DeliveryStatus::Delivered { code, body },
            elapsed_ms,
        }
    }

    pub fn failed(endpoint: ResolvedEndpoint, error: DeliveryError, elapsed_ms: u64) -> Self {
        DeliveryOutcome {
            endpoint,
            status: DeliveryStatus::Failed { error },
            elapsed_ms,
        }
    }

    #[inline]
    pub fn is_delivered(&self) -> bool {
        self.status.is_delivered()
    }
}

/// Overall status of a dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialFailure,
    Failure,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::PartialFailure => write!(f, "partial_failure"),
            OverallStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Aggregated result returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub dispatch_id: Uuid,
    pub overall_status: OverallStatus,
    #[serde(rename = "forwarded_responses")]
    pub outcomes: Vec<DeliveryOutcome>,
    /// Deliveries still in flight when the request deadline elapsed.
    pub abandoned: usize,
    pub completed_at: DateTime<Utc>,
}

impl DispatchResult {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    /// True when the request deadline cut the fan-out short.
    pub fn is_incomplete(&self) -> bool {
        self.abandoned > 0
    }
}
