use serde::Serialize;

use crate::dispatch::{aggregator, DispatchError};
use crate::domain::{Category, DispatchResult, OverallStatus};

/// Value of the `type` field on every forward response.
pub const RESPONSE_TYPE: &str = "forwarders";

/// Response to a forward request.
#[derive(Debug, Serialize)]
pub struct ForwardResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,

    /// Overall dispatch status
    pub status: OverallStatus,

    /// Dispatch details; absent when the request never reached delivery
    pub data: Option<DispatchResult>,

    /// Human-readable summary
    pub reason: String,

    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl ForwardResponse {
    /// Build a response from a completed dispatch.
    pub fn from_result(result: DispatchResult) -> Self {
        ForwardResponse {
            kind: RESPONSE_TYPE,
            status: result.overall_status,
            reason: aggregator::reason(&result),
            data: Some(result),
            code: None,
        }
    }

    /// Build a response for a dispatch rejected before delivery.
    pub fn from_error(error: &DispatchError) -> Self {
        ForwardResponse {
            kind: RESPONSE_TYPE,
            status: OverallStatus::Failure,
            data: None,
            reason: error.to_string(),
            code: Some(error.code()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub registry_reachable: bool,
    pub categories: Vec<Category>,
}
