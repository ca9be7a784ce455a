use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use crate::config::DeliveryPolicy;
use crate::domain::{DeliveryOutcome, DispatchResult, OverallStatus};

use super::fanout::FanOut;

/// Overall status for a set of outcomes plus deliveries abandoned at the deadline.
///
/// - no endpoints at all, or nothing delivered: `Failure`
/// - every endpoint delivered: `Success`
/// - anything in between: `PartialFailure`
pub fn overall_status(outcomes: &[DeliveryOutcome], abandoned: usize) -> OverallStatus {
    let total = outcomes.len() + abandoned;
    let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();

    if total == 0 || delivered == 0 {
        OverallStatus::Failure
    } else if delivered == total {
        OverallStatus::Success
    } else {
        OverallStatus::PartialFailure
    }
}

/// Reduce a fan-out into the result returned to the caller.
pub fn aggregate(dispatch_id: Uuid, fan_out: FanOut) -> DispatchResult {
    DispatchResult {
        dispatch_id,
        overall_status: overall_status(&fan_out.outcomes, fan_out.abandoned),
        outcomes: fan_out.outcomes,
        abandoned: fan_out.abandoned,
        completed_at: Utc::now(),
    }
}

/// Apply the configured delivery policy to an aggregated result.
///
/// Under `FireAndContinue` the outcomes are dropped and the dispatch is
/// reported as a success once every attempt has finished.
pub fn apply_policy(result: DispatchResult, policy: DeliveryPolicy) -> DispatchResult {
    match policy {
        DeliveryPolicy::Collect => result,
        DeliveryPolicy::FireAndContinue => DispatchResult {
            overall_status: OverallStatus::Success,
            outcomes: Vec::new(),
            abandoned: 0,
            ..result
        },
    }
}

/// HTTP status for a completed dispatch.
pub fn status_code(result: &DispatchResult) -> StatusCode {
    match result.overall_status {
        OverallStatus::Success | OverallStatus::PartialFailure => StatusCode::OK,
        OverallStatus::Failure if result.outcomes.is_empty() && result.abandoned > 0 => {
            StatusCode::GATEWAY_TIMEOUT
        }
        OverallStatus::Failure => StatusCode::BAD_GATEWAY,
    }
}

/// Human-readable summary placed in the response `reason` field.
pub fn reason(result: &DispatchResult) -> String {
    let mut reason = match result.overall_status {
        OverallStatus::Success => "Success".to_string(),
        OverallStatus::PartialFailure => format!(
            "PartialFailure: {} of {} deliveries failed",
            result.failed_count() + result.abandoned,
            result.outcomes.len() + result.abandoned
        ),
        OverallStatus::Failure => format!(
            "Failure: all {} deliveries failed",
            result.outcomes.len() + result.abandoned
        ),
    };

    if result.abandoned > 0 {
        reason.push_str(&format!(" ({} abandoned at deadline)", result.abandoned));
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, DeliveryError, ResolvedEndpoint};

    fn endpoint(rule: &str) -> ResolvedEndpoint {
        ResolvedEndpoint {
            category: Category::Sqli,
            rule_name: rule.to_string(),
            url: format!("http://analyzer:9947/sqlis/{}", rule),
        }
    }

    fn ok(rule: &str) -> DeliveryOutcome {
        DeliveryOutcome::delivered(endpoint(rule), 200, serde_json::Value::Null, 1)
    }

    fn timed_out(rule: &str) -> DeliveryOutcome {
        DeliveryOutcome::failed(endpoint(rule), DeliveryError::Timeout { after_ms: 100 }, 100)
    }

    fn fan_out(outcomes: Vec<DeliveryOutcome>, abandoned: usize) -> FanOut {
        FanOut {
            outcomes,
            abandoned,
        }
    }

    #[test]
    fn test_all_delivered_is_success() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![ok("a"), ok("b")], 0));

        assert_eq!(result.overall_status, OverallStatus::Success);
        assert_eq!(status_code(&result), StatusCode::OK);
        assert_eq!(reason(&result), "Success");
    }

    #[test]
    fn test_all_failed_is_failure() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![timed_out("a"), timed_out("b")], 0));

        assert_eq!(result.overall_status, OverallStatus::Failure);
        assert_eq!(status_code(&result), StatusCode::BAD_GATEWAY);
        assert_eq!(reason(&result), "Failure: all 2 deliveries failed");
    }

    #[test]
    fn test_mixed_is_partial_failure() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![timed_out("a"), ok("b")], 0));

        assert_eq!(result.overall_status, OverallStatus::PartialFailure);
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(status_code(&result), StatusCode::OK);
        assert_eq!(reason(&result), "PartialFailure: 1 of 2 deliveries failed");
    }

    #[test]
    fn test_empty_is_failure() {
        assert_eq!(overall_status(&[], 0), OverallStatus::Failure);
    }

    #[test]
    fn test_abandoned_counts_against_success() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![ok("a")], 1));

        assert_eq!(result.overall_status, OverallStatus::PartialFailure);
        assert!(result.is_incomplete());
        assert_eq!(
            reason(&result),
            "PartialFailure: 1 of 2 deliveries failed (1 abandoned at deadline)"
        );

        let result = aggregate(Uuid::new_v4(), fan_out(Vec::new(), 3));
        assert_eq!(result.overall_status, OverallStatus::Failure);
        assert_eq!(status_code(&result), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_fire_and_continue_reports_success() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![timed_out("a"), ok("b")], 0));
        let result = apply_policy(result, DeliveryPolicy::FireAndContinue);

        assert_eq!(result.overall_status, OverallStatus::Success);
        assert!(result.outcomes.is_empty());
        assert_eq!(status_code(&result), StatusCode::OK);
    }

    #[test]
    fn test_collect_policy_is_identity() {
        let result = aggregate(Uuid::new_v4(), fan_out(vec![timed_out("a")], 0));
        let id = result.dispatch_id;
        let result = apply_policy(result, DeliveryPolicy::Collect);

        assert_eq!(result.dispatch_id, id);
        assert_eq!(result.overall_status, OverallStatus::Failure);
        assert_eq!(result.outcomes.len(), 1);
    }
}
