//! QR check-in flow.
//!
//! A scan is turned into a branch id, paired with the member's own QR
//! identity and sent to the backend. Only one attempt is live at a time:
//! scans arriving while an attempt is in flight, or while a finished attempt
//! waits for the user to retry or close, are ignored.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use shared::BranchQrPayload;
use uuid::Uuid;

use crate::error::CheckInError;
use crate::services::CheckInService;
use crate::session::SessionStore;

const CHECKIN_PAYLOAD_KIND: &str = "checkin";

/// Resolve the branch id carried by a scanned QR payload.
///
/// A JSON object must carry a non-empty `branchId`; any other text is taken
/// verbatim (trimmed) as the branch id.
pub fn resolve_branch(raw: &str, now: DateTime<Utc>) -> Result<String, CheckInError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(CheckInError::InvalidPayload);
    }

    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => return Ok(text.to_string()),
    };

    let payload: BranchQrPayload =
        serde_json::from_value(value).map_err(|_| CheckInError::InvalidPayload)?;

    if let Some(kind) = payload.kind.as_deref() {
        if kind != CHECKIN_PAYLOAD_KIND {
            return Err(CheckInError::InvalidPayload);
        }
    }
    if let Some(expires_at) = payload.expires_at {
        if expires_at <= now {
            return Err(CheckInError::ExpiredPayload);
        }
    }

    match payload.branch_id {
        Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => Err(CheckInError::InvalidPayload),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Pending,
    Succeeded {
        check_in_id: String,
        checked_in_at: DateTime<Utc>,
        branch_name: String,
    },
    Failed(CheckInError),
}

/// One scan and what became of it
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInAttempt {
    pub id: Uuid,
    pub raw_payload: String,
    pub branch_id: Option<String>,
    pub qr_identity: Option<String>,
    pub outcome: AttemptOutcome,
}

impl CheckInAttempt {
    fn new(raw: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw_payload: raw.to_string(),
            branch_id: None,
            qr_identity: None,
            outcome: AttemptOutcome::Pending,
        }
    }

    fn fail(mut self, err: CheckInError) -> Self {
        tracing::warn!(attempt = %self.id, "Check-in failed: {}", err);
        self.outcome = AttemptOutcome::Failed(err);
        self
    }
}

/// Result of feeding a scan event to the flow
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    /// Another attempt is still unresolved
    Ignored,
    Completed(CheckInAttempt),
}

#[derive(Debug, Clone, PartialEq)]
enum ScannerState {
    Ready,
    InFlight,
    Done(CheckInAttempt),
}

/// Puts an in-flight scanner back to `Ready` if the scan future is dropped
/// before it finishes
struct InFlight<'a> {
    state: &'a Mutex<ScannerState>,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(mut self, attempt: CheckInAttempt) {
        self.armed = false;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ScannerState::Done(attempt);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ScannerState::InFlight {
            tracing::warn!("Check-in abandoned before completing, scanner re-armed");
            *state = ScannerState::Ready;
        }
    }
}

pub struct CheckInFlow {
    session: Arc<SessionStore>,
    checkins: CheckInService,
    state: Mutex<ScannerState>,
}

impl CheckInFlow {
    pub fn new(session: Arc<SessionStore>, checkins: CheckInService) -> Self {
        Self {
            session,
            checkins,
            state: Mutex::new(ScannerState::Ready),
        }
    }

    /// Whether a new scan would be accepted right now
    pub fn is_accepting(&self) -> bool {
        matches!(*self.lock(), ScannerState::Ready)
    }

    /// The finished attempt waiting for retry or close, if any
    pub fn last_attempt(&self) -> Option<CheckInAttempt> {
        match &*self.lock() {
            ScannerState::Done(attempt) => Some(attempt.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a scan event. Dropping the returned future mid-request leaves
    /// the scanner accepting again.
    pub async fn on_scan(&self, raw: &str) -> ScanResult {
        {
            let mut state = self.lock();
            if *state != ScannerState::Ready {
                tracing::debug!("Scan ignored, an attempt is already unresolved");
                return ScanResult::Ignored;
            }
            *state = ScannerState::InFlight;
        }
        let guard = InFlight {
            state: &self.state,
            armed: true,
        };

        let attempt = self.run(CheckInAttempt::new(raw)).await;
        guard.finish(attempt.clone());
        ScanResult::Completed(attempt)
    }

    async fn run(&self, mut attempt: CheckInAttempt) -> CheckInAttempt {
        let now = Utc::now();

        let qr_code = match self.session.user().as_ref().and_then(|u| u.qr_identity_at(now)) {
            Some(identity) => identity.qr_code.clone(),
            None => return attempt.fail(CheckInError::MissingQrIdentity),
        };
        attempt.qr_identity = Some(qr_code.clone());

        let branch_id = match resolve_branch(&attempt.raw_payload, now) {
            Ok(id) => id,
            Err(e) => return attempt.fail(e),
        };
        attempt.branch_id = Some(branch_id.clone());

        tracing::info!(attempt = %attempt.id, branch_id = %branch_id, "Submitting check-in");
        match self.checkins.create(&qr_code, &branch_id).await {
            Ok(check_in) => {
                tracing::info!(attempt = %attempt.id, check_in_id = %check_in.id, "Check-in recorded");
                attempt.outcome = AttemptOutcome::Succeeded {
                    check_in_id: check_in.id,
                    checked_in_at: check_in.check_in_time,
                    branch_name: check_in.branch.name,
                };
                attempt
            }
            Err(e) => attempt.fail(CheckInError::from_api(&e)),
        }
    }

    /// Accept scans again after a retryable failure. Returns whether the
    /// scanner was re-armed.
    pub fn retry(&self) -> bool {
        let mut state = self.lock();
        let retryable = matches!(
            &*state,
            ScannerState::Done(CheckInAttempt { outcome: AttemptOutcome::Failed(e), .. }) if e.is_retryable()
        );
        if retryable {
            *state = ScannerState::Ready;
        }
        retryable
    }

    /// Discard the finished attempt and re-arm the scanner
    pub fn close(&self) {
        let mut state = self.lock();
        if *state != ScannerState::InFlight {
            *state = ScannerState::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_bare_and_structured_payloads_agree() {
        let now = Utc::now();
        assert_eq!(resolve_branch("branch-123", now).unwrap(), "branch-123");
        assert_eq!(resolve_branch(r#"{"branchId":"branch-123"}"#, now).unwrap(), "branch-123");
        assert_eq!(resolve_branch("  branch-123\n", now).unwrap(), "branch-123");
    }

    #[test]
    fn test_payload_without_branch_is_invalid() {
        let now = Utc::now();
        assert_eq!(resolve_branch("{}", now), Err(CheckInError::InvalidPayload));
        assert_eq!(resolve_branch("", now), Err(CheckInError::InvalidPayload));
        assert_eq!(resolve_branch("   ", now), Err(CheckInError::InvalidPayload));
        assert_eq!(resolve_branch(r#"{"branchId":""}"#, now), Err(CheckInError::InvalidPayload));
        assert_eq!(resolve_branch(r#"{"branchId":7}"#, now), Err(CheckInError::InvalidPayload));
    }

    #[test]
    fn test_non_object_json_falls_back_to_raw_text() {
        let now = Utc::now();
        assert_eq!(resolve_branch("42", now).unwrap(), "42");
        assert_eq!(resolve_branch("{not json", now).unwrap(), "{not json");
    }

    #[test]
    fn test_payload_kind_and_expiry() {
        let now = Utc::now();
        let future = (now + Duration::hours(1)).to_rfc3339();
        let past = (now - Duration::hours(1)).to_rfc3339();

        let ok = format!(r#"{{"type":"checkin","branchId":"b1","expiresAt":"{}"}}"#, future);
        assert_eq!(resolve_branch(&ok, now).unwrap(), "b1");

        let expired = format!(r#"{{"type":"checkin","branchId":"b1","expiresAt":"{}"}}"#, past);
        assert_eq!(resolve_branch(&expired, now), Err(CheckInError::ExpiredPayload));

        let wrong_kind = r#"{"type":"class","branchId":"b1"}"#;
        assert_eq!(resolve_branch(wrong_kind, now), Err(CheckInError::InvalidPayload));
    }
}
