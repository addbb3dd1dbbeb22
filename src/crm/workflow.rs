//! Post-draft quotation lifecycle: approval, client confirmation, payment and
//! final confirmation.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::Session;
use crate::error::{CrmError, Result};
use crate::models::{ConfirmationInput, ADMIN_ROLE_TITLE, CONFIRMATION_ROLE, SALES_HEAD_ROLE, SALES_REP_ROLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    PendingClientConfirmation,
    PaymentReceived,
    Confirmed,
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 8] = [
        Self::Draft,
        Self::PendingApproval,
        Self::Approved,
        Self::Rejected,
        Self::PendingClientConfirmation,
        Self::PaymentReceived,
        Self::Confirmed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PendingClientConfirmation => "pending_client_confirmation",
            Self::PaymentReceived => "payment_received",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|w| w.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        match (self, next) {
            (Draft | Rejected, PendingApproval) => true,
            (PendingApproval, Approved | Rejected) => true,
            (Approved, PendingClientConfirmation) => true,
            (PendingClientConfirmation, PaymentReceived) => true,
            (PaymentReceived, Confirmed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Checks `from -> to`, returning the target status.
pub fn ensure_transition(from: &str, to: WorkflowStatus) -> Result<WorkflowStatus> {
    let current = WorkflowStatus::parse(from)
        .ok_or_else(|| CrmError::validation(format!("Unknown workflow status: {}", from)))?;
    if !current.can_transition_to(to) {
        return Err(CrmError::validation(format!(
            "Cannot move quotation from {} to {}",
            current.as_str(),
            to.as_str()
        )));
    }
    Ok(to)
}

pub const APPROVER_ROLES: [&str; 2] = [SALES_HEAD_ROLE, ADMIN_ROLE_TITLE];
pub const PAYMENT_ROLES: [&str; 3] = [SALES_HEAD_ROLE, ADMIN_ROLE_TITLE, SALES_REP_ROLE];
pub const CONFIRMATION_ROLES: [&str; 2] = [CONFIRMATION_ROLE, ADMIN_ROLE_TITLE];

pub fn require_approver(session: &Session, action: &str) -> Result<()> {
    if session.has_role(&APPROVER_ROLES) {
        Ok(())
    } else {
        Err(CrmError::forbidden(format!("Insufficient permissions to {}", action)))
    }
}

pub fn require_payment_role(session: &Session) -> Result<()> {
    if session.has_role(&PAYMENT_ROLES) {
        Ok(())
    } else {
        Err(CrmError::forbidden("Insufficient permissions to mark payment received"))
    }
}

pub fn require_confirmation_role(session: &Session, action: &str) -> Result<()> {
    if session.has_role(&CONFIRMATION_ROLES) {
        Ok(())
    } else {
        Err(CrmError::forbidden(format!("Insufficient permissions to {}", action)))
    }
}

const CONFIRMATION_METHODS: [&str; 4] = ["phone", "video_call", "in_person", "email"];

/// Post-sale confirmation with missing details filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfirmation {
    pub client_contact_person: String,
    pub confirmation_method: String,
    pub deliverables_confirmed: serde_json::Value,
    pub event_details_confirmed: serde_json::Value,
    pub client_expectations: String,
}

pub fn resolve_confirmation(input: ConfirmationInput) -> Result<ResolvedConfirmation> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let method = non_empty(input.confirmation_method).unwrap_or_else(|| "phone".to_string());
    if !CONFIRMATION_METHODS.contains(&method.as_str()) {
        return Err(CrmError::validation(format!(
            "Invalid confirmation method. Must be one of: {}",
            CONFIRMATION_METHODS.join(", ")
        )));
    }
    let or_confirmed = |v: serde_json::Value| {
        if v.is_null() {
            json!({ "confirmed": true })
        } else {
            v
        }
    };

    Ok(ResolvedConfirmation {
        client_contact_person: non_empty(input.client_contact_person)
            .unwrap_or_else(|| "Client".to_string()),
        confirmation_method: method,
        deliverables_confirmed: or_confirmed(input.deliverables_confirmed),
        event_details_confirmed: or_confirmed(input.event_details_confirmed),
        client_expectations: non_empty(input.client_expectations)
            .unwrap_or_else(|| "All expectations confirmed".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStatus::*;

    fn session(role: &str) -> Session {
        Session {
            account_id: 1,
            employee_id: 1,
            username: "u".into(),
            role_id: 9,
            role_title: role.into(),
            is_admin: role == ADMIN_ROLE_TITLE,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Draft,
            PendingApproval,
            Approved,
            PendingClientConfirmation,
            PaymentReceived,
            Confirmed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejection_loop_and_illegal_moves() {
        assert!(PendingApproval.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(PendingApproval));
        assert!(!Draft.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(PaymentReceived));
        assert!(!Confirmed.can_transition_to(PendingApproval));
    }

    #[test]
    fn test_cancel_from_non_terminal_only() {
        for status in WorkflowStatus::ALL {
            assert_eq!(status.can_transition_to(Cancelled), !status.is_terminal());
        }
    }

    #[test]
    fn test_ensure_transition_errors() {
        assert_eq!(ensure_transition("draft", PendingApproval).unwrap(), PendingApproval);
        let err = ensure_transition("draft", Confirmed).unwrap_err();
        assert_eq!(err.to_string(), "Cannot move quotation from draft to confirmed");
        assert!(ensure_transition("bogus", Approved).is_err());
    }

    #[test]
    fn test_role_gates() {
        assert!(require_approver(&session("Sales Head"), "approve quotation").is_ok());
        assert!(require_approver(&session("Administrator"), "approve quotation").is_ok());
        let err = require_approver(&session("Sales Representative"), "approve quotation").unwrap_err();
        assert_eq!(err.to_string(), "Insufficient permissions to approve quotation");

        assert!(require_payment_role(&session("Sales Representative")).is_ok());
        assert!(require_payment_role(&session("Confirmation Team")).is_err());

        assert!(require_confirmation_role(&session("Confirmation Team"), "confirm").is_ok());
        assert!(require_confirmation_role(&session("Sales Head"), "confirm").is_err());
    }

    #[test]
    fn test_confirmation_defaults() {
        let resolved = resolve_confirmation(ConfirmationInput::default()).unwrap();
        assert_eq!(resolved.client_contact_person, "Client");
        assert_eq!(resolved.confirmation_method, "phone");
        assert_eq!(resolved.deliverables_confirmed, json!({ "confirmed": true }));
        assert_eq!(resolved.client_expectations, "All expectations confirmed");

        let bad = ConfirmationInput {
            confirmation_method: Some("carrier pigeon".into()),
            ..Default::default()
        };
        assert!(resolve_confirmation(bad).is_err());
    }
}
