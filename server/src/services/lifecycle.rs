//! The registration lifecycle. Every status change is looked up here; callers hand
//! [`Action::sources`] to the store so the guard is evaluated inside the update.
//!
//! ```text
//! pending_payment      ──receipt──▶ pending_verification ──approve──▶ approved
//! pending_verification ──reject───▶ rejected ──receipt──▶ pending_verification
//! any unpaid state     ──gateway confirms charge──────────────────▶ approved
//! ```

use thiserror::Error;

use crate::models::RegistrationStatus::{
    self, Approved, PendingPayment, PendingVerification, Rejected,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create a gateway transaction. Does not move the status.
    InitializePayment,
    /// Attendee submits proof of an out-of-band payment.
    SubmitReceipt,
    /// Gateway reports a successful charge.
    ConfirmPayment,
    /// Admin accepts a submitted receipt.
    Approve,
    /// Admin declines a submitted receipt.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a registration that is {from}")]
pub struct TransitionError {
    pub action: &'static str,
    pub from: RegistrationStatus,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::InitializePayment => "initialize payment for",
            Action::SubmitReceipt => "submit a receipt for",
            Action::ConfirmPayment => "confirm payment for",
            Action::Approve => "approve",
            Action::Reject => "reject",
        }
    }

    /// States this action may start from.
    pub fn sources(&self) -> &'static [RegistrationStatus] {
        match self {
            Action::InitializePayment | Action::SubmitReceipt | Action::ConfirmPayment => {
                &[PendingPayment, PendingVerification, Rejected]
            }
            Action::Approve | Action::Reject => &[PendingVerification],
        }
    }

    fn target(&self, from: RegistrationStatus) -> RegistrationStatus {
        match self {
            Action::InitializePayment => from,
            Action::SubmitReceipt => PendingVerification,
            Action::ConfirmPayment | Action::Approve => Approved,
            Action::Reject => Rejected,
        }
    }
}

/// Resulting status of applying `action` in state `from`.
pub fn transition(
    from: RegistrationStatus,
    action: Action,
) -> Result<RegistrationStatus, TransitionError> {
    if action.sources().contains(&from) {
        Ok(action.target(from))
    } else {
        Err(TransitionError {
            action: action.name(),
            from,
        })
    }
}
