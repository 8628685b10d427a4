//! Permission evaluator — pure ownership/role decisions.
//!
//! DESIGN
//! ======
//! Ownership is self-declared at creation time and trusted. This is a
//! cooperative-classroom trust model, not a security boundary; hardening is
//! an explicit non-goal. The central authority role bypasses every
//! ownership check.

use crate::event::Role;
use crate::services::registry::Participant;

/// May `participant` mutate an item owned by `owner`?
///
/// Administrators always may. Everyone else only when the owner matches
/// their username; an ownerless (legacy/anonymous) item is admin-only.
/// `owner` is either the request's declared owner field or the stored
/// item's `owner_id`, depending on the operation.
#[must_use]
pub fn can_mutate(participant: &Participant, owner: Option<&str>) -> bool {
    if participant.role == Role::Administrator {
        return true;
    }
    owner == Some(participant.username.as_str())
}

/// Only Administrators may wipe the board. Callers turn a refusal into a
/// distinguishable `clearError`, never a silent drop.
#[must_use]
pub fn can_clear(participant: &Participant) -> bool {
    participant.role == Role::Administrator
}
