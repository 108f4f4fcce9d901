//! The role → operation decision matrix.

use serde::{Deserialize, Serialize};
use stratus_commons::Role;

use crate::kv::KvCommandClass;
use crate::sql::StatementCategory;

/// Outcome of an authorization check. Derived purely from role and
/// category; no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_password_reauth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            requires_password_reauth: false,
            reason: None,
        }
    }

    pub fn allow_with_reauth() -> Self {
        Self {
            allowed: true,
            requires_password_reauth: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_password_reauth: false,
            reason: Some(reason.into()),
        }
    }
}

/// Authorize a classified SQL batch for a role.
///
/// A single statement in a denied category denies the whole batch; the
/// reason names the offending category. Any dangerous statement under the
/// MASTER path flags the batch for password re-authentication.
pub fn authorize(role: Role, categories: &[StatementCategory]) -> PolicyDecision {
    let mut requires_reauth = false;

    for category in categories {
        match category {
            StatementCategory::BlockedSystem => {
                return PolicyDecision::deny(format!(
                    "Statement category '{}' is blocked on this control plane",
                    category
                ));
            }
            StatementCategory::Select => {}
            StatementCategory::Write | StatementCategory::DdlSafe => {
                if role == Role::Reader {
                    return deny_for_role(role, *category);
                }
            }
            StatementCategory::TransactionControl => {
                if role == Role::Reader {
                    return deny_for_role(role, *category);
                }
            }
            StatementCategory::DdlDestructive
            | StatementCategory::DmlDestructive
            | StatementCategory::DmlUnboundedUpdate => {
                if role != Role::Master {
                    return deny_for_role(role, *category);
                }
                requires_reauth = true;
            }
        }
    }

    if requires_reauth {
        PolicyDecision::allow_with_reauth()
    } else {
        PolicyDecision::allow()
    }
}

fn deny_for_role(role: Role, category: StatementCategory) -> PolicyDecision {
    PolicyDecision::deny(format!(
        "Role {} is not allowed to execute '{}' statements",
        role, category
    ))
}

/// Authorize a classified cache command for a role. The blocked list is
/// enforced upstream in classification; a `Blocked` class always denies.
pub fn authorize_kv(role: Role, class: KvCommandClass, command: &str) -> PolicyDecision {
    match class {
        KvCommandClass::Blocked => PolicyDecision::deny(format!(
            "Command '{}' is blocked on this control plane",
            command.to_uppercase()
        )),
        KvCommandClass::Read => PolicyDecision::allow(),
        KvCommandClass::Write => {
            if role == Role::Reader {
                PolicyDecision::deny(format!(
                    "Role {} is not allowed to execute write command '{}'",
                    role,
                    command.to_uppercase()
                ))
            } else {
                PolicyDecision::allow()
            }
        }
        KvCommandClass::Raw => {
            if role.is_master() {
                PolicyDecision::allow()
            } else {
                PolicyDecision::deny(format!(
                    "Role {} is not allowed to submit raw commands",
                    role
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StatementCategory::*;

    #[test]
    fn test_select_allowed_for_all_roles() {
        for role in [Role::Master, Role::User, Role::Reader] {
            let d = authorize(role, &[Select]);
            assert!(d.allowed, "{}", role);
            assert!(!d.requires_password_reauth);
        }
    }

    #[test]
    fn test_write_denied_for_reader() {
        assert!(authorize(Role::User, &[Write]).allowed);
        assert!(authorize(Role::Master, &[DdlSafe]).allowed);
        let d = authorize(Role::Reader, &[Write]);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("write"));
    }

    #[test]
    fn test_dangerous_requires_master_and_reauth() {
        for category in [DmlDestructive, DdlDestructive, DmlUnboundedUpdate] {
            let d = authorize(Role::Master, &[category]);
            assert!(d.allowed);
            assert!(d.requires_password_reauth);

            assert!(!authorize(Role::User, &[category]).allowed);
            assert!(!authorize(Role::Reader, &[category]).allowed);
        }
    }

    #[test]
    fn test_blocked_system_denied_for_everyone() {
        for role in [Role::Master, Role::User, Role::Reader] {
            let d = authorize(role, &[BlockedSystem]);
            assert!(!d.allowed, "{}", role);
            assert!(d.reason.unwrap().contains("blocked-system"));
        }
    }

    #[test]
    fn test_transaction_control_denied_for_reader() {
        assert!(authorize(Role::User, &[TransactionControl]).allowed);
        assert!(!authorize(Role::Reader, &[TransactionControl]).allowed);
    }

    #[test]
    fn test_one_denied_statement_denies_the_batch() {
        let d = authorize(Role::User, &[Select, Write, DmlDestructive]);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("dml-destructive"));
    }

    #[test]
    fn test_mixed_batch_reauth_for_master() {
        let d = authorize(Role::Master, &[Select, DmlDestructive, Write]);
        assert!(d.allowed);
        assert!(d.requires_password_reauth);
    }

    #[test]
    fn test_kv_matrix() {
        assert!(authorize_kv(Role::Reader, KvCommandClass::Read, "GET").allowed);
        assert!(!authorize_kv(Role::Reader, KvCommandClass::Write, "SET").allowed);
        assert!(authorize_kv(Role::User, KvCommandClass::Write, "SET").allowed);
        assert!(!authorize_kv(Role::User, KvCommandClass::Raw, "RAW").allowed);
        assert!(authorize_kv(Role::Master, KvCommandClass::Raw, "RAW").allowed);
    }

    #[test]
    fn test_kv_blocked_denies_master() {
        let d = authorize_kv(Role::Master, KvCommandClass::Blocked, "flushall");
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("FLUSHALL"));
    }
}
