//! Admin allow-list.

use std::collections::HashSet;
use std::sync::Arc;

use super::AuthError;
use super::identity::ANONYMOUS;

#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admins: Arc<HashSet<String>>,
}

impl AdminPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admins = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty() && e != ANONYMOUS)
            .collect();
        Self {
            admins: Arc::new(admins),
        }
    }

    /// Case-insensitive membership; the anonymous identity is never admin.
    pub fn is_admin(&self, email: &str) -> bool {
        self.admins.contains(&email.trim().to_lowercase())
    }

    pub fn require_admin(&self, email: &str) -> Result<(), AuthError> {
        if self.is_admin(email) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(email.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_ignores_case_and_whitespace() {
        let policy = AdminPolicy::new([" Ops@Example.com ", ""]);
        assert!(policy.is_admin("ops@example.com"));
        assert!(policy.is_admin("OPS@EXAMPLE.COM"));
        assert!(!policy.is_admin("field@example.com"));
    }

    #[test]
    fn anonymous_is_never_admin() {
        let policy = AdminPolicy::new(["anonymous"]);
        assert!(matches!(
            policy.require_admin(ANONYMOUS),
            Err(AuthError::PermissionDenied(_))
        ));
    }
}
