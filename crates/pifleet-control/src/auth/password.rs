//! Shared-secret registration password, stored as an argon2id hash.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::warn;

use super::AuthError;

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Checks the provisioning password for device-facing endpoints.
///
/// Without a configured hash every check fails: registration is closed
/// until an operator sets one.
#[derive(Debug, Clone, Default)]
pub struct PasswordGate {
    hash: Option<Arc<str>>,
}

impl PasswordGate {
    /// Build a gate, rejecting a hash that is not a PHC string.
    pub fn new(hash: Option<String>) -> Result<Self, AuthError> {
        let hash = hash.map(|h| h.trim().to_string()).filter(|h| !h.is_empty());
        if let Some(h) = &hash {
            PasswordHash::new(h).map_err(|e| AuthError::MalformedHash(e.to_string()))?;
        }
        Ok(Self {
            hash: hash.map(Arc::from),
        })
    }

    pub const fn is_configured(&self) -> bool {
        self.hash.is_some()
    }

    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        let Some(hash) = &self.hash else {
            warn!("Provisioning password checked but none is configured");
            return Err(AuthError::InvalidPassword);
        };
        match verify_password(password, hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::InvalidPassword),
            Err(e) => {
                warn!(error = %e, "Stored provisioning hash unusable");
                Err(AuthError::InvalidPassword)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("mysecret").unwrap();
        assert!(verify_password("mysecret", &hash).unwrap());
        assert!(!verify_password("wrongpassword", &hash).unwrap());
    }

    #[test]
    fn gate_accepts_only_the_configured_password() {
        let gate = PasswordGate::new(Some(hash_password("fleet-secret").unwrap())).unwrap();
        assert!(gate.is_configured());
        assert!(gate.check("fleet-secret").is_ok());
        assert!(matches!(
            gate.check("nope"),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn unconfigured_gate_rejects_everything() {
        let gate = PasswordGate::new(None).unwrap();
        assert!(!gate.is_configured());
        assert!(gate.check("").is_err());

        let blank = PasswordGate::new(Some("  ".into())).unwrap();
        assert!(!blank.is_configured());
    }

    #[test]
    fn malformed_hash_is_rejected_up_front() {
        let err = PasswordGate::new(Some("plaintext".into())).unwrap_err();
        assert!(matches!(err, AuthError::MalformedHash(_)));
    }
}
