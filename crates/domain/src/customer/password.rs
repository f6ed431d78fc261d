//! Argon2id password hashing, off the async runtime.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::CustomerError;

fn hash_blocking(password: &str) -> Result<String, CustomerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CustomerError::PasswordHash)
}

fn verify_blocking(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Hashes into a PHC string.
pub(crate) async fn hash(password: String) -> Result<String, CustomerError> {
    tokio::task::spawn_blocking(move || hash_blocking(&password))
        .await
        .map_err(|_| CustomerError::PasswordHash)?
}

/// False for a wrong password and for an unparseable hash alike.
pub(crate) async fn verify(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_blocking(&password, &hash))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash("s3cret".to_string()).await.unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify("s3cret".to_string(), hashed.clone()).await);
        assert!(!verify("wrong".to_string(), hashed).await);
    }

    #[tokio::test]
    async fn garbage_hash_never_verifies() {
        assert!(!verify("s3cret".to_string(), "not-a-hash".to_string()).await);
    }

    #[tokio::test]
    async fn salts_differ() {
        let a = hash("same".to_string()).await.unwrap();
        let b = hash("same".to_string()).await.unwrap();
        assert_ne!(a, b);
    }
}
