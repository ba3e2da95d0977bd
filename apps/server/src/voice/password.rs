use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::store::StoreError;

/// Hash a room password using Argon2
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StoreError::Credential)
}

/// Verify a room password against its stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| StoreError::Credential)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
