// Copyright (c) 2025 - Cowboy AI, Inc.
//! Password hashing for replicated credentials

use argon2::{
    password_hash::{PasswordHasher as _, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

use crate::errors::{SyncError, SyncResult};

/// One-way password hashing
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> SyncResult<String>;

    /// Whether `password` matches `hash`
    fn verify(&self, password: &str, hash: &str) -> SyncResult<bool>;
}

/// Argon2id with a random salt per hash
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> SyncResult<String> {
        let salt = SaltString::generate(rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| SyncError::Credential("Failed to hash password".to_string()))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, password: &str, hash: &str) -> SyncResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|_| SyncError::Credential("Invalid password hash format".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
