//! Secret generation and Argon2id hashing for bearer capabilities.
//!
//! A secret is the sole proof of authorization, so generation must use
//! the OS CSPRNG and stored hashes must be memory-hard. Hashes are PHC
//! strings with the salt embedded, so verification needs nothing but
//! the hash itself.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use rand::{rngs::OsRng, RngCore};

/// Raw entropy per secret. 48 bytes encodes to a 64-char base64url token.
const SECRET_BYTES: usize = 48;

/// Argon2id memory cost in KiB (64 MiB).
const MEMORY_COST: u32 = 65536;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

pub struct SecretCodec {
    argon: Argon2<'static>,
}

impl Default for SecretCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCodec {
    pub fn new() -> Self {
        let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, None)
            .expect("valid Argon2 parameters");
        Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generate a fresh URL-safe secret token from the OS CSPRNG.
    pub fn generate(&self) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        BASE64_URL.encode(bytes)
    }

    /// Hash a secret with a fresh random salt. Deliberately expensive.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow!("argon2 hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verify a secret against a stored PHC hash string.
    ///
    /// A malformed or foreign-format hash yields `false`, never an
    /// error: callers must not be able to distinguish corruption from
    /// a wrong secret.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
