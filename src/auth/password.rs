use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{error, warn};

pub const TEMP_PASSWORD_LENGTH: usize = 12;

// Confusable characters (0/O, 1/l/I) are excluded.
const UPPER: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijkmnopqrstuvwxyz";
const DIGITS: &str = "23456789";
const SYMBOLS: &str = "!@#$%^&*";

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// A malformed stored hash is treated as a failed match, never an error.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "malformed password hash");
            false
        }
    }
}

fn pick(rng: &mut impl Rng, alphabet: &str) -> char {
    let bytes = alphabet.as_bytes();
    bytes[rng.gen_range(0..bytes.len())] as char
}

/// Usability default for registrations without a password; the user is
/// expected to change it on first sign-in. Guarantees one character of each
/// class, then shuffles.
pub fn generate_temp_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let all: String = [UPPER, LOWER, DIGITS, SYMBOLS].concat();

    let mut chars = vec![
        pick(&mut rng, UPPER),
        pick(&mut rng, LOWER),
        pick(&mut rng, DIGITS),
        pick(&mut rng, SYMBOLS),
    ];
    while chars.len() < length {
        chars.push(pick(&mut rng, &all));
    }
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_is_false_on_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn temp_password_has_requested_length() {
        assert_eq!(generate_temp_password(TEMP_PASSWORD_LENGTH).len(), 12);
        assert_eq!(generate_temp_password(20).len(), 20);
    }

    #[test]
    fn temp_password_contains_every_character_class() {
        for _ in 0..50 {
            let pwd = generate_temp_password(TEMP_PASSWORD_LENGTH);
            assert!(pwd.chars().any(|c| UPPER.contains(c)), "no uppercase: {pwd}");
            assert!(pwd.chars().any(|c| LOWER.contains(c)), "no lowercase: {pwd}");
            assert!(pwd.chars().any(|c| DIGITS.contains(c)), "no digit: {pwd}");
            assert!(pwd.chars().any(|c| SYMBOLS.contains(c)), "no symbol: {pwd}");
        }
    }

    #[test]
    fn temp_password_avoids_confusable_characters() {
        for _ in 0..50 {
            let pwd = generate_temp_password(TEMP_PASSWORD_LENGTH);
            assert!(!pwd.chars().any(|c| "0O1lI".contains(c)), "confusable in {pwd}");
        }
    }
}
