//! Security cookie file: a single random token shared between the core and
//! any child scripts, required on every HTTP request and as the first
//! native-syntax command on a peer session (§4.9, §6.6).

use crate::constants::{COOKIE_ALPHABET, COOKIE_DISALLOWED, COOKIE_TOKEN_LENGTH};
use crate::error::CookieError;
use rand::Rng;
use std::fs;
use std::path::Path;

/// Loads the cookie token from `path`, generating and writing a fresh one if
/// the file is absent or empty.
pub fn load_or_generate(path: &Path) -> Result<String, CookieError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim_end();
            if token.is_empty() {
                let generated = generate();
                write_cookie_file(path, &generated)?;
                Ok(generated)
            } else {
                validate(path, token)?;
                Ok(token.to_string())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let generated = generate();
            write_cookie_file(path, &generated)?;
            Ok(generated)
        }
        Err(e) => Err(CookieError::Io { path: path.display().to_string(), reason: e.to_string() }),
    }
}

/// Generates a fresh `COOKIE_TOKEN_LENGTH`-character token.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..COOKIE_TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..COOKIE_ALPHABET.len());
            COOKIE_ALPHABET[idx] as char
        })
        .collect()
}

/// Validates a token's length and character set, per §6.6.
pub fn validate(path: &Path, token: &str) -> Result<(), CookieError> {
    if token.len() != COOKIE_TOKEN_LENGTH {
        return Err(CookieError::WrongLength { path: path.display().to_string(), length: token.len() });
    }
    for c in token.chars() {
        if c.is_whitespace() || COOKIE_DISALLOWED.contains(&c) {
            return Err(CookieError::InvalidCharacter { path: path.display().to_string(), character: c });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_cookie_file(path: &Path, token: &str) -> Result<(), CookieError> {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, token).map_err(|e| CookieError::Io { path: path.display().to_string(), reason: e.to_string() })?;
    let perms = fs::Permissions::from_mode(0o400);
    fs::set_permissions(path, perms)
        .map_err(|e| CookieError::Io { path: path.display().to_string(), reason: e.to_string() })
}

#[cfg(not(unix))]
fn write_cookie_file(path: &Path, token: &str) -> Result<(), CookieError> {
    fs::write(path, token).map_err(|e| CookieError::Io { path: path.display().to_string(), reason: e.to_string() })
}

/// Compares a presented cookie value against the configured one.
pub fn matches(configured: &str, presented: &str) -> bool {
    configured == presented
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_token_of_expected_length_and_alphabet() {
        let token = generate();
        assert_eq!(token.len(), COOKIE_TOKEN_LENGTH);
        assert!(token.bytes().all(|b| COOKIE_ALPHABET.contains(&b)));
    }

    #[test]
    fn missing_file_is_generated_and_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie");
        let token = load_or_generate(&path).unwrap();
        let reloaded = load_or_generate(&path).unwrap();
        assert_eq!(token, reloaded);
    }

    #[test]
    fn rejects_wrong_length_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie");
        fs::write(&path, "short").unwrap();
        assert!(load_or_generate(&path).is_err());
    }

    #[test]
    fn rejects_disallowed_character() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie");
        let bad = "a".repeat(63) + "=";
        fs::write(&path, bad).unwrap();
        assert!(load_or_generate(&path).is_err());
    }

    #[test]
    fn matches_compares_token_exactly() {
        assert!(matches("abc", "abc"));
        assert!(!matches("abc", "abd"));
    }
}
