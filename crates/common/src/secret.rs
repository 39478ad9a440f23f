//! Secret wrapper for client secrets, signing keys and passwords

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Resolve a secret from the `env` variable, falling back to `file`.
    ///
    /// The environment wins even when the file is configured but unreadable.
    /// File contents are trimmed; an empty file yields `None`.
    pub fn from_env_or_file(env: &str, file: Option<&Path>) -> Result<Option<Self>> {
        if let Ok(value) = std::env::var(env) {
            if !value.is_empty() {
                return Ok(Some(Self::new(value)));
            }
        }
        let Some(file) = file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(file).map_err(|e| {
            Error::Config(format!("failed to read secret file {}: {e}", file.display()))
        })?;
        let value = contents.trim().to_owned();
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(value)))
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Default> Default for Secret<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_redacts_debug_and_display() {
        let secret = Secret::new(String::from("hmac-signing-key"));
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "hmac-signing-key");
    }

    #[test]
    fn file_contents_are_trimmed() {
        let dir = std::env::temp_dir().join("common-secret-trim");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("secret");
        std::fs::write(&path, "  s3cret\n").unwrap();

        let secret = Secret::from_env_or_file("COMMON_TEST_UNSET_SECRET_A", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "s3cret");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn whitespace_only_file_yields_none() {
        let dir = std::env::temp_dir().join("common-secret-blank");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("secret");
        std::fs::write(&path, " \n ").unwrap();

        let secret = Secret::from_env_or_file("COMMON_TEST_UNSET_SECRET_B", Some(&path)).unwrap();
        assert!(secret.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Secret::from_env_or_file(
            "COMMON_TEST_UNSET_SECRET_C",
            Some(Path::new("/nonexistent/secret")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn no_sources_yields_none() {
        let secret = Secret::from_env_or_file("COMMON_TEST_UNSET_SECRET_D", None).unwrap();
        assert!(secret.is_none());
    }
}
