//! Primary key domains and verification of externally supplied keys.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;

use crate::context::Context;
use crate::error::Error;
use crate::value::Value;
use crate::Result;

/// Separator used when several keys travel in one string.
const KEY_SEPARATOR: char = ',';

static UUID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid pattern is valid")
});

/// Custom key verifier: returns the normalized key or any error.
pub type KeyVerifier = Arc<dyn Fn(&Value, &Context) -> Result<Value> + Send + Sync>;

/// Declared domain of a resource's primary key.
#[derive(Clone, Default)]
pub enum KeyType {
    /// Integer keys; numeric strings are converted.
    #[default]
    Integer,
    /// String keys without the key separator.
    String,
    /// Lowercase RFC 4122 shaped UUID strings.
    Uuid,
    /// Caller-supplied verifier.
    Custom(KeyVerifier),
}

impl KeyType {
    /// Wraps a closure as a custom key type.
    #[must_use]
    pub fn custom<F>(verifier: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(verifier))
    }

    /// Verifies and normalizes one externally supplied key.
    ///
    /// Nil passes through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFieldValue("id", key)` when the key is outside the
    /// domain, including when a custom verifier fails for any reason.
    pub fn verify(&self, key: &Value, context: &Context) -> Result<Value> {
        if key.is_nil() {
            return Ok(Value::Nil);
        }
        let invalid = || Error::invalid_field_value("id", key.clone());
        match self {
            Self::Integer => match key {
                Value::Int(_) => Ok(key.clone()),
                Value::String(s) => s.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
                _ => Err(invalid()),
            },
            Self::String => {
                let text = match key {
                    Value::String(s) => s.to_string(),
                    Value::Int(n) => n.to_string(),
                    _ => return Err(invalid()),
                };
                if text.contains(KEY_SEPARATOR) {
                    Err(invalid())
                } else {
                    Ok(Value::from(text))
                }
            }
            Self::Uuid => match key {
                Value::String(s) if UUID_SHAPE.is_match(s) => Ok(key.clone()),
                _ => Err(invalid()),
            },
            Self::Custom(verifier) => verifier(key, context).map_err(|_| invalid()),
        }
    }

    /// Verifies every key in order.
    ///
    /// # Errors
    ///
    /// Fails on the first key rejected by [`KeyType::verify`].
    pub fn verify_all(&self, keys: &[Value], context: &Context) -> Result<Vec<Value>> {
        keys.iter().map(|key| self.verify(key, context)).collect()
    }
}

impl fmt::Debug for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "Integer"),
            Self::String => write!(f, "String"),
            Self::Uuid => write!(f, "Uuid"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
