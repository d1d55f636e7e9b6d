//! Logical name to object key resolution.
//!
//! A [`KeyNamespace`] owns a fixed prefix and turns caller-supplied logical
//! names into backend [`ObjectKey`]s by prepending it. Resolution is pure:
//! no I/O, and the same name always yields the same key.
//!
//! # Examples
//!
//! ```
//! use bucketgate_core::KeyNamespace;
//!
//! let ns = KeyNamespace::new("test-files/").unwrap();
//! let key = ns.resolve("report.pdf").unwrap();
//! assert_eq!(key.as_str(), "test-files/report.pdf");
//! assert_eq!(key.logical_name(), "report.pdf");
//! assert!(ns.resolve("../etc/passwd").is_err());
//! ```

use std::fmt;

use crate::error::ConfigError;

/// Prefix applied when none is configured.
pub const DEFAULT_PREFIX: &str = "test-files/";

/// Maximum resolved key length in bytes.
pub const MAX_KEY_BYTES: usize = 1024;

/// Why a logical name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRejection {
    /// The name is empty.
    Empty,
    /// The name starts with `/`.
    LeadingSlash,
    /// A `/`-separated segment is exactly `..`.
    ParentSegment,
    /// The name contains an ASCII control character.
    ControlCharacter,
    /// The resolved key is longer than [`MAX_KEY_BYTES`].
    TooLong,
}

impl fmt::Display for NameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Empty => "name must not be empty",
            Self::LeadingSlash => "name must not start with '/'",
            Self::ParentSegment => "name must not contain '..' path segments",
            Self::ControlCharacter => "name must not contain control characters",
            Self::TooLong => "resolved key exceeds 1024 bytes",
        };
        f.write_str(reason)
    }
}

/// A logical name that failed namespace validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object name {name:?}: {reason}")]
pub struct InvalidName {
    /// The rejected logical name.
    pub name: String,
    /// The rule it broke.
    pub reason: NameRejection,
}

/// A fully qualified backend key: namespace prefix plus logical name.
///
/// Only [`KeyNamespace::resolve`] constructs these, so every `ObjectKey` is
/// non-empty, free of `..` segments, and never starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    key: String,
    prefix_len: usize,
}

impl ObjectKey {
    /// The full backend key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The logical name this key was resolved from.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.key[self.prefix_len..]
    }

    /// Consume the key, returning the backend key string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.key
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Maps logical names into a fixed key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }
}

impl KeyNamespace {
    /// Create a namespace with the given prefix.
    ///
    /// An empty prefix is allowed and maps names to keys unchanged. The
    /// prefix is usually terminated by `/` but this is not required.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrefix`] if the prefix starts with `/`,
    /// contains a `..` segment, or contains control characters.
    pub fn new(prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        let reason = if prefix.starts_with('/') {
            Some("prefix must not start with '/'")
        } else if has_parent_segment(&prefix) {
            Some("prefix must not contain '..' path segments")
        } else if prefix.chars().any(|c| c.is_ascii_control()) {
            Some("prefix must not contain control characters")
        } else if prefix.len() >= MAX_KEY_BYTES {
            Some("prefix leaves no room for object names")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ConfigError::InvalidPrefix { prefix, reason }),
            None => Ok(Self { prefix }),
        }
    }

    /// The fixed prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a logical name into an [`ObjectKey`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidName`] if the name is empty, starts with `/`,
    /// contains a `..` segment or control characters, or resolves to a key
    /// longer than [`MAX_KEY_BYTES`].
    pub fn resolve(&self, name: &str) -> Result<ObjectKey, InvalidName> {
        let reject = |reason| InvalidName {
            name: name.to_owned(),
            reason,
        };

        if name.is_empty() {
            return Err(reject(NameRejection::Empty));
        }
        if name.starts_with('/') {
            return Err(reject(NameRejection::LeadingSlash));
        }
        if has_parent_segment(name) {
            return Err(reject(NameRejection::ParentSegment));
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return Err(reject(NameRejection::ControlCharacter));
        }
        if self.prefix.len() + name.len() > MAX_KEY_BYTES {
            return Err(reject(NameRejection::TooLong));
        }

        let mut key = String::with_capacity(self.prefix.len() + name.len());
        key.push_str(&self.prefix);
        key.push_str(name);
        // A prefix ending in "." joined with a name starting with "./" forms
        // a ".." segment that neither half contains on its own.
        if has_parent_segment(&key) {
            return Err(reject(NameRejection::ParentSegment));
        }
        Ok(ObjectKey {
            key,
            prefix_len: self.prefix.len(),
        })
    }

    /// Map a backend key back to its logical name.
    ///
    /// Returns `None` if the key is outside this namespace or is the bare
    /// prefix itself.
    #[must_use]
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
            .filter(|name| !name.is_empty())
    }
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}
