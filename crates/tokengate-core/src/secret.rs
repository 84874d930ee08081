//! Secret storage and constant-time matching

use std::fmt;

use subtle::{Choice, ConstantTimeEq};

/// Scheme prefix prepended to every bearer secret.
pub const BEARER_PREFIX: &str = "Bearer ";

/// A single accepted credential.
///
/// Equality is the only operation and is always evaluated in constant time.
/// The value is never printed by `Debug`.
#[derive(Clone)]
pub struct Secret(Box<[u8]>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().into_bytes().into_boxed_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against a candidate, returned as a `Choice`
    /// so callers can accumulate results without branching.
    pub fn matches(&self, candidate: &[u8]) -> Choice {
        self.0.as_ref().ct_eq(candidate)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<{} bytes>)", self.0.len())
    }
}

/// Immutable, order-preserving set of accepted secrets.
///
/// Built once at construction; there is no mutation API, so a store can be
/// shared across any number of concurrent requests without locking. An empty
/// store matches nothing, including the empty candidate.
#[derive(Clone, Default)]
pub struct SecretStore {
    secrets: Vec<Secret>,
}

impl SecretStore {
    /// Build a store holding each value verbatim.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            secrets: values.into_iter().map(Secret::new).collect(),
        }
    }

    /// Build a store where every value is stored as `prefix + value`, e.g. the
    /// full expected `Authorization` header for a bearer secret.
    pub fn with_prefix<I, S>(prefix: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            secrets: values
                .into_iter()
                .map(|v| Secret::new(format!("{}{}", prefix, v.as_ref())))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Check whether `candidate` is byte-for-byte equal to any stored secret.
    ///
    /// Every stored secret is compared, regardless of where (or whether) a
    /// match occurs, so the total cost only depends on the store contents and
    /// the candidate's length class.
    pub fn contains(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        let mut found = Choice::from(0u8);
        for secret in &self.secrets {
            found |= secret.matches(candidate);
        }
        found.into()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("len", &self.secrets.len())
            .finish()
    }
}

/// Constant-time byte comparison (prevents timing side-channels).
///
/// Inputs of different length return `false` immediately; the length of a
/// secret is not itself secret. Equal-length inputs are always scanned in full.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
