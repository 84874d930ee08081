//! Gate settings and their one-time resolution
//!
//! `GateSettings` is what a config file deserializes into; every field may be
//! missing or empty. `GateSettings::resolve` fills defaults, validates names,
//! builds the secret store and yields an immutable `GateConfig` that request
//! handling reads without ever consulting defaults again.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::secret::{SecretStore, BEARER_PREFIX};

pub const DEFAULT_TOKEN_PARAM: &str = "ta_token";
pub const DEFAULT_COOKIE_NAME: &str = "ta_session_token";
pub const DEFAULT_REALM: &str = "Restricted";

/// Which carrier the gate reads credentials from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// `Authorization: Bearer <token>` on every request.
    #[default]
    Bearer,
    /// One-time `?<token_param>=` upgraded to a session cookie.
    Session,
}

/// Raw, unresolved gate settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default)]
    pub mode: GateMode,
    #[serde(default, alias = "allowedTokens")]
    pub allowed_tokens: Vec<String>,
    #[serde(default, alias = "tokenParam")]
    pub token_param: String,
    #[serde(default, alias = "cookieName")]
    pub cookie_name: String,
    #[serde(default)]
    pub realm: String,
    #[serde(default, alias = "cookieMaxAgeSecs")]
    pub cookie_max_age_secs: Option<u64>,
}

impl fmt::Debug for GateSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateSettings")
            .field("mode", &self.mode)
            .field("allowed_tokens", &format!("<{} tokens>", self.allowed_tokens.len()))
            .field("token_param", &self.token_param)
            .field("cookie_name", &self.cookie_name)
            .field("realm", &self.realm)
            .field("cookie_max_age_secs", &self.cookie_max_age_secs)
            .finish()
    }
}

impl GateSettings {
    pub fn bearer<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: GateMode::Bearer,
            allowed_tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn session<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: GateMode::Session,
            allowed_tokens: tokens.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fill defaults, validate and build the secret store.
    ///
    /// Empty tokens are dropped: an empty credential means "nothing
    /// presented" and must never authorize a request.
    pub fn resolve(self) -> Result<GateConfig, ConfigError> {
        let total = self.allowed_tokens.len();
        let tokens: Vec<String> = self
            .allowed_tokens
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() != total {
            warn!(
                "Ignoring {} empty token(s) in gate configuration",
                total - tokens.len()
            );
        }

        match self.mode {
            GateMode::Bearer => {
                let realm = or_default(self.realm, DEFAULT_REALM);
                if !is_valid_realm(&realm) {
                    return Err(ConfigError::InvalidRealm(realm));
                }
                Ok(GateConfig::Bearer(BearerConfig {
                    store: SecretStore::with_prefix(BEARER_PREFIX, &tokens),
                    realm,
                }))
            }
            GateMode::Session => {
                let token_param = or_default(self.token_param, DEFAULT_TOKEN_PARAM);
                if token_param.contains(['&', '=', '#']) {
                    return Err(ConfigError::InvalidTokenParam(token_param));
                }
                let cookie_name = or_default(self.cookie_name, DEFAULT_COOKIE_NAME);
                if !is_cookie_token(&cookie_name) {
                    return Err(ConfigError::InvalidCookieName(cookie_name));
                }
                Ok(GateConfig::Session(SessionConfig {
                    store: SecretStore::new(tokens),
                    token_param,
                    cookie_name,
                    cookie_max_age_secs: self.cookie_max_age_secs,
                }))
            }
        }
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// RFC 6265 cookie-name: a non-empty HTTP token.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

/// The realm is emitted inside a quoted-string.
fn is_valid_realm(realm: &str) -> bool {
    realm
        .chars()
        .all(|c| !c.is_control() && c != '"' && c != '\\')
}

/// Resolved bearer-variant configuration.
#[derive(Debug, Clone)]
pub struct BearerConfig {
    /// Full expected header values, `"Bearer " + token`.
    pub store: SecretStore,
    pub realm: String,
}

/// Resolved session-variant configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Raw token values, compared without any prefix.
    pub store: SecretStore,
    pub token_param: String,
    pub cookie_name: String,
    pub cookie_max_age_secs: Option<u64>,
}

/// Fully resolved, read-only gate configuration.
#[derive(Debug, Clone)]
pub enum GateConfig {
    Bearer(BearerConfig),
    Session(SessionConfig),
}

impl GateConfig {
    pub fn mode(&self) -> GateMode {
        match self {
            Self::Bearer(_) => GateMode::Bearer,
            Self::Session(_) => GateMode::Session,
        }
    }

    pub fn store(&self) -> &SecretStore {
        match self {
            Self::Bearer(c) => &c.store,
            Self::Session(c) => &c.store,
        }
    }

    /// How a raw token looks on the wire for this variant: prefixed with the
    /// bearer scheme for header gates, unchanged for session gates.
    pub fn carrier_form<'a>(&self, token: &'a str) -> Cow<'a, str> {
        match self {
            Self::Bearer(_) => Cow::Owned(format!("{}{}", BEARER_PREFIX, token)),
            Self::Session(_) => Cow::Borrowed(token),
        }
    }
}
