//! Shared-secret authorization gate for HTTP services
//!
//! Two variants:
//! - **bearer**: every request carries `Authorization: Bearer <token>`
//! - **session**: a one-time `?ta_token=` is validated once, exchanged for an
//!   HttpOnly session cookie, and scrubbed from the URL with a 307 redirect
//!
//! All credential checks go through a constant-time matcher over an immutable
//! secret store. An empty store rejects everything.

pub mod config;
pub mod error;
pub mod extract;
pub mod gate;
pub mod layer;
pub mod secret;
pub mod upgrade;

pub use config::{GateConfig, GateMode, GateSettings};
pub use error::{AuthError, ConfigError};
pub use gate::{Decision, Gate, Rejection};
pub use layer::{GateLayer, GateService};
pub use secret::{constant_time_eq, Secret, SecretStore};
pub use upgrade::SessionUpgrade;
