//! triage-core: support conversation triage and assignment engine
//!
//! This crate classifies inbound customer-support messages by urgency,
//! threads them into conversations, and keeps conversation status and
//! agent load/resolution counters consistent as conversations move through
//! their lifecycle.

/// Generates `ALL`, `as_str`, `Display`, and a case-insensitive `FromStr`
/// for a fieldless enum stored by name.
macro_rules! named_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::error::Error;

            fn from_str(s: &str) -> $crate::error::Result<Self> {
                let wanted = s.trim();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        $crate::error::Error::InvalidInput(format!(
                            concat!("unknown ", $what, " '{}'"),
                            s
                        ))
                    })
            }
        }
    };
}

pub mod agents;
pub mod canned;
pub mod config;
pub mod coordinator;
pub mod customers;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod models;
pub mod schema;
pub mod seed;
pub mod text;
pub mod urgency;

pub use config::Config;
pub use coordinator::TriageCoordinator;
pub use db::Database;
pub use error::Error;
pub use error::Result;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "triage";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "TRIAGE".to_string()
}
