//! Session and client identifiers.
//!
//! Both travel as GUID strings: in headers on every request and inside the
//! session context. Servers may echo them upper-cased or wrapped in braces,
//! so parsing accepts any standard GUID text form while output is always
//! lowercase hyphenated.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! sync_id {
    ($(#[$meta:meta])* $name:ident => $generate:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self($generate)
            }

            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ok(Self(Uuid::parse_str(s.trim())?))
            }
        }
    };
}

sync_id! {
    /// One full step sequence. Random so unrelated sessions never collide.
    SessionId => Uuid::new_v4()
}

sync_id! {
    /// A client replica, sent as the scope id. Time-ordered so replicas
    /// created later sort later in server scope tables.
    ClientId => Uuid::now_v7()
}
