//! Persisted reachability status of an endpoint.
//!
//! The textual form is what ends up in the database, so it must stay stable.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

// Macro to define the enum from variant => string mappings
macro_rules! define_enum_with_str {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $str)]
                $variant,
            )*
        }

        impl $name {
            /// The stable textual form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    _ => Err(UnknownStatus(value.to_owned())),
                }
            }
        }
    };
}

/// A status string that is none of the known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown endpoint status '{}'", self.0)
    }
}

impl core::error::Error for UnknownStatus {}

define_enum_with_str! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    /// Last observed reachability of an endpoint.
    pub enum EndpointStatus {
        /// Never swept yet
        #[default]
        Unknown => "UNKNOWN",
        /// Accepted a TCP connection on the last sweep
        Up => "UP",
        /// Refused, timed out or failed to resolve on the last sweep
        Down => "DOWN",
    }
}

impl EndpointStatus {
    /// Folds a boolean probe outcome into a status.
    #[must_use]
    pub const fn from_reachable(reachable: bool) -> Self {
        if reachable { Self::Up } else { Self::Down }
    }

    /// Colored marker used when listing endpoints.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Up => "🟢",
            Self::Down => "🔴",
            Self::Unknown => "⚪",
        }
    }
}
