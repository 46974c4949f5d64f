//! Macro for implementing Display and FromStr for status enums
//!
//! This macro eliminates boilerplate for status enum conversions by providing
//! a single implementation for both Display and FromStr traits. It handles
//! case-insensitive parsing and consistent string representation.
//!
//! # Example
//!
//! ```rust
//! use guildsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum CaseStatus {
//!     Open,
//!     Resolved,
//! }
//!
//! impl_domain_status_conversions!(CaseStatus {
//!     Open => "open",
//!     Resolved => "resolved",
//! });
//! ```

/// Implements Display and FromStr traits for status enums
///
/// This macro generates:
/// - Display trait: converts enum variants to lowercase strings
/// - FromStr trait: parses case-insensitive strings to enum variants
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
