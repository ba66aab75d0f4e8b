//! Rendering of plans, reports and summaries

pub mod human;
pub mod json;
pub mod mask;

pub use mask::Masker;

/// Standing warning attached whenever username/password credentials are
/// part of a run.
pub const BASIC_AUTH_WARNING: &str = "basic-auth passwords are stored hashed and cannot be \
     compared; updates to passwords are not detected and passwords are never dumped";
