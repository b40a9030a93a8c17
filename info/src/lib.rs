//! Build identity, baked in at compile time.

pub const NAME: &str = "reunite";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source revision, if the build environment provided one.
pub const REVISION: Option<&str> = option_env!("BACKEND_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");
