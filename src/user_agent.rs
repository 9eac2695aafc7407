//! User-Agent sent on every outbound request.
//!
//! Format is `<Product>-<Component>/<version>` so server logs can tell which
//! part of which launcher build made the request.

use std::fmt;

/// Default product label.
pub const DEFAULT_PRODUCT: &str = "Launcher";

/// Default component label for the download manager.
pub const DEFAULT_COMPONENT: &str = "Downloader";

/// Product-identifying User-Agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    product: String,
    component: String,
    version: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT, DEFAULT_COMPONENT)
    }
}

impl UserAgent {
    /// Builds a User-Agent stamped with this crate's version.
    #[must_use]
    pub fn new(product: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            component: component.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Overrides the version (e.g. the launcher's own release tag, or `dev`).
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.product, self.component, self.version)
    }
}
