//! The precache manifest.
//!
//! Every path listed here must be fetched and stored before a namespace is
//! considered installed. New routes are not discovered; add them here and
//! bump the cache version.

use url::Url;

use crate::Error;

/// Minimum viable offline page set, root-relative.
pub const PRECACHE_PATHS: &[&str] = &[
    "/",
    "/index.html",
    "/video.html",
    "/photo-artists.html",
    "/photo-brand-work.html",
    "/photo-concept-shoots.html",
    "/photo-bts.html",
    "/photo-studio.html",
    "/style.css",
    "/script.js",
    "/assets/logo.png",
    "/assets/platypus.png",
];

/// Ordered list of critical resource paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(PRECACHE_PATHS.iter().copied())
    }
}

impl Manifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { paths: paths.into_iter().map(Into::into).collect() }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path against the site origin, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for a path that is not root-relative
    /// (including scheme-relative `//host` paths) and
    /// `Error::InvalidUrl` if joining fails.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, Error> {
        self.paths
            .iter()
            .map(|path| {
                if !path.starts_with('/') {
                    return Err(Error::InvalidInput(format!("manifest path must start with '/': {path}")));
                }
                // `//host/x` is scheme-relative and would leave the origin.
                if path.starts_with("//") {
                    return Err(Error::InvalidInput(format!("manifest path must not name a host: {path}")));
                }
                Ok(origin.join(path)?)
            })
            .collect()
    }
}
