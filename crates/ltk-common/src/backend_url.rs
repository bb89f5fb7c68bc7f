//! Backend base url

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::{ParseError, Url};

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] ParseError),
    /// Url path segments could not be joined
    #[error("Url path segments could not be joined")]
    PathSegments,
}

/// Base url of the registry backend, stored without trailing slashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BackendUrl(String);

impl BackendUrl {
    /// New backend url
    pub fn new<S>(url: S) -> Self
    where
        S: Into<String>,
    {
        let url: String = url.into();
        Self(url.trim_end_matches('/').to_string())
    }

    /// Join path segments onto the base url.
    pub fn join_paths(&self, paths: &[&str]) -> Result<Url, Error> {
        let mut url: Url = self.try_into()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| Error::PathSegments)?;
            segments.pop_if_empty();
            for path in paths {
                segments.push(path);
            }
        }
        Ok(url)
    }
}

impl<'de> Deserialize<'de> for BackendUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BackendUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for BackendUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(url))
    }
}

impl TryFrom<&BackendUrl> for Url {
    type Error = Error;

    fn try_from(backend_url: &BackendUrl) -> Result<Url, Self::Error> {
        Ok(Self::parse(backend_url.0.as_str())?)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
