//! Session cookie loading.
//!
//! The cookie file holds one "Header String" as exported by browser cookie
//! editors, e.g. `PHPSESSID=123_abc; device_token=xyz`.

use std::path::Path;

use crate::error::{Error, Result};

/// Cookie that carries the authenticated session.
pub const SESSION_COOKIE: &str = "PHPSESSID";

/// Authenticated session data for the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Loads and validates the cookie file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the file is missing, empty, unreadable or
    /// does not contain a session cookie.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Session(format!(
                    "{} not found; export your cookies as a header string into it",
                    path.display()
                ))
            } else {
                Error::Session(format!("{}: {e}", path.display()))
            }
        })?;
        Self::parse(&contents).map_err(|e| match e {
            Error::Session(msg) => Error::Session(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parses a cookie header string.
    ///
    /// Segments without `=` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the input is blank or lacks the session cookie.
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        if header.is_empty() {
            return Err(Error::Session("cookie data is empty".to_string()));
        }

        let cookies: Vec<(String, String)> = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        if !cookies
            .iter()
            .any(|(name, value)| name == SESSION_COOKIE && !value.is_empty())
        {
            return Err(Error::Session(format!(
                "no {SESSION_COOKIE} cookie; the exported cookies are not logged in"
            )));
        }

        Ok(Self { cookies })
    }

    /// Renders the value of a `Cookie` request header.
    #[must_use]
    pub fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Number of cookies in the session.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if the session holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_header_string() {
        let session = Session::parse(" PHPSESSID=1_abc ; yuid_b=xyz; junk ;a=b=c").unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(session.header(), "PHPSESSID=1_abc; yuid_b=xyz; a=b=c");
    }

    #[test]
    fn empty_data_is_rejected() {
        assert!(matches!(Session::parse("  \n"), Err(Error::Session(_))));
    }

    #[test]
    fn missing_session_cookie_is_rejected() {
        assert!(matches!(Session::parse("a=1; b=2"), Err(Error::Session(_))));
        assert!(matches!(Session::parse("PHPSESSID="), Err(Error::Session(_))));
    }

    #[test]
    fn missing_file_is_session_error() {
        let dir = TempDir::new().unwrap();
        let err = Session::load(&dir.path().join("cookie.json")).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookie.json");
        std::fs::write(&path, "PHPSESSID=42_token\n").unwrap();
        let session = Session::load(&path).unwrap();
        assert_eq!(session.header(), "PHPSESSID=42_token");
    }
}
