//! Server configuration values.
//!
//! A server reference is derivable from the short form
//! `[password@]host:port` or from one section of an ini-style
//! configuration file with one section per named server. The loader is a
//! pure function of the text handed to it; locating and reading the file
//! is the caller's concern.

use std::{collections::BTreeMap, str::FromStr};

use crate::Error;

/// The keys of one `[section]` of an ini-style configuration file.
pub type IniSection = BTreeMap<String, String>;

/// A server reference: host, port and optional credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    host: String,
    port: u16,
    passwd: Option<String>,
    prompt: Option<String>,
}

impl Config {
    /// Reads a `Config` from an ini section with keys `host`, `port`,
    /// optional `passwd` and optional `prompt`.
    pub fn from_section(section: &IniSection) -> Result<Self, Error> {
        let host = section
            .get("host")
            .ok_or_else(|| Error::InvalidConfig("missing key: host".to_owned()))?;
        let port = section
            .get("port")
            .ok_or_else(|| Error::InvalidConfig("missing key: port".to_owned()))?;
        let port = port
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("not a port number: {port}")))?;

        Ok(Self {
            host: host.clone(),
            port,
            passwd: section.get("passwd").cloned(),
            prompt: section.get("prompt").cloned(),
        })
    }

    /// The host name or address of the server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The password to authenticate with, if one is configured.
    pub fn passwd(&self) -> Option<&str> {
        self.passwd.as_deref()
    }

    /// The shell prompt configured for this server, if any.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}

impl FromStr for Config {
    type Err = Error;

    /// Parses the short form `[password@]host:port`.
    ///
    /// The password splits off at the LAST `@` so passwords may contain
    /// one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (front, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidConfig(format!("invalid socket: {s}")))?;

        let port = port
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("not a port number: {port}")))?;

        let (passwd, host) = match front.rsplit_once('@') {
            Some((passwd, host)) => (Some(passwd.to_owned()), host),
            None => (None, front),
        };

        if host.is_empty() {
            return Err(Error::InvalidConfig(format!("invalid socket: {s}")));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            passwd,
            prompt: None,
        })
    }
}

/// Parses an ini-style configuration text into one [`Config`] per named
/// server section.
///
/// Blank lines and `#` / `;` comment lines are skipped; keys and values
/// split at the first `=`.
pub fn servers(text: &str) -> Result<BTreeMap<String, Config>, Error> {
    let mut sections: BTreeMap<String, IniSection> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            sections.entry(name.to_owned()).or_default();
            current = Some(name.to_owned());
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::InvalidConfig(format!("malformed line: {line}")))?;
        let name = current
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig(format!("key outside a section: {line}")))?;

        sections
            .entry(name.clone())
            .or_default()
            .insert(key.trim().to_owned(), value.trim().to_owned());
    }

    sections
        .into_iter()
        .map(|(name, section)| Ok((name, Config::from_section(&section)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_with_password() {
        let config = Config::from_str("secret@srv.example.com:25575").unwrap();
        assert_eq!(config.host(), "srv.example.com");
        assert_eq!(config.port(), 25575);
        assert_eq!(config.passwd(), Some("secret"));
        assert_eq!(config.prompt(), None);
    }

    #[test]
    fn test_from_string_without_password() {
        let config = Config::from_str("srv.example.com:25575").unwrap();
        assert_eq!(config.host(), "srv.example.com");
        assert_eq!(config.port(), 25575);
        assert_eq!(config.passwd(), None);
    }

    #[test]
    fn test_from_string_password_containing_at() {
        let config = Config::from_str("p@ss@srv.example.com:25575").unwrap();
        assert_eq!(config.host(), "srv.example.com");
        assert_eq!(config.passwd(), Some("p@ss"));
    }

    #[test]
    fn test_from_string_garbage() {
        assert!(matches!(
            Config::from_str("garbage"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_str("srv.example.com:notaport"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_str(":25575"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_section() {
        let mut section = IniSection::new();
        section.insert("host".to_owned(), "srv.example.com".to_owned());
        section.insert("port".to_owned(), "2302".to_owned());
        section.insert("passwd".to_owned(), "secret".to_owned());

        let config = Config::from_section(&section).unwrap();
        assert_eq!(config.host(), "srv.example.com");
        assert_eq!(config.port(), 2302);
        assert_eq!(config.passwd(), Some("secret"));
        assert_eq!(config.prompt(), None);
    }

    #[test]
    fn test_from_section_missing_host() {
        let mut section = IniSection::new();
        section.insert("port".to_owned(), "2302".to_owned());

        assert!(matches!(
            Config::from_section(&section),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_servers() {
        let text = "\
            # game servers\n\
            [minecraft]\n\
            host = mc.example.com\n\
            port = 25575\n\
            passwd = hunter2\n\
            \n\
            [arma]\n\
            host = arma.example.com\n\
            port = 2302\n\
            prompt = ARMA> \n\
        ";

        let servers = servers(text).unwrap();
        assert_eq!(servers.len(), 2);

        let mc = &servers["minecraft"];
        assert_eq!(mc.host(), "mc.example.com");
        assert_eq!(mc.port(), 25575);
        assert_eq!(mc.passwd(), Some("hunter2"));

        let arma = &servers["arma"];
        assert_eq!(arma.port(), 2302);
        assert_eq!(arma.prompt(), Some("ARMA>"));
    }

    #[test]
    fn test_servers_malformed_line() {
        assert!(matches!(
            servers("[a]\nnot a key value"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            servers("host = example.com"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
