//! SQL Server DSN parsing.
//!
//! Three syntaxes are accepted:
//! - `sqlserver://[user[:password]@]host[:port][?param=value&...]`
//! - `jdbc:sqlserver://host:port;key=value;...` (parsed by tiberius)
//! - ADO.NET `server=tcp:host,port;user id=...;...` (parsed by tiberius)
//!
//! tiberius has no notion of a login timeout, so `connection timeout` (URL),
//! `Connect Timeout` (ADO.NET) and `loginTimeout` (JDBC) are read here. A
//! URL without `encrypt` only encrypts the login packet.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tiberius::{AuthMethod, Config, EncryptionLevel};
use url::Url;

use crate::error::TunnelError;

const URL_SCHEME: &str = "sqlserver://";
const JDBC_PREFIX: &str = "jdbc:";

const ADO_TIMEOUT_KEYS: &[&str] = &["connect timeout", "connection timeout", "timeout"];
const JDBC_TIMEOUT_KEYS: &[&str] = &["logintimeout"];

/// Invalid parameter in a `sqlserver://` DSN.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    /// A query parameter carried a value that cannot be used
    #[error("mssql: invalid value {value:?} for parameter {key:?}")]
    InvalidValue { key: String, value: String },

    /// The user or password was not valid UTF-8 after percent-decoding
    #[error("mssql: invalid percent-encoding in {0}")]
    InvalidEncoding(&'static str),

    /// An instance name was given without a port to reach it on
    #[error("mssql: instance {0:?} needs an explicit port")]
    InstanceWithoutPort(String),
}

/// Parsed SQL Server DSN.
#[derive(Clone)]
pub struct MssqlDsn {
    /// tiberius connection configuration
    pub config: Config,
    /// Deadline for dial plus login (`connection timeout`, seconds)
    pub connect_timeout: Option<Duration>,
}

impl MssqlDsn {
    /// `host:port` the dialer is asked for.
    pub fn address(&self) -> String {
        self.config.get_addr()
    }
}

impl FromStr for MssqlDsn {
    type Err = TunnelError;

    fn from_str(dsn: &str) -> Result<Self, Self::Err> {
        if has_prefix(dsn, URL_SCHEME) {
            return parse_url(dsn);
        }

        let (config, timeout_keys) = if has_prefix(dsn, JDBC_PREFIX) {
            (Config::from_jdbc_string(dsn), JDBC_TIMEOUT_KEYS)
        } else {
            (Config::from_ado_string(dsn), ADO_TIMEOUT_KEYS)
        };
        let config = config.map_err(TunnelError::malformed_dsn)?;

        let mut connect_timeout = None;
        for (key, value) in split_properties(dsn) {
            if timeout_keys.contains(&key.as_str()) {
                connect_timeout = parse_timeout(&key, &value)?;
            }
        }

        Ok(Self {
            config,
            connect_timeout,
        })
    }
}

// Config may hold credentials; print the address only.
impl fmt::Debug for MssqlDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlDsn")
            .field("address", &self.address())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn has_prefix(dsn: &str, prefix: &str) -> bool {
    dsn.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn parse_url(dsn: &str) -> Result<MssqlDsn, TunnelError> {
    let url = Url::parse(dsn).map_err(TunnelError::malformed_dsn)?;

    let mut config = Config::new();
    // same as encrypt=false when the key is absent
    config.encryption(EncryptionLevel::Off);
    if let Some(host) = url.host_str() {
        config.host(host);
    }

    let instance = url.path().trim_matches('/');
    match url.port() {
        Some(port) => {
            config.port(port);
            if !instance.is_empty() {
                tracing::debug!(instance, port, "mssql: explicit port given, instance name ignored");
            }
        }
        None if !instance.is_empty() => {
            return Err(TunnelError::malformed_dsn(DsnError::InstanceWithoutPort(
                instance.to_string(),
            )));
        }
        None => {}
    }

    let user = decode(url.username(), "user")?;
    if !user.is_empty() {
        let password = decode(url.password().unwrap_or_default(), "password")?;
        config.authentication(AuthMethod::sql_server(&*user, &*password));
    }

    let mut connect_timeout = None;
    for (key, value) in url.query_pairs() {
        let key = key.to_ascii_lowercase();
        match key.as_str() {
            "database" => config.database(&*value),
            "app name" => config.application_name(&*value),
            "connection timeout" => connect_timeout = parse_timeout(&key, &value)?,
            "encrypt" => {
                let level = match value.to_ascii_lowercase().as_str() {
                    "disable" => EncryptionLevel::NotSupported,
                    "false" => EncryptionLevel::Off,
                    "true" | "strict" => EncryptionLevel::Required,
                    _ => return Err(invalid(&key, &value)),
                };
                config.encryption(level);
            }
            "trustservercertificate" => {
                if parse_bool(&value).ok_or_else(|| invalid(&key, &value))? {
                    config.trust_cert();
                }
            }
            _ => tracing::debug!(parameter = %key, "mssql: ignoring unknown DSN parameter"),
        }
    }

    Ok(MssqlDsn {
        config,
        connect_timeout,
    })
}

fn decode<'a>(raw: &'a str, part: &'static str) -> Result<Cow<'a, str>, TunnelError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| TunnelError::malformed_dsn(DsnError::InvalidEncoding(part)))
}

/// Seconds to wait for dial plus login; `0` disables the limit.
fn parse_timeout(key: &str, value: &str) -> Result<Option<Duration>, TunnelError> {
    let secs: u64 = value.trim().parse().map_err(|_| invalid(key, value))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// `key=value` pairs of a `;`-separated connection string, keys lowercased.
///
/// Values wrapped in `{}`, `'` or `"` may contain `;`. Segments without `=`,
/// such as the leading `jdbc:sqlserver://host:port`, are skipped.
fn split_properties(input: &str) -> Vec<(String, String)> {
    let mut properties = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let (segment, tail) = next_segment(rest);
        rest = tail;
        if let Some((key, value)) = segment.split_once('=') {
            properties.push((key.trim().to_ascii_lowercase(), unquote(value.trim()).to_string()));
        }
    }
    properties
}

fn next_segment(input: &str) -> (&str, &str) {
    let key_end = input.find(['=', ';']).unwrap_or(input.len());

    let mut scan_from = key_end;
    if input[key_end..].starts_with('=') {
        let value = &input[key_end + 1..];
        let trimmed = value.trim_start();
        let value_start = key_end + 1 + (value.len() - trimmed.len());
        let close = match trimmed.chars().next() {
            Some('{') => Some('}'),
            Some(quote @ ('\'' | '"')) => Some(quote),
            _ => None,
        };
        scan_from = match close {
            Some(close) => trimmed[1..]
                .find(close)
                .map_or(input.len(), |at| value_start + 1 + at + 1),
            None => value_start,
        };
    }

    match input[scan_from..].find(';') {
        Some(at) => (&input[..scan_from + at], &input[scan_from + at + 1..]),
        None => (input, ""),
    }
}

fn unquote(value: &str) -> &str {
    for (open, close) in [('{', '}'), ('\'', '\''), ('"', '"')] {
        if value.len() >= 2 && value.starts_with(open) && value.ends_with(close) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, value: &str) -> TunnelError {
    TunnelError::malformed_dsn(DsnError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
