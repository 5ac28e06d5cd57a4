use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{IngestError, Result};

/// One trusted data source, identified by its (ip, port) pair.
///
/// Identity is value equality on both fields; two endpoints differing in
/// either ip or port are distinct sensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEndpoint {
    pub ip: String,
    pub port: u16,
}

impl FromStr for SensorEndpoint {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddr = s.parse().map_err(|_| {
            IngestError::Config(format!("malformed sensor endpoint '{s}', expected ip:port"))
        })?;
        Ok(Self {
            ip: addr.ip().to_string(),
            port: addr.port(),
        })
    }
}

impl fmt::Display for SensorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Allow-list consulted for every incoming datagram.
///
/// Built once at startup and never mutated afterwards; lookups are exact
/// matches and never fail on malformed wire input.
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    sensors: Vec<SensorEndpoint>,
}

impl SensorRegistry {
    /// Parses `ip:port` specs into a registry. An empty list or a
    /// malformed spec is a configuration error.
    pub fn from_specs(specs: &[String]) -> Result<Self> {
        if specs.is_empty() {
            return Err(IngestError::Config(
                "at least one sensor endpoint must be configured".into(),
            ));
        }
        let sensors = specs
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<SensorEndpoint>>>()?;
        Ok(Self { sensors })
    }

    /// Exact match on both ip and port.
    pub fn contains(&self, ip: &str, port: u16) -> bool {
        self.sensors.iter().any(|s| s.ip == ip && s.port == port)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
