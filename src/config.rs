//! Configuration types for the inschrijving client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{InschrijvingError, InschrijvingResult};

/// Main configuration for the inschrijving client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InschrijvingConfig {
    /// Config version
    pub version: String,

    /// Registry environment to talk to
    pub environment: Environment,

    /// Response cache configuration
    pub cache: CacheConfig,

    /// HTTP transport configuration
    pub transport: TransportConfig,

    /// SOAP envelope configuration
    pub soap: SoapConfig,

    /// Endpoint per environment
    pub endpoints: EndpointsConfig,

    /// Client certificate and key locations
    pub credentials: CredentialsConfig,
}

impl Default for InschrijvingConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            environment: Environment::default(),
            cache: CacheConfig::default(),
            transport: TransportConfig::default(),
            soap: SoapConfig::default(),
            endpoints: EndpointsConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl InschrijvingConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(content: &str) -> InschrijvingResult<Self> {
        serde_yaml::from_str(content).map_err(|e| InschrijvingError::Config(e.to_string()))
    }
}

/// Registry environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Pre-production dataservice
    #[default]
    Preprod,
    /// Production dataservice
    Prd,
}

impl Environment {
    /// Interpret an environment tag: `"prd"` is production, anything else pre-production.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "prd" {
            Self::Prd
        } else {
            Self::Preprod
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprod => "preprod",
            Self::Prd => "prd",
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Consult and populate the cache
    pub enabled: bool,

    /// Directory holding cached responses
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(crate::cache::DEFAULT_CACHE_DIR),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Total request timeout in seconds (None = no explicit timeout)
    pub timeout_secs: Option<u64>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(60),
            connect_timeout_secs: 10,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// SOAP envelope configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SoapConfig {
    /// Envelope version used for requests
    pub version: SoapVersion,
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    #[default]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

/// A dataservice endpoint: URL plus the WS-Addressing `To` value that belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// HTTPS URL the envelope is posted to
    pub url: String,
    /// Destination address placed in the `To` header
    pub to_address: String,
}

/// Endpoints per environment. URL and `To` address always travel together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub preproduction: Endpoint,
    pub production: Endpoint,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            preproduction: Endpoint {
                url: "https://webservices.preprod.kvk.nl/postbus2".to_string(),
                to_address: "http://es.kvk.nl/KVK-DataservicePP/2015/02".to_string(),
            },
            production: Endpoint {
                url: "https://webservices.kvk.nl/postbus2".to_string(),
                to_address: "http://es.kvk.nl/KVK-Dataservice/2015/02".to_string(),
            },
        }
    }
}

impl EndpointsConfig {
    /// Select the endpoint for an environment.
    pub fn for_environment(&self, environment: Environment) -> &Endpoint {
        match environment {
            Environment::Preprod => &self.preproduction,
            Environment::Prd => &self.production,
        }
    }
}

/// Locations of the PEM client certificate and private key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub certificate_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InschrijvingConfig::default();
        assert_eq!(config.environment, Environment::Preprod);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.directory, PathBuf::from("cache-inschrijvingen"));
        assert_eq!(config.soap.version, SoapVersion::Soap11);
        assert_eq!(config.transport.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_config_serialization() {
        let config = InschrijvingConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = InschrijvingConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.endpoints.production, config.endpoints.production);
        assert_eq!(parsed.transport.connect_timeout_secs, config.transport.connect_timeout_secs);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
environment: prd
cache:
  enabled: false
  directory: /var/cache/kvk
transport:
  timeout_secs: 15
soap:
  version: "1.2"
credentials:
  certificate_path: /etc/kvk/client.crt
  private_key_path: /etc/kvk/client.key
"#;
        let config = InschrijvingConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.environment, Environment::Prd);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/kvk"));
        assert_eq!(config.transport.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.soap.version, SoapVersion::Soap12);
        assert_eq!(
            config.credentials.certificate_path,
            Some(PathBuf::from("/etc/kvk/client.crt"))
        );
        assert_eq!(
            config.endpoints.for_environment(Environment::Prd).url,
            "https://webservices.kvk.nl/postbus2"
        );
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = InschrijvingConfig::from_yaml("environment: [").unwrap_err();
        assert!(matches!(err, InschrijvingError::Config(_)));
    }

    #[test]
    fn test_environment_from_tag() {
        assert_eq!(Environment::from_tag("prd"), Environment::Prd);
        assert_eq!(Environment::from_tag("preprod"), Environment::Preprod);
        assert_eq!(Environment::from_tag(""), Environment::Preprod);
        assert_eq!(Environment::from_tag("PRD"), Environment::Preprod);
    }

    #[test]
    fn test_endpoints_stay_paired() {
        let endpoints = EndpointsConfig::default();
        let pp = endpoints.for_environment(Environment::Preprod);
        assert!(pp.url.contains("preprod"));
        assert!(pp.to_address.ends_with("KVK-DataservicePP/2015/02"));
        let prd = endpoints.for_environment(Environment::Prd);
        assert!(!prd.url.contains("preprod"));
        assert!(prd.to_address.ends_with("KVK-Dataservice/2015/02"));
    }
}
