//! Error types for inschrijving retrieval.

use thiserror::Error;

/// Fault code the registry uses to signal that a KVK number has no record.
pub const NOT_FOUND_FAULT_CODE: &str = "IPD0004";

/// Errors returned while retrieving an inschrijving.
#[derive(Error, Debug)]
pub enum InschrijvingError {
    /// No certificate or private key, and the cache could not answer.
    #[error("no certificate or private key, so no connection possible with HRDS")]
    MissingCredential,

    /// Credential material was rejected while signing the envelope.
    #[error("signing error: {0}")]
    Signing(String),

    /// An empty KVK number matches every cache entry and no registry record.
    #[error("KVK nummer is empty")]
    EmptyKvkNummer,

    /// Connection, TLS or network failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The registry answered with a non-200 HTTP status.
    #[error("unexpected HTTP status {status}{}", fault.as_ref().map(|f| format!(": {f}")).unwrap_or_default())]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// SOAP faultstring, when the body carried one
        fault: Option<String>,
    },

    /// The registry returned a business fault other than "not found".
    #[error("{description}")]
    ProtocolFault {
        /// Registry fault code
        code: String,
        /// Human-readable fault description
        description: String,
    },

    /// The KVK number has no matching record.
    #[error("inschrijving niet gevonden op basis van het KVK nummer {kvk_nummer}")]
    NotFound {
        /// The KVK number that was looked up
        kvk_nummer: String,
    },

    /// A cached document could not be read or deserialized.
    #[error("cache read error: {0}")]
    CacheRead(String),

    /// The reply is not well-formed XML.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// The reply is XML but not a usable SOAP envelope.
    #[error("invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    /// The network step was aborted by a shutdown signal.
    #[error("request cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InschrijvingError {
    /// Map a registry fault onto the error taxonomy.
    pub fn from_fault(kvk_nummer: &str, code: &str, description: &str) -> Self {
        if code == NOT_FOUND_FAULT_CODE {
            Self::NotFound {
                kvk_nummer: kvk_nummer.to_string(),
            }
        } else {
            Self::ProtocolFault {
                code: code.to_string(),
                description: description.to_string(),
            }
        }
    }

    /// True for the expected negative result: the registry has no record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors the orchestrator absorbs as a cache miss.
    #[must_use]
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheRead(_))
    }
}

/// Result alias for inschrijving operations.
pub type InschrijvingResult<T> = std::result::Result<T, InschrijvingError>;
