//! KVK Handelsregister inschrijving client
//!
//! Retrieves the registration record ("inschrijving") for a KVK number from the
//! Handelsregister dataservice, using WS-Security signed SOAP over mutual TLS,
//! with an on-disk cache of raw replies.
//!
//! # Features
//!
//! - Directory cache keyed by KVK-number prefix, written atomically
//! - SOAP 1.1/1.2 envelopes with WS-Addressing headers
//! - X.509 token signing (RSA-SHA256, exclusive C14N)
//! - Reply classification: HTTP status, SOAP faults, registry meldingen
//! - Cancellation of the network step via a shutdown future
//!
//! # Example
//!
//! ```ignore
//! use kvk_inschrijving::{Credential, Environment, InschrijvingClient, InschrijvingConfig};
//!
//! let client = InschrijvingClient::new(InschrijvingConfig::default());
//! let credential = Credential::from_files("client.crt".as_ref(), "client.key".as_ref())?;
//! let response = client
//!     .retrieve("12345678", &credential, true, Environment::Prd)
//!     .await?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod parser;
pub mod transport;
pub mod wsse;

pub use cache::{CacheStore, DirectoryCache};
pub use client::{get_inschrijving, ClientStats, InschrijvingClient};
pub use config::{Environment, InschrijvingConfig};
pub use error::{InschrijvingError, InschrijvingResult};
pub use model::OphalenInschrijvingResponse;
pub use transport::{HttpsTransport, Transport};
pub use wsse::Credential;
