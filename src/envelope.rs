//! Signed SOAP request envelopes.
//!
//! Every signed part (body, addressing headers, timestamp) and the
//! `SignedInfo` block is emitted directly in exclusive canonical form:
//! no insignificant whitespace, namespace declarations on the element that
//! uses them, sorted by prefix, attributes after namespaces, explicit end
//! tags. Digests and the signature are therefore taken over the exact bytes
//! that go on the wire.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::SoapVersion;
use crate::error::InschrijvingResult;
use crate::model::{BodyPayload, OphalenInschrijvingRequest};
use crate::wsse::{digest_value, Credential, WsseSigner};

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Dataservice payload namespace.
pub const DATASERVICE_NS: &str = "http://schemas.kvk.nl/schemas/hrip/dataservice/2015/02";

/// Action of the `ophalenInschrijving` operation, used as SOAPAction and `Action` header.
pub const OPHALEN_INSCHRIJVING_ACTION: &str = "http://es.kvk.nl/ophalenInschrijving";

pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
pub const X509_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
pub const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

const BODY_ID: &str = "_1";
const TIMESTAMP_ID: &str = "TS-1";
const TOKEN_ID: &str = "X509-1";

/// Validity window of the security timestamp.
const TIMESTAMP_TTL_SECS: i64 = 300;

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP_11_NS,
            SoapVersion::Soap12 => SOAP_12_NS,
        }
    }

    /// HTTP Content-Type for a request carrying `action`.
    pub fn content_type(&self, action: &str) -> String {
        match self {
            SoapVersion::Soap11 => "text/xml; charset=utf-8".to_string(),
            SoapVersion::Soap12 => {
                format!("application/soap+xml; charset=utf-8; action=\"{}\"", action)
            }
        }
    }
}

/// WS-Addressing header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingHeader {
    Action(String),
    MessageId(String),
    To(String),
}

impl AddressingHeader {
    fn local_name(&self) -> &'static str {
        match self {
            Self::Action(_) => "Action",
            Self::MessageId(_) => "MessageID",
            Self::To(_) => "To",
        }
    }

    fn id(&self) -> &'static str {
        match self {
            Self::Action(_) => "_2",
            Self::MessageId(_) => "_3",
            Self::To(_) => "_4",
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::Action(v) | Self::MessageId(v) | Self::To(v) => v,
        }
    }

    fn to_xml(&self) -> String {
        format!(
            "<wsa:{name} xmlns:wsa=\"{wsa}\" xmlns:wsu=\"{wsu}\" wsu:Id=\"{id}\">{value}</wsa:{name}>",
            name = self.local_name(),
            wsa = WSA_NS,
            wsu = WSU_NS,
            id = self.id(),
            value = xml_escape(self.value()),
        )
    }
}

/// Fresh `uuid:`-prefixed message identifier.
pub fn new_message_id() -> String {
    format!("uuid:{}", Uuid::new_v4())
}

/// A fully assembled and signed request envelope.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    /// SOAP version of the envelope
    pub version: SoapVersion,
    /// Action the envelope is addressed with
    pub action: String,
    /// WS-Addressing message id
    pub message_id: Option<String>,
    /// WS-Addressing destination
    pub to_address: Option<String>,
    /// Serialized document
    pub xml: String,
}

impl SignedEnvelope {
    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    pub fn content_type(&self) -> String {
        self.version.content_type(&self.action)
    }
}

/// Builds a signed envelope around one body payload.
pub struct EnvelopeBuilder {
    version: SoapVersion,
    action: String,
    headers: Vec<AddressingHeader>,
    body: String,
    issued_at: Option<DateTime<Utc>>,
}

impl EnvelopeBuilder {
    pub fn new(version: SoapVersion, action: impl Into<String>) -> Self {
        Self {
            version,
            action: action.into(),
            headers: Vec::new(),
            body: String::new(),
            issued_at: None,
        }
    }

    /// Append an addressing header. Order is preserved.
    pub fn header(mut self, header: AddressingHeader) -> Self {
        self.headers.push(header);
        self
    }

    pub fn payload(mut self, payload: &impl BodyPayload) -> Self {
        self.body = payload.to_xml();
        self
    }

    /// Override the timestamp creation time (defaults to now).
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Assemble the envelope and sign it.
    pub fn build(self, signer: &WsseSigner) -> InschrijvingResult<SignedEnvelope> {
        let soap_ns = self.version.namespace();

        let body_xml = format!(
            "<soap:Body xmlns:soap=\"{soap_ns}\" xmlns:wsu=\"{wsu}\" wsu:Id=\"{BODY_ID}\">{body}</soap:Body>",
            wsu = WSU_NS,
            body = self.body,
        );

        let created = self.issued_at.unwrap_or_else(Utc::now);
        let expires = created + Duration::seconds(TIMESTAMP_TTL_SECS);
        let timestamp_xml = format!(
            "<wsu:Timestamp xmlns:wsu=\"{wsu}\" wsu:Id=\"{TIMESTAMP_ID}\">\
<wsu:Created>{created}</wsu:Created>\
<wsu:Expires>{expires}</wsu:Expires>\
</wsu:Timestamp>",
            wsu = WSU_NS,
            created = created.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires = expires.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        let header_xml: Vec<String> = self.headers.iter().map(AddressingHeader::to_xml).collect();

        let mut references = vec![(BODY_ID, digest_value(body_xml.as_bytes()))];
        for (header, xml) in self.headers.iter().zip(&header_xml) {
            references.push((header.id(), digest_value(xml.as_bytes())));
        }
        references.push((TIMESTAMP_ID, digest_value(timestamp_xml.as_bytes())));

        let signed_info_xml = build_signed_info(&references);
        let signature = signer.sign(signed_info_xml.as_bytes())?;

        let security_xml = format!(
            "<wsse:Security xmlns:wsse=\"{wsse}\" xmlns:wsu=\"{wsu}\" soap:mustUnderstand=\"1\">\
<wsse:BinarySecurityToken EncodingType=\"{encoding}\" ValueType=\"{value_type}\" wsu:Id=\"{TOKEN_ID}\">{token}</wsse:BinarySecurityToken>\
{timestamp_xml}\
<ds:Signature xmlns:ds=\"{ds}\">\
{signed_info_xml}\
<ds:SignatureValue>{signature}</ds:SignatureValue>\
<ds:KeyInfo>\
<wsse:SecurityTokenReference>\
<wsse:Reference URI=\"#{TOKEN_ID}\" ValueType=\"{value_type}\"/>\
</wsse:SecurityTokenReference>\
</ds:KeyInfo>\
</ds:Signature>\
</wsse:Security>",
            wsse = WSSE_NS,
            wsu = WSU_NS,
            ds = DS_NS,
            encoding = BASE64_ENCODING_TYPE,
            value_type = X509_TOKEN_TYPE,
            token = BASE64.encode(signer.certificate_der()),
            signature = BASE64.encode(&signature),
        );

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"{soap_ns}\">\
<soap:Header>{security_xml}{headers}</soap:Header>\
{body_xml}\
</soap:Envelope>",
            headers = header_xml.concat(),
        );

        let message_id = self.headers.iter().find_map(|h| match h {
            AddressingHeader::MessageId(v) => Some(v.clone()),
            _ => None,
        });
        let to_address = self.headers.iter().find_map(|h| match h {
            AddressingHeader::To(v) => Some(v.clone()),
            _ => None,
        });

        debug!(
            action = %self.action,
            message_id = ?message_id,
            signed_parts = references.len(),
            "Built signed SOAP envelope"
        );

        Ok(SignedEnvelope {
            version: self.version,
            action: self.action,
            message_id,
            to_address,
            xml,
        })
    }
}

/// Build the signed `ophalenInschrijving` envelope for one KVK number.
///
/// The header set is fixed: the operation action, a fresh message id and the
/// environment's destination address.
pub fn ophalen_inschrijving_envelope(
    kvk_nummer: &str,
    version: SoapVersion,
    to_address: &str,
    credential: &Credential,
) -> InschrijvingResult<SignedEnvelope> {
    let signer = WsseSigner::from_credential(credential)?;
    let request = OphalenInschrijvingRequest {
        kvk_nummer: kvk_nummer.to_string(),
    };

    EnvelopeBuilder::new(version, OPHALEN_INSCHRIJVING_ACTION)
        .header(AddressingHeader::Action(OPHALEN_INSCHRIJVING_ACTION.to_string()))
        .header(AddressingHeader::MessageId(new_message_id()))
        .header(AddressingHeader::To(to_address.to_string()))
        .payload(&request)
        .build(&signer)
}

fn build_signed_info(references: &[(&str, String)]) -> String {
    let refs: String = references
        .iter()
        .map(|(id, digest)| {
            format!(
                "<ds:Reference URI=\"#{id}\">\
<ds:Transforms><ds:Transform Algorithm=\"{c14n}\"></ds:Transform></ds:Transforms>\
<ds:DigestMethod Algorithm=\"{sha256}\"></ds:DigestMethod>\
<ds:DigestValue>{digest}</ds:DigestValue>\
</ds:Reference>",
                c14n = EXC_C14N_ALGORITHM,
                sha256 = SHA256_ALGORITHM,
            )
        })
        .collect();

    format!(
        "<ds:SignedInfo xmlns:ds=\"{ds}\">\
<ds:CanonicalizationMethod Algorithm=\"{c14n}\"></ds:CanonicalizationMethod>\
<ds:SignatureMethod Algorithm=\"{rsa}\"></ds:SignatureMethod>\
{refs}\
</ds:SignedInfo>",
        ds = DS_NS,
        c14n = EXC_C14N_ALGORITHM,
        rsa = RSA_SHA256_ALGORITHM,
    )
}

/// Escape text content in canonical form.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#xD;")
}
