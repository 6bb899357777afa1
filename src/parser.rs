//! Parsing and classification of registry replies.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).
//! Element matching is on local names; namespace prefixes are ignored.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::config::SoapVersion;
use crate::envelope::{SOAP_11_NS, SOAP_12_NS};
use crate::error::{InschrijvingError, InschrijvingResult};
use crate::model::{
    Eigenaar, Functionaris, MaatschappelijkeActiviteit, Melding, OphalenInschrijvingResponse,
    Product, SbiActiviteit, Vestiging,
};
use crate::transport::TransportReply;

/// Local name of the response payload element.
pub const RESPONSE_ELEMENT: &str = "ophalenInschrijvingResponse";

/// A SOAP-level `Fault` from the Body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub reason: String,
}

/// Parsed reply envelope.
#[derive(Debug, Clone)]
pub struct SoapReply {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// Business payload, if the Body carried one
    pub response: Option<OphalenInschrijvingResponse>,
    /// SOAP Fault, if the Body carried one
    pub fault: Option<SoapFault>,
}

/// Parse raw bytes as a reply envelope.
pub fn parse_reply(data: &[u8]) -> InschrijvingResult<SoapReply> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| InschrijvingError::XmlParse(format!("Invalid UTF-8: {}", e)))?;

    check_xxe_patterns(xml_str)?;

    let mut reader = Reader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut version: Option<SoapVersion> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut collector = Collector::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                open_element(e, &mut stack, &mut version)?;
                collector.open(&path(&stack));
            }

            Ok(Event::Empty(ref e)) => {
                // Self-closing tags like <datumEinde/>
                open_element(e, &mut stack, &mut version)?;
                collector.open(&path(&stack));
                stack.pop();
            }

            Ok(Event::End(_)) => {
                stack.pop();
            }

            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| InschrijvingError::XmlParse(format!("XML parse error: {}", e)))?;
                collector.text(&path(&stack), &text);
            }

            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                collector.text(&path(&stack), &text);
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(InschrijvingError::XmlParse(format!("XML parse error: {}", e)));
            }

            _ => {}
        }
    }

    let version = version.ok_or_else(|| {
        InschrijvingError::InvalidEnvelope(
            "No valid SOAP Envelope found with recognized namespace".to_string(),
        )
    })?;

    if !collector.saw_body {
        return Err(InschrijvingError::InvalidEnvelope(
            "SOAP Body is missing".to_string(),
        ));
    }

    let response = collector.response.map(|mut response| {
        response.inschrijving_xml = xml_str.to_string();
        response
    });

    Ok(SoapReply {
        version,
        response,
        fault: collector.fault,
    })
}

/// Parse a document known to be a successful reply, such as a cache entry.
///
/// No fault classification is applied.
pub fn parse_document(data: &[u8]) -> InschrijvingResult<OphalenInschrijvingResponse> {
    parse_reply(data)?.response.ok_or_else(|| {
        InschrijvingError::InvalidEnvelope(format!("no {} in SOAP Body", RESPONSE_ELEMENT))
    })
}

/// Classify a transport reply: status, then faults, then success.
pub fn interpret(
    kvk_nummer: &str,
    reply: &TransportReply,
) -> InschrijvingResult<OphalenInschrijvingResponse> {
    if !reply.is_ok() {
        let fault = parse_reply(&reply.body)
            .ok()
            .and_then(|r| r.fault)
            .map(|f| f.reason);
        warn!(status = reply.status, fault = ?fault, "Unable to validate (status code invalid)");
        return Err(InschrijvingError::UnexpectedStatus {
            status: reply.status,
            fault,
        });
    }

    let parsed = parse_reply(&reply.body)?;

    if let Some(fault) = parsed.fault {
        warn!(code = %fault.code, reason = %fault.reason, "SOAP fault experienced during call");
        return Err(InschrijvingError::from_fault(
            kvk_nummer,
            &fault.code,
            &fault.reason,
        ));
    }

    let response = parsed.response.ok_or_else(|| {
        InschrijvingError::InvalidEnvelope(format!("no {} in SOAP Body", RESPONSE_ELEMENT))
    })?;

    if let Some(fout) = response.fout() {
        warn!(
            kvk_nummer = %kvk_nummer,
            code = %fout.code,
            omschrijving = %fout.omschrijving,
            "Registry fault experienced during call"
        );
        return Err(InschrijvingError::from_fault(
            kvk_nummer,
            &fout.code,
            &fout.omschrijving,
        ));
    }

    debug!(kvk_nummer = %kvk_nummer, "Registry reply accepted");
    Ok(response)
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> InschrijvingResult<()> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(InschrijvingError::XmlParse(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }

    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(InschrijvingError::XmlParse(
            "Entity declarations are not allowed".to_string(),
        ));
    }

    Ok(())
}

fn open_element(
    e: &BytesStart,
    stack: &mut Vec<String>,
    version: &mut Option<SoapVersion>,
) -> InschrijvingResult<()> {
    let local_name = local_name_str(e);

    if stack.is_empty() {
        if local_name != "Envelope" {
            return Err(InschrijvingError::InvalidEnvelope(format!(
                "expected Envelope root element, found {}",
                local_name
            )));
        }
        *version = match element_namespace(e).as_deref() {
            Some(SOAP_11_NS) => Some(SoapVersion::Soap11),
            Some(SOAP_12_NS) => Some(SoapVersion::Soap12),
            _ => None,
        };
    }

    stack.push(local_name);
    Ok(())
}

fn path(stack: &[String]) -> Vec<&str> {
    stack.iter().map(String::as_str).collect()
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    String::from_utf8_lossy(name.as_ref()).into_owned()
}

/// Namespace URI bound to the element's own prefix, when declared on the element.
fn element_namespace(e: &BytesStart) -> Option<String> {
    let name = e.name();
    let qualified = String::from_utf8_lossy(name.as_ref());
    let wanted = match qualified.split_once(':') {
        Some((prefix, _)) => format!("xmlns:{}", prefix),
        None => "xmlns".to_string(),
    };

    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == wanted.as_bytes())
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn parse_flag(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "ja")
}

/// Builds the typed response while walking the document.
#[derive(Default)]
struct Collector {
    saw_body: bool,
    response: Option<OphalenInschrijvingResponse>,
    fault: Option<SoapFault>,
}

impl Collector {
    fn activity(&mut self) -> Option<&mut MaatschappelijkeActiviteit> {
        self.response
            .as_mut()?
            .product
            .as_mut()?
            .maatschappelijke_activiteit
            .as_mut()
    }

    fn open(&mut self, path: &[&str]) {
        match path {
            ["Envelope", "Body"] => self.saw_body = true,
            ["Envelope", "Body", "Fault"] => self.fault = Some(SoapFault::default()),
            ["Envelope", "Body", RESPONSE_ELEMENT] => {
                self.response = Some(OphalenInschrijvingResponse::default());
            }
            [.., RESPONSE_ELEMENT, "meldingen", "fout"] => {
                if let Some(r) = self.response.as_mut() {
                    r.meldingen.fout = Some(Melding::default());
                }
            }
            [.., RESPONSE_ELEMENT, "meldingen", "waarschuwing"] => {
                if let Some(r) = self.response.as_mut() {
                    r.meldingen.waarschuwingen.push(Melding::default());
                }
            }
            [.., RESPONSE_ELEMENT, "product"] => {
                if let Some(r) = self.response.as_mut() {
                    r.product = Some(Product::default());
                }
            }
            [.., "product", "maatschappelijkeActiviteit"] => {
                if let Some(p) = self.response.as_mut().and_then(|r| r.product.as_mut()) {
                    p.maatschappelijke_activiteit = Some(MaatschappelijkeActiviteit::default());
                }
            }
            [.., "sbiActiviteiten", "sbiActiviteit"] => {
                if let Some(ma) = self.activity() {
                    ma.sbi_activiteiten.push(SbiActiviteit::default());
                }
            }
            [.., "maatschappelijkeActiviteit", "heeftAlsEigenaar"] => {
                if let Some(ma) = self.activity() {
                    ma.heeft_als_eigenaar = Some(Eigenaar::default());
                }
            }
            [.., "vestigingen", "vestiging"] => {
                if let Some(ma) = self.activity() {
                    ma.vestigingen.push(Vestiging::default());
                }
            }
            [.., "functionarissen", "functionaris"] => {
                if let Some(ma) = self.activity() {
                    ma.functionarissen.push(Functionaris::default());
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, path: &[&str], text: &str) {
        let value = text.to_string();
        match path {
            // SOAP 1.1 and 1.2 faults
            ["Envelope", "Body", "Fault", "faultcode"]
            | ["Envelope", "Body", "Fault", "Code", "Value"] => {
                if let Some(f) = self.fault.as_mut() {
                    f.code = value;
                }
            }
            ["Envelope", "Body", "Fault", "faultstring"]
            | ["Envelope", "Body", "Fault", "Reason", "Text"] => {
                if let Some(f) = self.fault.as_mut() {
                    f.reason = value;
                }
            }

            [.., "meldingen", "fout", field] => {
                if let Some(fout) = self.response.as_mut().and_then(|r| r.meldingen.fout.as_mut()) {
                    set_melding(fout, field, value);
                }
            }
            [.., "meldingen", "waarschuwing", field] => {
                if let Some(w) = self
                    .response
                    .as_mut()
                    .and_then(|r| r.meldingen.waarschuwingen.last_mut())
                {
                    set_melding(w, field, value);
                }
            }
            [.., "product", "peilmoment"] => {
                if let Some(p) = self.response.as_mut().and_then(|r| r.product.as_mut()) {
                    p.peilmoment = Some(value);
                }
            }

            [.., "maatschappelijkeActiviteit", field] => {
                if let Some(ma) = self.activity() {
                    match *field {
                        "kvkNummer" => ma.kvk_nummer = value,
                        "naam" => ma.naam = Some(value),
                        _ => {}
                    }
                }
            }
            [.., "maatschappelijkeActiviteit", "registratie", field] => {
                if let Some(ma) = self.activity() {
                    match *field {
                        "datumAanvang" => ma.registratie.datum_aanvang = Some(value),
                        "datumEinde" => ma.registratie.datum_einde = Some(value),
                        _ => {}
                    }
                }
            }
            [.., "maatschappelijkeActiviteit", "handelsnamen", "handelsnaam"] => {
                if let Some(ma) = self.activity() {
                    ma.handelsnamen.push(value);
                }
            }
            [.., "sbiActiviteiten", "sbiActiviteit", field] => {
                if let Some(a) = self.activity().and_then(|ma| ma.sbi_activiteiten.last_mut()) {
                    match *field {
                        "sbiCode" => a.sbi_code = value,
                        "omschrijving" => a.omschrijving = Some(value),
                        "isHoofdactiviteit" => a.is_hoofdactiviteit = parse_flag(&value),
                        _ => {}
                    }
                }
            }
            [.., "maatschappelijkeActiviteit", "heeftAlsEigenaar", field] => {
                if let Some(eigenaar) = self.activity().and_then(|ma| ma.heeft_als_eigenaar.as_mut())
                {
                    match *field {
                        "rsin" => eigenaar.rsin = Some(value),
                        "naam" => eigenaar.naam = Some(value),
                        "rechtsvorm" => eigenaar.rechtsvorm = Some(value),
                        _ => {}
                    }
                }
            }
            [.., "vestigingen", "vestiging", field] => {
                if let Some(v) = self.activity().and_then(|ma| ma.vestigingen.last_mut()) {
                    match *field {
                        "vestigingsnummer" => v.vestigingsnummer = value,
                        "eersteHandelsnaam" => v.eerste_handelsnaam = Some(value),
                        "isHoofdvestiging" => v.is_hoofdvestiging = parse_flag(&value),
                        _ => {}
                    }
                }
            }
            [.., "functionarissen", "functionaris", field] => {
                if let Some(f) = self.activity().and_then(|ma| ma.functionarissen.last_mut()) {
                    match *field {
                        "naam" => f.naam = Some(value),
                        "functie" => f.functie = Some(value),
                        "bevoegdheid" => f.bevoegdheid = Some(value),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn set_melding(melding: &mut Melding, field: &str, value: String) {
    match field {
        "code" => melding.code = value,
        "omschrijving" => melding.omschrijving = value,
        _ => {}
    }
}
