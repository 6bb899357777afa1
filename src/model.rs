//! Request and response payloads of the `ophalenInschrijving` operation.

use serde::{Deserialize, Serialize};

use crate::envelope::{xml_escape, DATASERVICE_NS};

/// Business payload placed in the SOAP Body.
pub trait BodyPayload {
    /// Serialize the payload as an XML fragment in exclusive canonical form.
    fn to_xml(&self) -> String;
}

/// Request for a single inschrijving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OphalenInschrijvingRequest {
    pub kvk_nummer: String,
}

impl BodyPayload for OphalenInschrijvingRequest {
    fn to_xml(&self) -> String {
        format!(
            "<ophalenInschrijvingRequest xmlns=\"{ns}\">\
<kvkNummer>{kvk_nummer}</kvkNummer>\
</ophalenInschrijvingRequest>",
            ns = DATASERVICE_NS,
            kvk_nummer = xml_escape(&self.kvk_nummer),
        )
    }
}

/// Structured `ophalenInschrijvingResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OphalenInschrijvingResponse {
    /// Messages from the registry, including the fault section
    pub meldingen: Meldingen,

    /// The registered product, absent when a fault was returned
    pub product: Option<Product>,

    /// The verbatim response document this value was parsed from
    #[serde(skip)]
    pub inschrijving_xml: String,
}

impl OphalenInschrijvingResponse {
    /// The registry fault, if any.
    pub fn fout(&self) -> Option<&Melding> {
        self.meldingen.fout.as_ref()
    }

    pub fn maatschappelijke_activiteit(&self) -> Option<&MaatschappelijkeActiviteit> {
        self.product
            .as_ref()
            .and_then(|p| p.maatschappelijke_activiteit.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meldingen {
    pub fout: Option<Melding>,
    pub waarschuwingen: Vec<Melding>,
}

/// A coded registry message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Melding {
    pub code: String,
    pub omschrijving: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Moment the registry snapshot was taken
    pub peilmoment: Option<String>,
    pub maatschappelijke_activiteit: Option<MaatschappelijkeActiviteit>,
}

/// The registered business activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaatschappelijkeActiviteit {
    pub kvk_nummer: String,
    pub naam: Option<String>,
    pub registratie: Registratie,
    pub handelsnamen: Vec<String>,
    pub sbi_activiteiten: Vec<SbiActiviteit>,
    pub heeft_als_eigenaar: Option<Eigenaar>,
    pub vestigingen: Vec<Vestiging>,
    pub functionarissen: Vec<Functionaris>,
}

impl MaatschappelijkeActiviteit {
    pub fn hoofdactiviteit(&self) -> Option<&SbiActiviteit> {
        self.sbi_activiteiten.iter().find(|a| a.is_hoofdactiviteit)
    }

    pub fn hoofdvestiging(&self) -> Option<&Vestiging> {
        self.vestigingen.iter().find(|v| v.is_hoofdvestiging)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registratie {
    pub datum_aanvang: Option<String>,
    pub datum_einde: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbiActiviteit {
    pub sbi_code: String,
    pub omschrijving: Option<String>,
    pub is_hoofdactiviteit: bool,
}

/// Owner of the activity (legal entity or natural person).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eigenaar {
    pub rsin: Option<String>,
    pub naam: Option<String>,
    pub rechtsvorm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vestiging {
    pub vestigingsnummer: String,
    pub eerste_handelsnaam: Option<String>,
    pub is_hoofdvestiging: bool,
}

/// A person holding a function, with their authority to represent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Functionaris {
    pub naam: Option<String>,
    pub functie: Option<String>,
    pub bevoegdheid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_xml() {
        let request = OphalenInschrijvingRequest {
            kvk_nummer: "12345678".to_string(),
        };
        assert_eq!(
            request.to_xml(),
            "<ophalenInschrijvingRequest xmlns=\"http://schemas.kvk.nl/schemas/hrip/dataservice/2015/02\">\
<kvkNummer>12345678</kvkNummer></ophalenInschrijvingRequest>"
        );
    }

    #[test]
    fn test_request_xml_escapes_input() {
        let request = OphalenInschrijvingRequest {
            kvk_nummer: "1<2&3".to_string(),
        };
        assert!(request.to_xml().contains("<kvkNummer>1&lt;2&amp;3</kvkNummer>"));
    }

    #[test]
    fn test_hoofdactiviteit_and_hoofdvestiging() {
        let ma = MaatschappelijkeActiviteit {
            sbi_activiteiten: vec![
                SbiActiviteit {
                    sbi_code: "4711".into(),
                    ..Default::default()
                },
                SbiActiviteit {
                    sbi_code: "1071".into(),
                    is_hoofdactiviteit: true,
                    ..Default::default()
                },
            ],
            vestigingen: vec![Vestiging {
                vestigingsnummer: "000012345678".into(),
                is_hoofdvestiging: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(ma.hoofdactiviteit().unwrap().sbi_code, "1071");
        assert_eq!(ma.hoofdvestiging().unwrap().vestigingsnummer, "000012345678");
    }

    #[test]
    fn test_raw_document_not_serialized() {
        let response = OphalenInschrijvingResponse {
            inschrijving_xml: "<raw/>".into(),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&response).unwrap();
        assert!(!yaml.contains("<raw/>"));
        assert!(yaml.contains("meldingen"));
    }
}
