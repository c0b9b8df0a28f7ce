use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ReportId, u64);
id_newtype!(ImageIndex, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisasterKind {
    Earthquake,
    Flood,
    Fire,
    Hurricane,
    Tornado,
}

impl DisasterKind {
    /// Lowercase string used by the registry contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisasterKind::Earthquake => "earthquake",
            DisasterKind::Flood => "flood",
            DisasterKind::Fire => "fire",
            DisasterKind::Hurricane => "hurricane",
            DisasterKind::Tornado => "tornado",
        }
    }
}

impl fmt::Display for DisasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisasterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earthquake" => Ok(DisasterKind::Earthquake),
            "flood" => Ok(DisasterKind::Flood),
            "fire" => Ok(DisasterKind::Fire),
            "hurricane" => Ok(DisasterKind::Hurricane),
            "tornado" => Ok(DisasterKind::Tornado),
            other => Err(format!("unknown disaster kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    /// Capitalized string used by the registry contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "Minor",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Minor" => Ok(Severity::Minor),
            "Moderate" => Ok(Severity::Moderate),
            "Severe" => Ok(Severity::Severe),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// The eleven business fields a reporter fills in before submission.
///
/// Kept as raw strings because form input arrives as text and the ledger
/// contract stores them verbatim. `first_missing_field` gates submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub reporter_name: String,
    pub email: String,
    pub disaster_type: String,
    pub image_url: String,
    pub latitude: String,
    pub longitude: String,
    pub city: String,
    pub state: String,
    pub date: String,
    pub severity: String,
    pub impact: String,
}

impl ReportDraft {
    /// Field name of the first missing entry, or `None` when complete.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("reporter_name", &self.reporter_name),
            ("email", &self.email),
            ("disaster_type", &self.disaster_type),
            ("image_url", &self.image_url),
            ("latitude", &self.latitude),
            ("longitude", &self.longitude),
            ("city", &self.city),
            ("state", &self.state),
            ("date", &self.date),
            ("severity", &self.severity),
            ("impact", &self.impact),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing_field().is_none()
    }

    /// Argument order expected by `createDisasterReport`.
    pub fn ledger_args(&self) -> Vec<serde_json::Value> {
        [
            &self.reporter_name,
            &self.email,
            &self.disaster_type,
            &self.image_url,
            &self.latitude,
            &self.longitude,
            &self.city,
            &self.state,
            &self.date,
            &self.severity,
            &self.impact,
        ]
        .into_iter()
        .map(|field| serde_json::Value::String(field.clone()))
        .collect()
    }
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A report as read back from the registry: the draft fields plus the
/// reporter address the contract records at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reporter_address: String,
    pub reporter_name: String,
    pub email: String,
    pub disaster_type: String,
    pub image_url: String,
    pub latitude: String,
    pub longitude: String,
    pub city: String,
    pub state: String,
    pub date: String,
    pub severity: String,
    pub impact: String,
}

impl Report {
    /// Decodes the positional tuple `getDisasterReport` returns:
    /// `[address, name, email, kind, img, lat, lon, city, state, date,
    /// severity, impact]`. A cleared slot comes back with an empty or
    /// zero reporter address and decodes to `None`.
    pub fn from_ledger_tuple(value: &serde_json::Value) -> Result<Option<Report>, String> {
        let fields = value
            .as_array()
            .ok_or_else(|| format!("expected array report tuple, got {value}"))?;
        if fields.len() < 12 {
            return Err(format!(
                "report tuple has {} positions, expected 12",
                fields.len()
            ));
        }

        let field = |idx: usize| -> Result<String, String> {
            fields[idx]
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| format!("report tuple position {idx} is not a string"))
        };

        let reporter_address = field(0)?;
        if reporter_address.is_empty() || reporter_address == ZERO_ADDRESS {
            return Ok(None);
        }

        Ok(Some(Report {
            reporter_address,
            reporter_name: field(1)?,
            email: field(2)?,
            disaster_type: field(3)?,
            image_url: field(4)?,
            latitude: field(5)?,
            longitude: field(6)?,
            city: field(7)?,
            state: field(8)?,
            date: field(9)?,
            severity: field(10)?,
            impact: field(11)?,
        }))
    }
}

/// An image attached to a report. Identity within the parent report is
/// positional: deleting index `i` shifts every later image down by one,
/// so indexes must never be cached across a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisasterImage {
    pub reporter_address: String,
    pub timestamp: String,
    pub image_url: String,
}

impl DisasterImage {
    /// Decodes one `[address, timestamp, url]` tuple from
    /// `getDisasterImages`.
    pub fn from_ledger_tuple(value: &serde_json::Value) -> Result<DisasterImage, String> {
        let fields = value
            .as_array()
            .ok_or_else(|| format!("expected array image tuple, got {value}"))?;
        if fields.len() < 3 {
            return Err(format!(
                "image tuple has {} positions, expected 3",
                fields.len()
            ));
        }
        let field = |idx: usize| -> Result<String, String> {
            fields[idx]
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| format!("image tuple position {idx} is not a string"))
        };
        Ok(DisasterImage {
            reporter_address: field(0)?,
            timestamp: field(1)?,
            image_url: field(2)?,
        })
    }
}

/// Read-only view of wallet connectivity shared by every flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletSnapshot {
    pub address: Option<String>,
    pub is_connected: bool,
    /// Token balance as the wallet reports it, e.g. `"12.345"`.
    pub balance: Option<String>,
}

/// Explorer link for a reporter address, as rendered next to identicons.
pub fn explorer_address_url(explorer_base: &str, address: &str) -> String {
    format!("{}/address/{address}", explorer_base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_reports_first_missing_field() {
        let mut draft = ReportDraft::default();
        assert_eq!(draft.first_missing_field(), Some("reporter_name"));
        draft.reporter_name = "Ada".into();
        assert_eq!(draft.first_missing_field(), Some("email"));
    }

    #[test]
    fn complete_draft_produces_eleven_args() {
        let draft = ReportDraft {
            reporter_name: "Ada".into(),
            email: "ada@example.com".into(),
            disaster_type: "flood".into(),
            image_url: "https://img.example/1.jpg".into(),
            latitude: "6.52".into(),
            longitude: "3.37".into(),
            city: "Lagos".into(),
            state: "Lagos".into(),
            date: "2024-03-01".into(),
            severity: "Severe".into(),
            impact: "Streets flooded".into(),
        };
        assert!(draft.is_complete());
        assert_eq!(draft.ledger_args().len(), 11);
    }

    #[test]
    fn whitespace_only_field_counts_as_missing() {
        let draft = ReportDraft {
            reporter_name: "   ".into(),
            ..ReportDraft::default()
        };
        assert_eq!(draft.first_missing_field(), Some("reporter_name"));
    }

    #[test]
    fn report_decodes_from_positional_tuple() {
        let tuple = json!([
            "0xabc", "Ada", "ada@example.com", "flood", "https://img", "6.5", "3.3", "Lagos",
            "Lagos", "2024-03-01", "Severe", "Streets flooded"
        ]);
        let report = Report::from_ledger_tuple(&tuple)
            .expect("decode")
            .expect("present");
        assert_eq!(report.reporter_address, "0xabc");
        assert_eq!(report.severity, "Severe");
    }

    #[test]
    fn cleared_slot_decodes_to_none() {
        let tuple = json!([ZERO_ADDRESS, "", "", "", "", "", "", "", "", "", "", ""]);
        assert_eq!(Report::from_ledger_tuple(&tuple).expect("decode"), None);
    }

    #[test]
    fn short_tuple_is_an_error_not_a_missing_report() {
        let tuple = json!(["0xabc", "Ada"]);
        assert!(Report::from_ledger_tuple(&tuple).is_err());
    }

    #[test]
    fn disaster_kind_round_trips_contract_strings() {
        for kind in [
            DisasterKind::Earthquake,
            DisasterKind::Flood,
            DisasterKind::Fire,
            DisasterKind::Hurricane,
            DisasterKind::Tornado,
        ] {
            assert_eq!(kind.as_str().parse::<DisasterKind>(), Ok(kind));
        }
        assert!("mudslide".parse::<DisasterKind>().is_err());
    }

    #[test]
    fn explorer_url_joins_without_double_slash() {
        assert_eq!(
            explorer_address_url("https://explorer.example/alfajores/", "0xabc"),
            "https://explorer.example/alfajores/address/0xabc"
        );
    }
}
