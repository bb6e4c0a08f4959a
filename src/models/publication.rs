//! Publication index models.
//!
//! The JSON shape matches the `index.json` mirror format so existing data
//! directories load unchanged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::delta::{Dated, Keyed};

/// Publication type used when the URL matches no known category.
pub const DEFAULT_PUBLICATION_TYPE: &str = "ovriga-publikationer";

/// Known publication types: URL slug and display label.
pub const PUBLICATION_TYPES: &[(&str, &str)] = &[
    ("kvalitetsgranskning", "Kvalitetsgranskning"),
    ("tematisk-kvalitetsgranskning", "Tematisk kvalitetsgranskning"),
    ("regelbunden-kvalitetsgranskning", "Regelbunden kvalitetsgranskning"),
    ("planerad-kvalitetsgranskning", "Planerad kvalitetsgranskning"),
    ("tillsynsbeslut", "Tillsynsbeslut"),
    ("regelbunden-tillsyn", "Regelbunden tillsyn"),
    ("planerad-tillsyn", "Planerad tillsyn"),
    ("riktad-tillsyn", "Riktad tillsyn"),
    ("tematisk-tillsyn", "Tematisk tillsyn"),
    ("oanmald-granskning", "Oanmäld granskning"),
    ("skolenkaten", "Skolenkäten"),
    ("forskoleenkaten", "Förskoleenkäten"),
    ("ombedomning-nationella-prov", "Ombedömning nationella prov"),
    ("regeringsrapporter", "Rapport till regeringen"),
    ("statistikrapporter", "Statistikrapport"),
    ("arsrapporter", "Årsrapport"),
    ("granskningsrapporter", "Granskningsrapport"),
    ("remissvar", "Remissvar"),
    ("vagledningar", "Vägledning"),
    (DEFAULT_PUBLICATION_TYPE, "Övriga publikationer"),
];

/// Display label for a publication type slug.
pub fn publication_type_label(slug: &str) -> Option<&'static str> {
    PUBLICATION_TYPES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, label)| *label)
}

/// Last path segment of a URL, used as a stable slug.
pub fn slug_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// A downloadable file attached to a publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// A report, review or decision summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub published: Option<NaiveDate>,
    #[serde(default)]
    pub updated: Option<NaiveDate>,
    #[serde(default)]
    pub diarienummer: Option<String>,
    #[serde(rename = "type")]
    pub publication_type: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub skolformer: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Publication {
    pub fn new(title: impl Into<String>, url: impl Into<String>, publication_type: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            slug: slug_from_url(&url),
            url,
            published: None,
            updated: None,
            diarienummer: None,
            publication_type: publication_type.into(),
            summary: None,
            themes: Vec::new(),
            subjects: Vec::new(),
            skolformer: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

impl Keyed for Publication {
    fn key(&self) -> &str {
        &self.url
    }
}

impl Dated for Publication {
    fn date(&self) -> Option<NaiveDate> {
        self.published
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressRelease {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub published: Option<NaiveDate>,
}

impl PressRelease {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            slug: slug_from_url(&url),
            url,
            published: None,
        }
    }
}

impl Keyed for PressRelease {
    fn key(&self) -> &str {
        &self.url
    }
}

impl Dated for PressRelease {
    fn date(&self) -> Option<NaiveDate> {
        self.published
    }
}

/// An inspection decision for one school. Carried through the index as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub school_name: String,
    #[serde(default)]
    pub school_id: Option<String>,
    #[serde(default)]
    pub kommun: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub huvudman: Option<String>,
    #[serde(default)]
    pub skolform: Option<String>,
    pub decision_type: String,
    #[serde(default)]
    pub decision_date: Option<NaiveDate>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub has_deficiencies: Option<bool>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A downloadable statistics workbook or report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsFile {
    pub name: String,
    pub url: String,
    pub file_type: String,
    /// Source category, e.g. `skolenkaten` or `tillstand`.
    pub category: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The complete scraped index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub press_releases: Vec<PressRelease>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub statistics_files: Vec<StatisticsFile>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl Index {
    pub fn total_items(&self) -> usize {
        self.publications.len()
            + self.press_releases.len()
            + self.decisions.len()
            + self.statistics_files.len()
    }
}
