//! Municipal education KPIs from the Kolada v2 API.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use super::write_json_atomic;
use crate::config::Settings;
use crate::http_client::{FetchError, Fetcher};
use crate::models::{KoladaSnapshot, KpiDataResponse, KpiValue, MunicipalityStats};
use crate::refresh::{SourceRefreshResult, SourceRoutine};

/// Education KPIs collected per municipality: id and title.
pub const EDUCATION_KPIS: &[(&str, &str)] = &[
    ("N15005", "Kostnad grundskola, kr/elev"),
    ("N15030", "Elever/lärare (årsarbetare) i grundskolan, kommunal regi, antal"),
    ("N15406", "Elever i åk 9 med godkänt betyg i alla ämnen, hemkommun, andel (%)"),
    ("N15425", "Elever i åk 9 som uppnått kunskapskraven i alla ämnen, hemkommun, andel (%)"),
    (
        "N15451",
        "Elever i åk 9 med godkända betyg i engelska, matematik och svenska/svenska som andraspråk, hemkommun, andel (%)",
    ),
    ("N15428", "Genomsnittligt meritvärde (17 ämnen), åk 9, hemkommun"),
    ("N15500", "Behöriga lärare i grundskolan, kommunal regi, andel (%)"),
    ("N15507", "Elever per lärare, lägeskommun, grundskola, antal"),
    ("N17005", "Kostnad gymnasieskola hemkommun, kr/elev"),
    ("N17445", "Gymnasieelever med examen inom 3 år, hemkommun, andel (%)"),
    (
        "N17473",
        "Gymnasieelever som uppnått grundläggande behörighet till universitet och högskola inom 3 år, hemkommun, andel (%)",
    ),
    ("N17500", "Behöriga lärare i gymnasieskolan, kommunal regi, andel (%)"),
    ("N11008", "Kostnad förskola, kr/inskrivet barn"),
    ("N11041", "Heltidstjänster i förskolan med förskollärarexamen, lägeskommun, andel (%)"),
    ("N11701", "Barn per barngrupp i förskola, lägeskommun, antal"),
];

/// The ten largest municipalities: id and name.
pub const DEFAULT_MUNICIPALITIES: &[(&str, &str)] = &[
    ("0180", "Stockholm"),
    ("1480", "Göteborg"),
    ("1280", "Malmö"),
    ("0380", "Uppsala"),
    ("1281", "Lund"),
    ("0580", "Linköping"),
    ("1880", "Örebro"),
    ("0680", "Jönköping"),
    ("1980", "Västerås"),
    ("2580", "Umeå"),
];

pub struct KoladaSource {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    output_dir: PathBuf,
    municipalities: Vec<String>,
    year: Option<i32>,
}

impl KoladaSource {
    pub const NAME: &'static str = "kolada";

    pub fn new(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: settings.kolada_base_url.trim_end_matches('/').to_string(),
            output_dir: settings.data_dir.join(Self::NAME),
            municipalities: DEFAULT_MUNICIPALITIES.iter().map(|(id, _)| id.to_string()).collect(),
            year: None,
        }
    }

    pub fn with_municipalities(mut self, ids: Vec<String>) -> Self {
        self.municipalities = ids;
        self
    }

    /// Restrict to one year. Without a year the latest values are used.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn output_path(&self) -> PathBuf {
        let suffix = match self.year {
            Some(year) => year.to_string(),
            None => "latest".to_string(),
        };
        self.output_dir.join(format!("education_stats_{}.json", suffix))
    }

    fn kpi_url(&self, kpi: &str, municipality: &str) -> String {
        let mut url = format!("{}/data/kpi/{}/municipality/{}", self.base_url, kpi, municipality);
        if let Some(year) = self.year {
            url.push_str(&format!("/year/{}", year));
        }
        url
    }

    async fn fetch_kpi(&self, kpi: &str, municipality: &str) -> Result<KpiDataResponse, FetchError> {
        let text = self.fetcher.fetch_text(&self.kpi_url(kpi, municipality)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// All education KPIs for one municipality.
    ///
    /// Individual KPI failures are skipped; the call only fails when every
    /// KPI request failed.
    pub async fn fetch_municipality(&self, municipality: &str) -> Result<MunicipalityStats, FetchError> {
        let responses = join_all(
            EDUCATION_KPIS
                .iter()
                .map(|(kpi, _)| self.fetch_kpi(kpi, municipality)),
        )
        .await;

        let mut kpis = BTreeMap::new();
        let mut failures = 0;
        let mut last_error = None;
        for ((kpi, title), response) in EDUCATION_KPIS.iter().zip(responses) {
            match response {
                Ok(data) => {
                    if let Some((value, period)) = data.first_total() {
                        kpis.insert(
                            kpi.to_string(),
                            KpiValue {
                                title: title.to_string(),
                                value,
                                period,
                            },
                        );
                    }
                }
                Err(e) => {
                    debug!("KPI {} for {} failed: {}", kpi, municipality, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error.filter(|_| failures == EDUCATION_KPIS.len()) {
            return Err(e);
        }

        Ok(MunicipalityStats {
            municipality_id: municipality.to_string(),
            year: self.year,
            kpis,
        })
    }
}

#[async_trait]
impl SourceRoutine for KoladaSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn refresh(&self, _force: bool, result: &mut SourceRefreshResult) -> anyhow::Result<()> {
        let mut municipalities = BTreeMap::new();

        for id in &self.municipalities {
            match self.fetch_municipality(id).await {
                Ok(stats) => {
                    if !stats.kpis.is_empty() {
                        result.items_fetched += 1;
                    }
                    municipalities.insert(id.clone(), stats);
                }
                Err(e) => result.add_error(format!("Kolada error {}: {}", id, e)),
            }
        }

        result.items_parsed = municipalities.len() as u64;
        let snapshot = KoladaSnapshot {
            fetched_at: Utc::now(),
            year: self.year,
            municipalities,
            kpi_definitions: EDUCATION_KPIS
                .iter()
                .map(|(id, title)| (id.to_string(), title.to_string()))
                .collect(),
        };

        let path = self.output_path();
        write_json_atomic(&path, &snapshot)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            "Kolada: {} municipalities saved to {}",
            snapshot.municipalities.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::Other(format!("unexpected fetch of {}", url)))
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Other(format!("unexpected fetch of {}", url)))
        }
    }

    #[test]
    fn test_urls_and_output_path() {
        let settings = Settings::with_data_dir("/tmp/si");
        let source = KoladaSource::new(&settings, Arc::new(NoFetch));
        assert_eq!(
            source.kpi_url("N15005", "0180"),
            "https://api.kolada.se/v2/data/kpi/N15005/municipality/0180"
        );
        assert_eq!(
            source.output_path(),
            PathBuf::from("/tmp/si/kolada/education_stats_latest.json")
        );

        let source = source.with_year(2023);
        assert!(source.kpi_url("N15005", "0180").ends_with("/municipality/0180/year/2023"));
        assert!(source.output_path().ends_with("education_stats_2023.json"));
    }

    #[tokio::test]
    async fn test_municipality_fails_when_every_kpi_fails() {
        let settings = Settings::with_data_dir("/tmp/si");
        let source = KoladaSource::new(&settings, Arc::new(NoFetch));
        let err = source.fetch_municipality("0180").await.unwrap_err();
        assert!(err.to_string().contains("unexpected fetch"));
    }
}
