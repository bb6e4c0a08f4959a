//! Statistics workbooks linked from listing pages.
//!
//! Each workbook source discovers `.xlsx` links on its listing page,
//! downloads new files into `<data_dir>/<source>/` and counts the records
//! in every local workbook.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::fetch_listing;
use super::html::{find_file_links, FileLink};
use crate::config::Settings;
use crate::http_client::Fetcher;
use crate::refresh::{SourceRefreshResult, SourceRoutine};

/// Counts the records in a downloaded workbook.
pub trait WorkbookParser: Send + Sync {
    fn count_records(&self, path: &Path) -> anyhow::Result<usize>;
}

/// Counts non-empty rows of the first worksheet, minus header rows.
///
/// Works on the raw sheet XML inside the `.xlsx` container, so it is
/// independent of column layout.
#[derive(Debug, Clone, Copy)]
pub struct SheetRowCounter {
    pub header_rows: usize,
}

impl Default for SheetRowCounter {
    fn default() -> Self {
        Self { header_rows: 1 }
    }
}

impl SheetRowCounter {
    fn first_sheet_name<R: Read + std::io::Seek>(archive: &ZipArchive<R>) -> Option<String> {
        let mut sheets: Vec<&str> = archive
            .file_names()
            .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
            .collect();
        // sheet2.xml sorts before sheet10.xml
        sheets.sort_by_key(|name| (name.len(), *name));
        sheets.first().map(|name| name.to_string())
    }
}

fn row_has_value(row: &str) -> bool {
    row.contains("<v>") || row.contains("<v ") || row.contains("<is>")
}

impl WorkbookParser for SheetRowCounter {
    fn count_records(&self, path: &Path) -> anyhow::Result<usize> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).context("not an xlsx workbook")?;
        let Some(sheet) = Self::first_sheet_name(&archive) else {
            bail!("workbook has no worksheets");
        };

        let mut xml = String::new();
        archive.by_name(&sheet)?.read_to_string(&mut xml)?;

        let rows = xml
            .split("<row")
            .skip(1)
            .map(|chunk| chunk.split("</row>").next().unwrap_or(chunk))
            .filter(|row| row_has_value(row))
            .count();
        Ok(rows.saturating_sub(self.header_rows))
    }
}

enum Download {
    Fetched(PathBuf),
    Existing(PathBuf),
    Failed(String),
}

/// One workbook-backed source.
pub struct WorkbookSource {
    name: &'static str,
    listing_url: String,
    base_url: String,
    target_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn WorkbookParser>,
    max_concurrent: usize,
}

impl WorkbookSource {
    pub fn new(
        name: &'static str,
        listing_path: &str,
        settings: &Settings,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            name,
            listing_url: settings.site_url(listing_path),
            base_url: settings.base_url.clone(),
            target_dir: settings.data_dir.join(name),
            fetcher,
            parser: Arc::new(SheetRowCounter::default()),
            max_concurrent: settings.max_concurrent_requests.max(1),
        }
    }

    /// School survey results.
    pub fn skolenkaten(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new("skolenkaten", &settings.skolenkaten_path, settings, fetcher)
    }

    /// Permit decisions for independent schools.
    pub fn tillstand(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new("tillstand", &settings.tillstand_path, settings, fetcher)
    }

    /// Supervision statistics.
    pub fn tillsyn(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new("tillsyn", &settings.tillsyn_path, settings, fetcher)
    }

    pub fn with_parser(mut self, parser: impl WorkbookParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    async fn download(&self, link: FileLink, force: bool) -> Download {
        let path = self.target_dir.join(&link.file_name);
        if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("{} already downloaded", link.file_name);
            return Download::Existing(path);
        }

        let bytes = match self.fetcher.fetch_bytes(&link.url).await {
            Ok(bytes) => bytes,
            Err(e) => return Download::Failed(format!("Download error {}: {}", link.file_name, e)),
        };

        match write_file(&path, &bytes).await {
            Ok(()) => {
                info!("Downloaded {} ({} bytes)", link.name, bytes.len());
                Download::Fetched(path)
            }
            Err(e) => Download::Failed(format!("Write error {}: {}", link.file_name, e)),
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[async_trait]
impl SourceRoutine for WorkbookSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn refresh(&self, force: bool, result: &mut SourceRefreshResult) -> anyhow::Result<()> {
        let html = fetch_listing(&*self.fetcher, &self.listing_url, force)
            .await
            .with_context(|| format!("fetching {}", self.listing_url))?;

        let mut file_names = HashSet::new();
        let links: Vec<FileLink> = find_file_links(&html, &self.base_url, "xlsx")
            .into_iter()
            .filter(|link| !link.file_name.is_empty())
            .filter(|link| {
                // Links sharing a file name would write the same local file
                let first = file_names.insert(link.file_name.clone());
                if !first {
                    debug!("Skipping {}: {} already listed", link.url, link.file_name);
                }
                first
            })
            .collect();
        if links.is_empty() {
            warn!("No workbooks linked from {}", self.listing_url);
            return Ok(());
        }
        info!("{}: {} workbook(s) listed", self.name, links.len());

        tokio::fs::create_dir_all(&self.target_dir)
            .await
            .with_context(|| format!("creating {}", self.target_dir.display()))?;

        let downloads: Vec<Download> = stream::iter(links)
            .map(|link| self.download(link, force))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut files = Vec::new();
        for download in downloads {
            match download {
                Download::Fetched(path) => {
                    result.items_fetched += 1;
                    files.push(path);
                }
                Download::Existing(path) => files.push(path),
                Download::Failed(error) => result.add_error(error),
            }
        }
        files.sort();

        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parser = self.parser.clone();
            let parse_path = path.clone();
            let counted = tokio::task::spawn_blocking(move || parser.count_records(&parse_path)).await;

            match counted {
                Ok(Ok(records)) => {
                    debug!("{}: {} records", file_name, records);
                    result.items_parsed += records as u64;
                }
                Ok(Err(e)) => result.add_error(format!("Parse error {}: {:#}", file_name, e)),
                Err(e) => result.add_error(format!("Parse error {}: {}", file_name, e)),
            }
        }

        Ok(())
    }
}
