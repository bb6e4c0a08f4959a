//! Extraction of listing items from the authority's HTML pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{Attachment, PressRelease, Publication, DEFAULT_PUBLICATION_TYPE, PUBLICATION_TYPES};
use crate::utils::normalize_whitespace;

macro_rules! css {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse($css).ok());
    };
}

css!(PUBLICATION_ITEMS, "article, .search-result-item, .publication-item");
css!(FALLBACK_ITEMS, "[class*='result'], [class*='item']");
css!(PUBLICATION_LINK, "a[href*='/publikationer/'], h2 a, h3 a, .title a");
css!(PUBLICATION_DATE, "time, .date, [class*='date'], [class*='published']");
css!(SUMMARY, "p, .summary, .description, [class*='excerpt']");
css!(PDF_LINK, "a[href$='.pdf']");
css!(PRESS_ITEMS, "article, .press-item, [class*='news-item']");
css!(PRESS_DATE, "time, .date, [class*='date']");
css!(ANCHOR, "a");
css!(ANCHOR_WITH_HREF, "a[href]");

static COUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)av\s+(\d+)\s+resultat",
        r"(?i)(\d+)\s+träffar",
        r"(?i)totalt\s+(\d+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static DAY_MONTH_YEAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s+(\w+)\s+(\d{4})").ok());

const SWEDISH_MONTHS: [&str; 12] = [
    "januari", "februari", "mars", "april", "maj", "juni", "juli", "augusti", "september",
    "oktober", "november", "december",
];

fn select_all<'a>(scope: ElementRef<'a>, selector: &Option<Selector>) -> Vec<ElementRef<'a>> {
    match selector {
        Some(selector) => scope.select(selector).collect(),
        None => Vec::new(),
    }
}

fn select_one<'a>(scope: ElementRef<'a>, selector: &Option<Selector>) -> Option<ElementRef<'a>> {
    selector.as_ref().and_then(|s| scope.select(s).next())
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Resolve `href` against `base_url`, dropping query string and fragment.
pub fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    let mut url = Url::parse(base_url).ok()?.join(href.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Strip `base_url` from an absolute URL, keeping foreign URLs intact.
pub fn relative_url(base_url: &str, url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match url.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => url.to_string(),
    }
}

/// Most specific publication type whose slug occurs in `url`.
pub fn publication_type_for_url(url: &str) -> &'static str {
    PUBLICATION_TYPES
        .iter()
        .map(|(slug, _)| *slug)
        .filter(|slug| *slug != DEFAULT_PUBLICATION_TYPE && url.contains(slug))
        .max_by_key(|slug| slug.len())
        .unwrap_or(DEFAULT_PUBLICATION_TYPE)
}

/// Total result count announced on a search results page.
pub fn extract_total_count(html: &str) -> Option<u64> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    COUNT_PATTERNS
        .iter()
        .find_map(|re| re.captures(&text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a listing date: ISO dates and date-times, Swedish `2 maj 2024`,
/// and English month names.
pub fn parse_listing_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = DAY_MONTH_YEAR.as_ref().and_then(|re| re.captures(text)) {
        let month = SWEDISH_MONTHS
            .iter()
            .position(|m| caps[2].eq_ignore_ascii_case(m))
            .and_then(|i| u32::try_from(i + 1).ok());
        if let (Some(month), Ok(day), Ok(year)) = (month, caps[1].parse::<u32>(), caps[3].parse::<i32>()) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    // `datetime` attributes often carry an offset
    if let Some(date) = text
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    {
        return Some(date);
    }

    ["%d %B %Y", "%d %b %Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn element_date(item: ElementRef<'_>, selector: &Option<Selector>) -> Option<NaiveDate> {
    let element = select_one(item, selector)?;
    match element.value().attr("datetime") {
        Some(attr) => parse_listing_date(attr),
        None => parse_listing_date(&element_text(element)),
    }
}

fn parse_publication_item(item: ElementRef<'_>, base_url: &str) -> Option<Publication> {
    let link = select_one(item, &PUBLICATION_LINK)?;
    let title = element_text(link);
    let absolute = resolve_url(base_url, link.value().attr("href")?)?;
    if title.is_empty() {
        return None;
    }

    let mut publication = Publication::new(
        title,
        relative_url(base_url, &absolute),
        publication_type_for_url(&absolute),
    );
    publication.published = element_date(item, &PUBLICATION_DATE);
    publication.summary = select_one(item, &SUMMARY)
        .map(element_text)
        .filter(|s| !s.is_empty());

    if let Some(pdf) = select_one(item, &PDF_LINK) {
        if let Some(url) = pdf.value().attr("href").and_then(|h| resolve_url(base_url, h)) {
            let name = element_text(pdf);
            publication.attachments.push(Attachment {
                name: if name.is_empty() { "Rapport".to_string() } else { name },
                url,
                file_type: Some("pdf".to_string()),
            });
        }
    }

    Some(publication)
}

/// Publications listed on one search results page, deduplicated by URL.
pub fn parse_publication_list(html: &str, base_url: &str) -> Vec<Publication> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut items = select_all(root, &PUBLICATION_ITEMS);
    if items.is_empty() {
        items = select_all(root, &FALLBACK_ITEMS);
    }

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| parse_publication_item(item, base_url))
        .filter(|p| seen.insert(p.url.clone()))
        .collect()
}

/// Press releases listed on the press page.
pub fn parse_press_releases(html: &str, base_url: &str) -> Vec<PressRelease> {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut releases = Vec::new();
    for item in select_all(document.root_element(), &PRESS_ITEMS) {
        let Some(link) = select_one(item, &ANCHOR) else {
            continue;
        };
        let Some(absolute) = link.value().attr("href").and_then(|h| resolve_url(base_url, h)) else {
            continue;
        };
        let title = element_text(link);
        if title.is_empty() || !seen.insert(absolute.clone()) {
            continue;
        }

        let mut release = PressRelease::new(title, relative_url(base_url, &absolute));
        release.published = element_date(item, &PRESS_DATE);
        releases.push(release);
    }
    releases
}

/// A file link found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    /// Link text, or the file name when the link has no text.
    pub name: String,
    pub url: String,
    pub file_name: String,
}

/// Links to files with `extension` (case-insensitive), in page order.
pub fn find_file_links(html: &str, base_url: &str, extension: &str) -> Vec<FileLink> {
    let document = Html::parse_document(html);
    let suffix = format!(".{}", extension.to_ascii_lowercase());

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in select_all(document.root_element(), &ANCHOR_WITH_HREF) {
        let Some(url) = anchor.value().attr("href").and_then(|h| resolve_url(base_url, h)) else {
            continue;
        };
        if !url.to_ascii_lowercase().ends_with(&suffix) || !seen.insert(url.clone()) {
            continue;
        }

        let file_name = url.rsplit('/').next().unwrap_or_default().to_string();
        let text = element_text(anchor);
        links.push(FileLink {
            name: if text.is_empty() { file_name.clone() } else { text },
            url,
            file_name,
        });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.skolinspektionen.se";

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <p class="count">Visar 1-20 av 334 resultat</p>
          <article>
            <h2><a href="/beslut-rapporter/publikationer/tematisk-kvalitetsgranskning/2024/matematik/?utm_source=x">
              Undervisning i   matematik</a></h2>
            <time datetime="2024-05-02T08:00:00+02:00">2 maj 2024</time>
            <p>En granskning av matematikundervisningen.</p>
            <a href="/globalassets/rapport.pdf">Ladda ner</a>
          </article>
          <article>
            <h3><a href="/beslut-rapporter/publikationer/remissvar/2023/yttrande/">Yttrande</a></h3>
            <span class="date">14 december 2023</span>
          </article>
          <article><span>No link here</span></article>
        </body></html>
    "#;

    #[test]
    fn test_extract_total_count() {
        assert_eq!(extract_total_count(SEARCH_PAGE), Some(334));
        assert_eq!(extract_total_count("<p>Hittade 12 träffar</p>"), Some(12));
        assert_eq!(extract_total_count("<p>Totalt 7</p>"), Some(7));
        assert_eq!(extract_total_count("<p>inga</p>"), None);
    }

    #[test]
    fn test_parse_publication_list() {
        let publications = parse_publication_list(SEARCH_PAGE, BASE);
        assert_eq!(publications.len(), 2);

        let first = &publications[0];
        assert_eq!(first.title, "Undervisning i matematik");
        assert_eq!(
            first.url,
            "/beslut-rapporter/publikationer/tematisk-kvalitetsgranskning/2024/matematik/"
        );
        assert_eq!(first.slug, "matematik");
        assert_eq!(first.publication_type, "tematisk-kvalitetsgranskning");
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(
            first.summary.as_deref(),
            Some("En granskning av matematikundervisningen.")
        );
        assert_eq!(first.attachments.len(), 1);
        assert_eq!(first.attachments[0].url, "https://www.skolinspektionen.se/globalassets/rapport.pdf");

        let second = &publications[1];
        assert_eq!(second.publication_type, "remissvar");
        assert_eq!(second.published, NaiveDate::from_ymd_opt(2023, 12, 14));
    }

    #[test]
    fn test_fallback_item_selector() {
        let html = r#"<div class="list-item"><a href="/beslut-rapporter/publikationer/x/">X</a></div>"#;
        let publications = parse_publication_list(html, BASE);
        assert_eq!(publications.len(), 1);
        assert_eq!(publications[0].publication_type, DEFAULT_PUBLICATION_TYPE);
    }

    #[test]
    fn test_parse_press_releases() {
        let html = r#"
            <div class="news-item"><a href="/om-oss/press/pressmeddelanden/2024/nytt/">Nytt beslut</a>
              <time datetime="2024-01-10">10 januari 2024</time></div>
            <div class="news-item"><span>empty</span></div>
        "#;
        let releases = parse_press_releases(html, BASE);
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].url, "/om-oss/press/pressmeddelanden/2024/nytt/");
        assert_eq!(releases[0].published, NaiveDate::from_ymd_opt(2024, 1, 10));
    }

    #[test]
    fn test_parse_listing_date_formats() {
        assert_eq!(parse_listing_date("3 mars 2025"), NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(parse_listing_date("2025-03-03"), NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(parse_listing_date("2025-03-03T10:00:00"), NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(parse_listing_date("March 3, 2025"), NaiveDate::from_ymd_opt(2025, 3, 3));
        assert_eq!(parse_listing_date("31 februari 2025"), None);
        assert_eq!(parse_listing_date(""), None);
    }

    #[test]
    fn test_find_file_links() {
        let html = r#"
            <a href="/globalassets/statistik/skolenkaten-2024.xlsx">Skolenkäten 2024</a>
            <a href="/globalassets/statistik/skolenkaten-2024.xlsx">duplicate</a>
            <a href="https://cdn.example.com/data/RESULTAT.XLSX"></a>
            <a href="/globalassets/rapport.pdf">PDF</a>
        "#;
        let links = find_file_links(html, BASE, "xlsx");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "Skolenkäten 2024");
        assert_eq!(
            links[0].url,
            "https://www.skolinspektionen.se/globalassets/statistik/skolenkaten-2024.xlsx"
        );
        assert_eq!(links[1].name, "RESULTAT.XLSX");
        assert_eq!(links[1].file_name, "RESULTAT.XLSX");
    }

    #[test]
    fn test_relative_url() {
        assert_eq!(relative_url(BASE, "https://www.skolinspektionen.se/a/b/"), "/a/b/");
        assert_eq!(relative_url("https://www.skolinspektionen.se/", "https://www.skolinspektionen.se/a"), "/a");
        assert_eq!(relative_url(BASE, "https://other.se/a"), "https://other.se/a");
    }
}
