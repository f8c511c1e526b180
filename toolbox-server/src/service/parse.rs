//! HTML extraction for scraped documentation pages

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use toolbox_core::domain::scrape::{CommandEntry, ScrapeTask};

/// Marker in the `href` of command reference links
pub const REFERENCE_PATH: &str = "/cli-reference/";

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

/// Page summary from `<meta name="description">`, falling back to `og:description`
pub fn extract_summary(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    meta_content(&document, r#"meta[name="description"]"#)
        .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#))
}

/// Command rows of the first table on the page
///
/// The header row is skipped. A row counts when its first cell contains a
/// `<code>` element and both the command and its description are non-empty.
pub fn extract_commands(html: &str) -> Vec<CommandEntry> {
    let document = Html::parse_document(html);
    commands_in(&document).unwrap_or_default()
}

fn commands_in(document: &Html) -> Option<Vec<CommandEntry>> {
    let table_sel = Selector::parse("table").ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td, th").ok()?;
    let code_sel = Selector::parse("code").ok()?;

    let table = document.select(&table_sel).next()?;

    let entries = table
        .select(&row_sel)
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            if cells.len() < 2 {
                return None;
            }

            let command = element_text(cells[0].select(&code_sel).next()?);
            let description = element_text(cells[1]);
            (!command.is_empty() && !description.is_empty()).then_some(CommandEntry {
                command,
                description,
            })
        })
        .collect();

    Some(entries)
}

/// Scrape tasks linked from a table-of-contents page
///
/// Keeps links under [`REFERENCE_PATH`] whose text matches one of
/// `categories` (case-insensitive). URLs are resolved against `base_url` and
/// deduplicated, keeping the first occurrence.
pub fn extract_tasks(html: &str, base_url: &str, categories: &[String]) -> Vec<ScrapeTask> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(link_sel) = Selector::parse(&format!(r#"a[href*="{}"]"#, REFERENCE_PATH)) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for link in document.select(&link_sel) {
        let name = element_text(link);
        if !categories.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
            continue;
        }

        let Some(url) = link.value().attr("href").and_then(|href| base.join(href).ok()) else {
            continue;
        };

        if seen.insert(url.to_string()) {
            tasks.push(ScrapeTask::new(name, url.to_string()));
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <meta name="description" content="  Retrieve   system
                information ">
            <meta property="og:description" content="ignored">
          </head>
          <body>
            <table>
              <tr><th>Command</th><th>Description</th></tr>
              <tr><td><code>get system status</code></td><td>Show   system status</td></tr>
              <tr><td>no code here</td><td>skipped</td></tr>
              <tr><td><code>get system performance</code></td><td></td></tr>
              <tr><td><code>get hardware nic</code></td><th>NIC details</th></tr>
            </table>
            <table>
              <tr><th>Other</th><th>Table</th></tr>
              <tr><td><code>never read</code></td><td>second table</td></tr>
            </table>
          </body>
        </html>
    "#;

    #[test]
    fn test_summary_prefers_meta_description() {
        assert_eq!(
            extract_summary(PAGE).as_deref(),
            Some("Retrieve system information")
        );
    }

    #[test]
    fn test_summary_falls_back_to_open_graph() {
        let html = r#"<head>
            <meta name="description" content="   ">
            <meta property="og:description" content="OG summary">
        </head>"#;
        assert_eq!(extract_summary(html).as_deref(), Some("OG summary"));
    }

    #[test]
    fn test_summary_missing() {
        assert_eq!(extract_summary("<html><head><title>x</title></head></html>"), None);
    }

    #[test]
    fn test_commands_from_first_table_only() {
        let commands = extract_commands(PAGE);

        assert_eq!(
            commands,
            vec![
                CommandEntry {
                    command: "get system status".to_string(),
                    description: "Show system status".to_string(),
                },
                CommandEntry {
                    command: "get hardware nic".to_string(),
                    description: "NIC details".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_page_without_table_has_no_commands() {
        assert!(extract_commands("<p>nothing</p>").is_empty());
    }

    #[test]
    fn test_extract_tasks_filters_resolves_and_dedupes() {
        let toc = r#"
            <nav>
              <a href="/docs/cli-reference/get">Get</a>
              <a href="./cli-reference/show">show</a>
              <a href="cli-reference/execute">execute</a>
              <a href="/docs/cli-reference/get">GET</a>
              <a href="/docs/cli-reference/alias">alias</a>
              <a href="/docs/admin-guide/config">config</a>
              <a href="https://other.example.com/cli-reference/diagnose"> diagnose </a>
            </nav>
        "#;
        let categories: Vec<String> = ["get", "diagnose", "execute", "config", "show"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let tasks = extract_tasks(toc, "https://docs.example.com/docs/", &categories);

        assert_eq!(
            tasks,
            vec![
                ScrapeTask::new("Get", "https://docs.example.com/docs/cli-reference/get"),
                ScrapeTask::new("show", "https://docs.example.com/docs/cli-reference/show"),
                ScrapeTask::new(
                    "diagnose",
                    "https://other.example.com/cli-reference/diagnose"
                ),
            ]
        );
    }

    #[test]
    fn test_extract_tasks_invalid_base() {
        let toc = r#"<a href="/cli-reference/get">get</a>"#;
        assert!(extract_tasks(toc, "not a base", &["get".to_string()]).is_empty());
    }
}
