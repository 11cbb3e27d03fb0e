use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::series::COL_TIMESTAMP;

/// One scraped table row: column name → trimmed cell text, exactly as the
/// page renders it. Nothing is parsed or calibrated at this stage.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RawReading {
    columns: BTreeMap<String, String>,
}

impl RawReading {
    pub fn from_columns(columns: BTreeMap<String, String>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &String)> {
        self.columns.iter()
    }
}

/// Scrapes the tide table from the pilots' page.
#[derive(Clone)]
pub struct TideTableFetcher {
    client: reqwest::Client,
    url: String,
}

impl TideTableFetcher {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_rows(&self) -> Result<Vec<RawReading>, FetchError> {
        debug!("Sending HTTP request to tide table page");
        let response = self.client.get(&self.url).send().await?;
        debug!("Received HTTP response with status: {}", response.status());

        let html = response.text().await?;
        debug!("Retrieved HTML content, size: {} bytes", html.len());

        self.parse_html(&html)
    }

    #[instrument(skip(self, html), fields(html_size = html.len()))]
    fn parse_html(&self, html: &str) -> Result<Vec<RawReading>, FetchError> {
        debug!("Parsing HTML document");
        let document = Html::parse_document(html);
        let table_selector = Selector::parse("table").unwrap();
        let header_selector = Selector::parse("thead th").unwrap();
        let row_selector = Selector::parse("tbody tr").unwrap();
        let cell_selector = Selector::parse("td").unwrap();

        // The page carries several tables; the tide table is the one whose
        // header row includes the timestamp column.
        let (table, headers) = document
            .select(&table_selector)
            .find_map(|table| {
                let headers: Vec<String> = table
                    .select(&header_selector)
                    .map(|th| cell_text(th))
                    .collect();
                if headers.iter().any(|h| h == COL_TIMESTAMP) {
                    Some((table, headers))
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                warn!("No table with a '{}' header found in page", COL_TIMESTAMP);
                FetchError::TableNotFound
            })?;

        debug!("Found tide table with headers: {:?}", headers);

        let mut rows = Vec::new();
        let mut skipped_rows = 0;
        for row in table.select(&row_selector) {
            let cells: Vec<String> = row.select(&cell_selector).map(cell_text).collect();
            if cells.is_empty() {
                skipped_rows += 1;
                continue;
            }

            let columns: BTreeMap<String, String> = headers
                .iter()
                .cloned()
                .zip(cells)
                .collect();
            rows.push(RawReading::from_columns(columns));
        }

        if skipped_rows > 0 {
            warn!("Skipped {} cell-less table rows", skipped_rows);
        }
        debug!("Scraped {} rows from tide table", rows.len());

        Ok(rows)
    }
}

fn cell_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{COL_FORECAST, COL_MEASURED};

    #[test]
    fn test_parse_html_with_tide_table() {
        let html = r#"
            <html><body>
            <table>
              <thead><tr><th>DD HH:MM</th><th>Medição</th><th>Previsão</th></tr></thead>
              <tbody>
                <tr><td>05/08/2024 10:00</td><td>0.34</td><td>0.40</td></tr>
                <tr><td>05/08/2024 10:10</td><td>-</td><td>0.41</td></tr>
              </tbody>
            </table>
            </body></html>
        "#;

        let fetcher = TideTableFetcher::new(String::new());
        let rows = fetcher.parse_html(html).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(COL_TIMESTAMP), Some("05/08/2024 10:00"));
        assert_eq!(rows[0].get(COL_MEASURED), Some("0.34"));
        assert_eq!(rows[1].get(COL_MEASURED), Some("-"));
        assert_eq!(rows[1].get(COL_FORECAST), Some("0.41"));
    }

    #[test]
    fn test_parse_html_skips_other_tables() {
        let html = r#"
            <html><body>
            <table>
              <thead><tr><th>Navio</th><th>Calado</th></tr></thead>
              <tbody><tr><td>MV Example</td><td>9.8</td></tr></tbody>
            </table>
            <table>
              <thead><tr><th>DD HH:MM</th><th>Medição</th></tr></thead>
              <tbody><tr><td>05/08/2024 10:00</td><td>0.34</td></tr></tbody>
            </table>
            </body></html>
        "#;

        let fetcher = TideTableFetcher::new(String::new());
        let rows = fetcher.parse_html(html).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Navio"), None);
        assert_eq!(rows[0].get(COL_MEASURED), Some("0.34"));
    }

    #[test]
    fn test_parse_html_short_row_keeps_leading_columns() {
        let html = r#"
            <table>
              <thead><tr><th>DD HH:MM</th><th>Medição</th><th>Previsão</th></tr></thead>
              <tbody><tr><td>05/08/2024 10:00</td><td>0.34</td></tr></tbody>
            </table>
        "#;

        let fetcher = TideTableFetcher::new(String::new());
        let rows = fetcher.parse_html(html).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(COL_FORECAST), None);
    }

    #[test]
    fn test_parse_html_no_table() {
        let html = "<html><body><p>Manutenção programada</p></body></html>";

        let fetcher = TideTableFetcher::new(String::new());
        let result = fetcher.parse_html(html);
        assert!(matches!(result, Err(FetchError::TableNotFound)));
    }

    #[test]
    fn test_parse_html_empty_tbody_is_empty_batch() {
        let html = r#"
            <table>
              <thead><tr><th>DD HH:MM</th><th>Medição</th></tr></thead>
              <tbody></tbody>
            </table>
        "#;

        let fetcher = TideTableFetcher::new(String::new());
        let rows = fetcher.parse_html(html).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_html_with_sample_page() {
        let html = include_str!("../http/sample_page.html");

        let fetcher = TideTableFetcher::new(String::new());
        let rows = fetcher.parse_html(html).unwrap();

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].get(COL_TIMESTAMP), Some("04/08/2024 22:40"));
        assert_eq!(rows[0].get(COL_MEASURED), Some("0.31"));

        let dashes = rows
            .iter()
            .filter(|r| r.get(COL_MEASURED) == Some("-"))
            .count();
        assert_eq!(dashes, 2);
    }
}
