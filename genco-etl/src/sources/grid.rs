use scraper::{Html, Selector};

use crate::pipeline::PipelineError;

/// One text cell of the scraped report, with its position in the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub row: usize,
    pub col: usize,
    pub text: String,
}

impl RawCell {
    /// Blank and whitespace-only cells carry no value.
    pub fn is_missing(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The report as scraped: every `th` label in document order, and one row per
/// `tr` that has `td` cells, each prefixed with the report date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawGrid {
    pub fn cells(&self) -> impl Iterator<Item = RawCell> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells.iter().enumerate().map(move |(col, text)| RawCell {
                row,
                col,
                text: text.clone(),
            })
        })
    }
}

fn selector(css: &str) -> Result<Selector, PipelineError> {
    Selector::parse(css)
        .map_err(|e| PipelineError::Parse(format!("invalid selector '{css}': {e:?}")))
}

fn cell_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Read the header labels and data rows out of a rendered report page.
///
/// Rows without any `td` (header and spacer rows) are skipped.
pub fn parse_grid(html: &str, date_label: &str) -> Result<RawGrid, PipelineError> {
    let th = selector("th")?;
    let tr = selector("tr")?;
    let td = selector("td")?;

    let doc = Html::parse_document(html);

    let headers = doc.select(&th).map(cell_text).collect();

    let rows = doc
        .select(&tr)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&td).map(cell_text).collect();
            if cells.is_empty() {
                return None;
            }
            let mut prefixed = Vec::with_capacity(cells.len() + 1);
            prefixed.push(date_label.to_string());
            prefixed.extend(cells);
            Some(prefixed)
        })
        .collect();

    Ok(RawGrid { headers, rows })
}
