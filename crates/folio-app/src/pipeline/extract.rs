//! Layout-aware page text extraction.
//!
//! A [`LayoutProvider`] analyzes a single-page PDF and reports linear text
//! plus table regions as spans into that text. [`extract_page_text`] folds the
//! two together: prose chars pass through verbatim, while every char covered
//! by a table is replaced by one HTML rendering of that table, emitted at the
//! table's first position.

use std::collections::HashSet;
use std::fmt::Write as _;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::PageText;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("layout provider failed on page {page_index}: {message}")]
    Provider { page_index: usize, message: String },

    #[error("table span [{offset}, +{length}) escapes page content of length {content_len}")]
    SpanOutOfBounds {
        offset: usize,
        length: usize,
        content_len: usize,
    },
}

impl ExtractError {
    pub fn provider(page_index: usize, message: impl Into<String>) -> Self {
        ExtractError::Provider {
            page_index,
            message: message.into(),
        }
    }
}

/// Half-open char range into a page's linear content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Body,
    ColumnHeader,
    RowHeader,
}

#[derive(Debug, Clone)]
pub struct TableCell {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
    pub kind: CellKind,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub row_count: usize,
    /// Regions of the page content this table covers.
    pub spans: Vec<Span>,
    pub cells: Vec<TableCell>,
}

/// Layout analysis result for one page.
#[derive(Debug, Clone)]
pub struct PageLayout {
    /// Linear reading-order text of the page.
    pub content: String,
    pub tables: Vec<Table>,
}

/// Analyzes one page of a PDF document. Implementations wrap an external
/// layout-analysis service; the crate never rasterizes or OCRs pages itself.
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    async fn analyze_page(&self, page_pdf: &[u8], page_index: usize)
        -> Result<PageLayout, ExtractError>;
}

/// Produce the cleaned text of a page from its layout analysis.
///
/// Each table is rendered exactly once, at the position of its first covered
/// char; all other covered chars are dropped. The result is whitespace
/// collapsed, trimmed, and lower-cased.
pub fn extract_page_text(layout: &PageLayout, page_index: usize) -> Result<PageText, ExtractError> {
    let content: Vec<char> = layout.content.chars().collect();
    let content_len = content.len();

    // -1 marks prose; any other value is the index of the covering table.
    let mut table_chars = vec![-1_i32; content_len];
    for (table_id, table) in layout.tables.iter().enumerate() {
        for span in &table.spans {
            if span.offset + span.length > content_len {
                return Err(ExtractError::SpanOutOfBounds {
                    offset: span.offset,
                    length: span.length,
                    content_len,
                });
            }
            for j in span.offset..span.offset + span.length {
                table_chars[j] = table_id as i32;
            }
        }
    }

    let mut page_text = String::with_capacity(layout.content.len());
    let mut added_tables: HashSet<i32> = HashSet::new();
    for (j, &mark) in table_chars.iter().enumerate() {
        if mark == -1 {
            page_text.push(content[j]);
        } else if added_tables.insert(mark) {
            page_text.push_str(&table_to_html(&layout.tables[mark as usize]));
        }
    }

    Ok(PageText::new(page_index, clean_text(&page_text)))
}

/// Collapse whitespace runs to single spaces, trim, and lower-case.
pub fn clean_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_whitespace = false;
    for c in input.chars() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        for lower in c.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

/// Render a table as a linear HTML string, row-major, cells ordered by
/// column index within each row.
fn table_to_html(table: &Table) -> String {
    let mut html = String::from("<table>");
    for row in 0..table.row_count {
        let mut cells: Vec<&TableCell> = table.cells.iter().filter(|c| c.row == row).collect();
        cells.sort_by_key(|c| c.col);

        html.push_str("<tr>");
        for cell in cells {
            let tag = match cell.kind {
                CellKind::ColumnHeader | CellKind::RowHeader => "th",
                CellKind::Body => "td",
            };
            let mut spans = String::new();
            if cell.col_span > 1 {
                let _ = write!(spans, " colSpan='{}'", cell.col_span);
            }
            if cell.row_span > 1 {
                let _ = write!(spans, " rowSpan='{}'", cell.row_span);
            }
            let _ = write!(
                html,
                "<{tag}{spans}>{}</{tag}>",
                html_encode(&cell.content)
            );
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

fn html_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
