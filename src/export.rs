//! Export boundary.
//!
//! Hands the final result set over as tabular rows. This core only
//! produces the table; whatever consumes it (spreadsheet tooling, a
//! download endpoint) lives outside.

use crate::types::Paper;
use std::io::Write;

/// Column headers of the result table, in output order.
pub const COLUMNS: [&str; 9] = [
    "DOI",
    "Year",
    "Title",
    "Authors",
    "Abstract",
    "Journal",
    "URL to PDF",
    "Other URLs",
    "Source",
];

/// Write the result set as CSV. Multi-valued cells (authors, other
/// URLs) are `;`-joined; absent optionals become empty cells.
pub fn write_csv<W: Write>(papers: &[Paper], writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(COLUMNS)?;

    for paper in papers {
        out.write_record([
            paper.doi.clone().unwrap_or_default(),
            paper.year.map(|y| y.to_string()).unwrap_or_default(),
            paper.title.clone(),
            paper.authors.join(";"),
            paper.abstract_text.clone().unwrap_or_default(),
            paper.journal.clone().unwrap_or_default(),
            paper.pdf_url.clone().unwrap_or_default(),
            paper
                .other_urls
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            paper.source.display_name().to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}
