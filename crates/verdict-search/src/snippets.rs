use scraper::{Html, Selector};

use verdict_core::error::{Result, VerdictError};

/// CSS selector of a result snippet on the HTML results page.
const SNIPPET_SELECTOR: &str = "a.result__snippet";

/// Extract snippet texts from the first `max_results` snippet elements, in
/// document order.
///
/// Whitespace inside a snippet is collapsed. Empty elements count toward
/// the limit but contribute no text.
pub fn extract_snippets(html: &str, max_results: usize) -> Result<Vec<String>> {
    let selector = Selector::parse(SNIPPET_SELECTOR)
        .map_err(|e| VerdictError::RetrievalParse(e.to_string()))?;
    let document = Html::parse_document(html);

    let snippets = document
        .select(&selector)
        .take(max_results)
        .map(|el| {
            el.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect();
    Ok(snippets)
}
