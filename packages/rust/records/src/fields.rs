//! Mapping from search results to records-store fields.

use chrono::NaiveDate;
use serde::Serialize;

use greylit_shared::SearchResult;

/// Status every new record starts in.
pub const INITIAL_STATUS: &str = "Todo";

/// Field values for one record. Names match the table's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFields {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source_domain: String,
    pub search_query: String,
    pub priority: u8,
    pub scraped_at: String,
    pub status: &'static str,
}

impl RecordFields {
    pub fn from_result(result: &SearchResult, search_query: &str, scraped_at: NaiveDate) -> Self {
        Self {
            title: result.title.clone(),
            link: result.link.clone(),
            snippet: result.snippet.clone(),
            source_domain: extract_domain(&result.link),
            search_query: search_query.to_string(),
            priority: result.priority.number(),
            scraped_at: scraped_at.format("%Y-%m-%d").to_string(),
            status: INITIAL_STATUS,
        }
    }
}

/// Host (and port, if any) of `link`; empty when the link does not parse.
pub fn extract_domain(link: &str) -> String {
    let Ok(url) = url::Url::parse(link) else {
        return String::new();
    };
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Formula matching records whose `link` equals `link`.
pub(crate) fn link_formula(link: &str) -> String {
    let escaped = link.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{link}}='{escaped}'")
}

#[cfg(test)]
mod tests {
    use greylit_shared::Priority;

    use super::*;

    #[test]
    fn maps_result_to_fields() {
        let result = SearchResult {
            title: "Annual flood report".into(),
            link: "https://www.example.com/docs/flood.pdf".into(),
            snippet: "Summary".into(),
            priority: Priority::Second,
            source_website: "example.com".into(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let fields = RecordFields::from_result(&result, "AND: flood", date);

        assert_eq!(fields.source_domain, "www.example.com");
        assert_eq!(fields.search_query, "AND: flood");
        assert_eq!(fields.priority, 2);
        assert_eq!(fields.scraped_at, "2024-03-09");
        assert_eq!(fields.status, "Todo");

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["link"], "https://www.example.com/docs/flood.pdf");
        assert_eq!(json["priority"], 2);
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(extract_domain("https://gov.uk/a/b"), "gov.uk");
        assert_eq!(extract_domain("http://localhost:8080/x"), "localhost:8080");
        assert_eq!(extract_domain("not a url"), "");
    }

    #[test]
    fn formula_escapes_quotes() {
        assert_eq!(link_formula("https://a.org/1"), "{link}='https://a.org/1'");
        assert_eq!(
            link_formula("https://a.org/it's"),
            "{link}='https://a.org/it\\'s'"
        );
    }
}
