//! Query-string construction for the search API.

use greylit_shared::QuerySpec;

/// Combine a spec's four term groups into one query restricted to `website`.
///
/// All-words are kept as-is, the exact phrase is quoted, any-words become an
/// `OR` group and each excluded word gets a `-` prefix. Blank groups are
/// left out.
pub fn build_query(spec: &QuerySpec, website: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    let all: Vec<&str> = spec.all_words.split_whitespace().collect();
    if !all.is_empty() {
        parts.push(all.join(" "));
    }

    let phrase = spec.exact_phrase.replace('"', "");
    let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    if !phrase.is_empty() {
        parts.push(format!("\"{phrase}\""));
    }

    let any: Vec<&str> = spec.any_words.split_whitespace().collect();
    match any.len() {
        0 => {}
        1 => parts.push(any[0].to_string()),
        _ => parts.push(format!("({})", any.join(" OR "))),
    }

    parts.extend(
        spec.exclude_words
            .split_whitespace()
            .map(|word| format!("-{}", word.trim_start_matches('-'))),
    );

    parts.push(format!("site:{}", site_operand(website)));
    parts.join(" ")
}

/// Strip scheme and trailing slash so `site:` gets a bare host/path.
fn site_operand(website: &str) -> &str {
    let trimmed = website.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use greylit_shared::Priority;

    use super::*;

    #[test]
    fn combines_all_groups() {
        let spec = QuerySpec::new(Priority::First)
            .all_words("flood  report")
            .exact_phrase("grey literature")
            .any_words("pdf doc")
            .exclude_words("news blog");
        assert_eq!(
            build_query(&spec, "example.com"),
            "flood report \"grey literature\" (pdf OR doc) -news -blog site:example.com"
        );
    }

    #[test]
    fn omits_blank_groups() {
        let spec = QuerySpec::new(Priority::Second).any_words("evaluation");
        assert_eq!(build_query(&spec, "gov.uk"), "evaluation site:gov.uk");
    }

    #[test]
    fn strips_quotes_from_phrase() {
        let spec = QuerySpec::new(Priority::First).exact_phrase("\"storm surge\"");
        assert_eq!(
            build_query(&spec, "example.com"),
            "\"storm surge\" site:example.com"
        );
    }

    #[test]
    fn normalizes_site_operand() {
        let spec = QuerySpec::new(Priority::First).all_words("flood");
        assert_eq!(
            build_query(&spec, " https://www.example.com/reports/ "),
            "flood site:www.example.com/reports"
        );
    }

    #[test]
    fn does_not_double_exclusion_prefix() {
        let spec = QuerySpec::new(Priority::Third).exclude_words("-news");
        assert_eq!(build_query(&spec, "example.com"), "-news site:example.com");
    }
}
