//! Gene symbol normalisation.
//!
//! Every symbol entering the pipeline passes through `normalise_symbol` so
//! that terms reported with different casing by different services merge
//! cleanly during aggregation.

/// Trim whitespace and uppercase. Human gene symbols are conventionally
/// upper-case; the services themselves are case-insensitive on input but not
/// consistent on output.
pub fn normalise_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Normalise a whole collection, dropping empties.
pub fn normalise_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| normalise_symbol(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_symbol() {
        assert_eq!(normalise_symbol(" kras "), "KRAS");
        assert_eq!(normalise_symbol("Top2a"), "TOP2A");
        assert_eq!(normalise_symbol("CCNB1"), "CCNB1");
    }

    #[test]
    fn test_normalise_symbols_drops_blanks() {
        assert_eq!(
            normalise_symbols(["kras", "", "  ", "tp53"]),
            vec!["KRAS".to_string(), "TP53".to_string()]
        );
    }
}
