//! Text folding for accent- and case-insensitive search
//!
//! Searchable rows store a folded `search_key` column computed on write;
//! query terms are folded the same way and matched with `LIKE`.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lowercase, strip diacritics and collapse whitespace
pub fn fold(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build a search key from several optional parts
pub fn search_key<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let joined = parts
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    fold(&joined)
}

/// `LIKE` pattern for a query term, with wildcards in the term escaped
pub fn like_pattern(term: &str) -> Option<String> {
    let folded = fold(term);
    if folded.is_empty() {
        return None;
    }
    let escaped = folded
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Émile  Zola"), "emile zola");
        assert_eq!(fold("García Márquez"), "garcia marquez");
        assert_eq!(fold("  Naïve\tCafé "), "naive cafe");
    }

    #[test]
    fn test_search_key_skips_missing_parts() {
        let key = search_key([Some("Les Misérables"), None, Some(" "), Some("Hugo")]);
        assert_eq!(key, "les miserables hugo");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), Some("%100\\%%".to_string()));
        assert_eq!(like_pattern("a_b"), Some("%a\\_b%".to_string()));
        assert_eq!(like_pattern("   "), None);
    }
}
