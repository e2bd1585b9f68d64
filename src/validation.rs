use once_cell::sync::Lazy;
use regex::Regex;

/// Project names end up in file names and URLs, so keep them boring.
pub fn is_valid_project_name(name: &str) -> Result<(), String> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-]{1,100}$").unwrap());
    match RE.is_match(name) {
        true => Ok(()),
        false => Err(
            "project names must match [a-zA-Z0-9-]{1,100}".to_string(),
        ),
    }
}

/// Language-pair codes are two ISO-639-3 codes joined by '2', e.g.
/// `ces2eng`.
pub fn is_language_pair(code: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[a-z]{3}2[a-z]{3}$").unwrap());
    RE.is_match(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_names() {
        assert!(is_valid_project_name("wmt16-news").is_ok());
        assert!(is_valid_project_name("").is_err());
        assert!(is_valid_project_name("has spaces").is_err());
    }

    #[test]
    fn language_pairs() {
        assert!(is_language_pair("ces2eng"));
        assert!(!is_language_pair("cs-en"));
        assert!(!is_language_pair("CUNI"));
    }
}
