use std::collections::HashMap;

use once_cell::sync::Lazy;

/// ISO-639-3 (plus the legacy bibliographic variants) to display names, as
/// used in the WMT-style CSV exports.
static ISO639_3_TO_NAME: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| {
        HashMap::from([
            ("ces", "Czech"),
            ("cze", "Czech"),
            ("deu", "German"),
            ("ger", "German"),
            ("eng", "English"),
            ("spa", "Spanish"),
            ("fra", "French"),
            ("fre", "French"),
            ("fin", "Finnish"),
            ("hin", "Hindi"),
            ("rus", "Russian"),
            ("ron", "Romanian"),
            ("rum", "Romanian"),
            ("tur", "Turkish"),
        ])
    });

/// Display name for a language code. Unknown codes are echoed back rather
/// than failing the export.
pub fn display_name(code: &str) -> &str {
    match ISO639_3_TO_NAME.get(code) {
        Some(name) => name,
        None => code,
    }
}

/// Splits a `xxx2yyy` language-pair code into (source, target) display
/// names.
pub fn pair_display_names(language_pair: &str) -> (String, String) {
    match language_pair.split_once('2') {
        Some((src, trg)) => {
            (display_name(src).to_string(), display_name(trg).to_string())
        }
        None => (language_pair.to_string(), language_pair.to_string()),
    }
}
