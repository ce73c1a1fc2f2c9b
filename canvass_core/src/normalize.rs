// Repairs for text coming out of the reference listing and canonical forms
// for stored values.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// UTF-8 sequences for the Spanish diacritics, read back as single-byte text.
// The lead byte 0xC3 always shows up as 'Ã'. The continuation byte shows up
// either as its Windows-1252 glyph or as the raw Latin-1 code point, both
// forms are listed.
const MOJIBAKE_TAIL: &[(char, char)] = &[
    ('\u{B1}', 'ñ'),
    ('\u{2018}', 'Ñ'),
    ('\u{91}', 'Ñ'),
    ('\u{A1}', 'á'),
    ('\u{A9}', 'é'),
    ('\u{AD}', 'í'),
    ('\u{B3}', 'ó'),
    ('\u{BA}', 'ú'),
    ('\u{BC}', 'ü'),
    ('\u{81}', 'Á'),
    ('\u{2030}', 'É'),
    ('\u{89}', 'É'),
    ('\u{8D}', 'Í'),
    ('\u{201C}', 'Ó'),
    ('\u{93}', 'Ó'),
    ('\u{161}', 'Ú'),
    ('\u{9A}', 'Ú'),
    ('\u{153}', 'Ü'),
    ('\u{9C}', 'Ü'),
];

const MOJIBAKE_LEAD: char = 'Ã';

fn repaired(tail: char) -> Option<char> {
    MOJIBAKE_TAIL
        .iter()
        .find_map(|(t, fixed)| if *t == tail { Some(*fixed) } else { None })
}

/// Repairs Spanish diacritics that went through a UTF-8 / Latin-1 mix-up.
///
/// `normalize("BogotÃ¡") == "Bogotá"`. Text without the corrupted sequences
/// is returned unchanged, so applying it twice is the same as once.
pub fn normalize(text: &str) -> String {
    let mut res = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == MOJIBAKE_LEAD {
            if let Some(fixed) = chars.peek().copied().and_then(repaired) {
                chars.next();
                res.push(fixed);
                continue;
            }
        }
        res.push(c);
    }
    res
}

/// Uppercases and collapses internal whitespace. Used for every stored name
/// and location value.
pub fn canonical_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_uppercase())
        .collect::<Vec<String>>()
        .join(" ")
}

/// `canonical_text`, with blank input mapped to `None`.
pub fn canonical_opt(text: Option<&str>) -> Option<String> {
    text.map(canonical_text).filter(|s| !s.is_empty())
}

/// The comparison form used by the reconciliation: trimmed and lowercased.
pub fn comparable(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Strips accents and case: the primary key of the collation.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Removes accents and uppercases, for matching spreadsheet headers.
pub fn header_key(text: &str) -> String {
    canonical_text(&fold(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_lowercase_accents() {
        assert_eq!(normalize("BogotÃ¡"), "Bogotá");
        assert_eq!(normalize("NariÃ±o"), "Nariño");
        assert_eq!(normalize("MedellÃ\u{AD}n"), "Medellín");
        assert_eq!(normalize("CÃºcuta"), "Cúcuta");
        assert_eq!(normalize("AtlÃ¡ntico"), "Atlántico");
    }

    #[test]
    fn repairs_uppercase_accents() {
        assert_eq!(normalize("NARIÃ‘O"), "NARIÑO");
        assert_eq!(normalize("NARI\u{C3}\u{91}O"), "NARIÑO");
        assert_eq!(normalize("BOGOTÃ\u{81}"), "BOGOTÁ");
        assert_eq!(normalize("CHOCÃ“"), "CHOCÓ");
        assert_eq!(normalize("PERÃš"), "PERÚ");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "BogotÃ¡",
            "NARIÃ‘O",
            "MedellÃ\u{AD}n",
            "CHOCÃ“",
            "GÃ¼ican",
            "plain text",
            "Ã alone",
            "",
        ];
        for s in samples.iter() {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent on {:?}", s);
        }
    }

    #[test]
    fn correct_text_is_untouched() {
        for s in ["Bogotá", "NARIÑO", "Cúcuta", "Ãtico"].iter() {
            assert_eq!(normalize(s), *s);
        }
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical_text("  san   juan de pasto "), "SAN JUAN DE PASTO");
        assert_eq!(canonical_opt(Some("   ")), None);
        assert_eq!(canonical_opt(Some("mesa 4")), Some("MESA 4".to_string()));
        assert_eq!(fold("Bogotá"), "bogota");
        assert_eq!(header_key(" Cédula "), "CEDULA");
        assert_eq!(header_key("lugar  de votación"), "LUGAR DE VOTACION");
    }
}
