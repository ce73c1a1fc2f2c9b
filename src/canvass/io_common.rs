use std::path::Path;

use canvass_core::bulk::RawRow;
use log::debug;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Decodes bytes as UTF-8, falling back to Windows-1252 for files exported
/// by Excel and older spreadsheet tools.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            debug!("decode_text: {} bytes read as Windows-1252", bytes.len());
            decoded.into_owned()
        }
    }
}

/// Pairs each row with the header. Rows where every cell is blank are dropped.
pub fn assemble_rows<I>(header: &[String], rows: I) -> Vec<RawRow>
where
    I: IntoIterator<Item = Vec<String>>,
{
    rows.into_iter()
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| {
            header
                .iter()
                .zip(cells.into_iter())
                .filter(|(h, _)| !h.trim().is_empty())
                .map(|(h, c)| (h.clone(), c))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(simplify_file_name("/tmp/imports/leader_7.xlsx"), "leader_7.xlsx");
        assert_eq!(simplify_file_name("voters.csv"), "voters.csv");
    }

    #[test]
    fn windows_1252_fallback() {
        assert_eq!(decode_text("Nariño".as_bytes().to_vec()), "Nariño");
        assert_eq!(decode_text(vec![b'N', b'a', b'r', b'i', 0xF1, b'o']), "Nariño");
        // Excel's curly quotes live in the 0x80-0x9F range.
        assert_eq!(
            decode_text(vec![0x93, b'S', b'E', b'D', b'E', 0x94, b' ', 0xD1]),
            "\u{201C}SEDE\u{201D} Ñ"
        );
    }

    #[test]
    fn blank_rows_are_dropped() {
        let header = vec!["NOMBRE".to_string(), "CEDULA".to_string(), "".to_string()];
        let rows = vec![
            vec!["Ana".to_string(), "1234567".to_string(), "x".to_string()],
            vec!["".to_string(), "  ".to_string()],
            vec!["Luis".to_string()],
        ];
        let res = assemble_rows(&header, rows);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].get("CEDULA"), Some(&"1234567".to_string()));
        assert_eq!(res[0].len(), 2);
        assert_eq!(res[1].get("NOMBRE"), Some(&"Luis".to_string()));
        assert_eq!(res[1].get("CEDULA"), None);
    }
}
