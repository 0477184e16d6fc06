//! Spreadsheet share links.

use std::sync::OnceLock;

use regex::Regex;

static SHEET_LINK: OnceLock<Regex> = OnceLock::new();

/// Where a pasted link points: a spreadsheet and one of its tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLink {
    pub spreadsheet_id: String,
    /// Tab id from `gid=`; the first tab (0) when the link has none
    pub sheet_id: i64,
}

/// Parse `.../spreadsheets/d/<id>/...[#&]gid=<n>`. `None` when the text
/// holds no spreadsheet id or the gid does not fit an integer.
pub fn parse_sheet_link(text: &str) -> Option<SheetLink> {
    let re = SHEET_LINK
        .get_or_init(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)(?:.*[#&]gid=([0-9]+))?").unwrap());
    let caps = re.captures(text)?;
    let spreadsheet_id = caps.get(1)?.as_str().to_string();
    let sheet_id = match caps.get(2) {
        Some(gid) => gid.as_str().parse().ok()?,
        None => 0,
    };
    Some(SheetLink { spreadsheet_id, sheet_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_with_gid_fragment() {
        let link = parse_sheet_link(
            "https://docs.google.com/spreadsheets/d/1AbC-d_9/edit#gid=12345",
        )
        .unwrap();
        assert_eq!(link.spreadsheet_id, "1AbC-d_9");
        assert_eq!(link.sheet_id, 12345);
    }

    #[test]
    fn test_link_with_gid_query() {
        let link = parse_sheet_link(
            "https://docs.google.com/spreadsheets/d/xyz/edit?usp=sharing&gid=7",
        )
        .unwrap();
        assert_eq!(link.sheet_id, 7);
    }

    #[test]
    fn test_link_without_gid_defaults_to_first_tab() {
        let link = parse_sheet_link("https://docs.google.com/spreadsheets/d/xyz/edit").unwrap();
        assert_eq!(link, SheetLink { spreadsheet_id: "xyz".into(), sheet_id: 0 });
    }

    #[test]
    fn test_not_a_sheet_link() {
        assert_eq!(parse_sheet_link("https://example.com/docs/xyz"), None);
        assert_eq!(parse_sheet_link(""), None);
    }

    #[test]
    fn test_oversized_gid_is_rejected() {
        assert_eq!(
            parse_sheet_link("https://docs.google.com/spreadsheets/d/xyz/edit#gid=99999999999999999999"),
            None
        );
    }

    #[test]
    fn test_parsing_from_many_threads() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    parse_sheet_link(&format!("https://docs.google.com/spreadsheets/d/id{}/edit#gid={}", i, i))
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let link = handle.join().unwrap().unwrap();
            assert_eq!(link.spreadsheet_id, format!("id{}", i));
            assert_eq!(link.sheet_id, i as i64);
        }
    }
}
