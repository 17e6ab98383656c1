//! Identifier escaping.
//!
//! Identifiers cannot be parameter-bound, so the only defense against
//! injection through a table or column name is refusing any name that
//! could terminate the quoted region.

use crate::error::{ErrorKind, Result};

/// The delimiter pair wrapped around interpolated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delimiters {
    pub(crate) open: char,
    pub(crate) close: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        // Double quotes: the SQL standard identifier quote, honoured by SQLite.
        Self { open: '"', close: '"' }
    }
}

/// Escape a single identifier by wrapping it in the delimiter pair.
///
/// Rejects identifiers containing either delimiter character, empty
/// identifiers, and identifiers ending in a backslash (which would escape
/// the closing delimiter on engines that honour backslash escapes). The
/// literal `*` is passed through unescaped so wildcard selects work.
pub(crate) fn escape(name: &str, delimiters: Delimiters) -> Result<String> {
    if name == "*" {
        return Ok(name.to_string());
    }
    if name.is_empty()
        || name.contains(delimiters.open)
        || name.contains(delimiters.close)
        || name.ends_with('\\')
    {
        exn::bail!(ErrorKind::InjectionRisk(name.to_string()));
    }
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push(delimiters.open);
    escaped.push_str(name);
    escaped.push(delimiters.close);
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_wraps_in_default_delimiters() {
        assert_eq!(escape("books", Delimiters::default()).unwrap(), "\"books\"");
        assert_eq!(escape("thumbnail_id", Delimiters::default()).unwrap(), "\"thumbnail_id\"");
        // The engine rowid pseudo-column is a plain identifier.
        assert_eq!(escape("_rowid_", Delimiters::default()).unwrap(), "\"_rowid_\"");
    }

    #[test]
    fn test_wildcard_passes_through_unescaped() {
        assert_eq!(escape("*", Delimiters::default()).unwrap(), "*");
    }

    #[rstest]
    #[case("bo\"oks")]
    #[case("\"")]
    #[case("books\"; DROP TABLE books; --")]
    #[case("books\\")]
    #[case("")]
    fn test_rejects_injection_risks(#[case] name: &str) {
        let err = escape(name, Delimiters::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InjectionRisk(_)));
    }

    #[test]
    fn test_custom_delimiters() {
        let brackets = Delimiters { open: '[', close: ']' };
        assert_eq!(escape("books", brackets).unwrap(), "[books]");
        // The default delimiter is fine once it is no longer the delimiter.
        assert_eq!(escape("bo\"oks", brackets).unwrap(), "[bo\"oks]");
        assert!(escape("bo]oks", brackets).is_err());
        assert!(escape("bo[oks", brackets).is_err());
    }
}
