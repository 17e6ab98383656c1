//! ISBN value object.

/// A raw ISBN string and its derived forms.
///
/// Wraps whatever the user typed; the normalized [`number`](Isbn::number)
/// keeps only digits and a trailing check character `X`. Two ISBNs are
/// equal when their normalized numbers are equal, regardless of
/// formatting.
#[derive(Debug, Clone)]
pub struct Isbn {
    raw: String,
}

impl Isbn {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The original, unnormalized input.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Only the numeric characters and `X`, uppercased. `None` when the
    /// input contains no such characters at all.
    pub fn number(&self) -> Option<String> {
        let number: String = self
            .raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match number.is_empty() {
            true => None,
            false => Some(number),
        }
    }

    /// Whether this is a well-formed ISBN-10 or ISBN-13: all characters
    /// but the last numeric, the last numeric or `X`. An empty input
    /// counts as valid ("no ISBN entered"), anything unparsable does not.
    pub fn is_valid(&self) -> bool {
        match self.number() {
            None => self.raw.is_empty(),
            Some(number) => {
                (number.len() == 10 || number.len() == 13)
                    && number[..number.len() - 1].bytes().all(|b| b.is_ascii_digit())
                    && (number.as_bytes()[number.len() - 1].is_ascii_digit() || number.ends_with('X'))
            },
        }
    }

    /// The normalized number re-grouped with hyphens for display, or an
    /// empty string when there is nothing valid to display.
    pub fn pretty(&self) -> String {
        if !self.is_valid() {
            return String::new();
        }
        let Some(number) = self.number() else {
            return String::new();
        };
        let mut formatted = String::with_capacity(number.len() + number.len() / 3);
        for (position, ch) in number.chars().enumerate() {
            formatted.push(ch);
            if (position + 1) % 3 == 0 {
                formatted.push('-');
            }
        }
        formatted
    }
}

impl PartialEq for Isbn {
    fn eq(&self, other: &Self) -> bool {
        self.number() == other.number()
    }
}
impl Eq for Isbn {}
