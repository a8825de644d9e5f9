//! 80-character header cards
//!
//! A card is `KEYWORD = value / comment`, padded with spaces to 80 bytes.
//! Keywords longer than eight characters use the `HIERARCH` convention.

use crate::errors::{ObsError, ObsResult};
use crate::image::MetaValue;
use super::constants::{keywords, CARD_SIZE, KEYWORD_WIDTH};

/// Column where fixed-format values end
const VALUE_END: usize = 30;

/// One header record
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Keyword (upper case by convention)
    pub key: String,
    /// Value; None for commentary cards and undefined values
    pub value: Option<MetaValue>,
    /// Trailing comment, or the text of a commentary card
    pub comment: Option<String>,
}

impl Card {
    /// Create a keyword/value card
    pub fn new(key: &str, value: impl Into<MetaValue>) -> Self {
        Card {
            key: key.to_string(),
            value: Some(value.into()),
            comment: None,
        }
    }

    /// Attach a comment
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// The END card closing a header
    pub fn end() -> Self {
        Card {
            key: keywords::END.to_string(),
            value: None,
            comment: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.key == keywords::END
    }

    /// Render the card as exactly 80 ASCII bytes
    pub fn to_record(&self) -> ObsResult<String> {
        if !self.key.is_ascii() || self.key.contains('=') {
            return Err(ObsError::FormatError(format!("Invalid header keyword {:?}", self.key)));
        }

        let mut record = match &self.value {
            None => {
                let text = self.comment.as_deref().unwrap_or("");
                format!("{:<width$}{}", self.key, text, width = KEYWORD_WIDTH)
            },
            Some(value) => {
                let value_text = format_value(value)?;
                let prefix = if self.key.len() <= KEYWORD_WIDTH {
                    format!("{:<width$}= ", self.key, width = KEYWORD_WIDTH)
                } else {
                    format!("{} {} = ", keywords::HIERARCH, self.key)
                };
                let mut text = prefix;
                if value_text.starts_with('\'') {
                    text.push_str(&value_text);
                } else {
                    // Fixed format: right-justify numbers and logicals to column 30
                    let pad = VALUE_END.saturating_sub(text.len());
                    text.push_str(&format!("{:>width$}", value_text, width = pad));
                }
                if let Some(comment) = &self.comment {
                    if text.len() + 3 + comment.len() <= CARD_SIZE {
                        text.push_str(" / ");
                        text.push_str(comment);
                    }
                }
                text
            }
        };

        if !record.is_ascii() || record.len() > CARD_SIZE {
            return Err(ObsError::FormatError(format!(
                "Header card for {} does not fit in {} ASCII characters", self.key, CARD_SIZE)));
        }
        record.push_str(&" ".repeat(CARD_SIZE - record.len()));
        Ok(record)
    }

    /// Parse one 80-byte record
    pub fn parse(record: &[u8]) -> ObsResult<Card> {
        let text = std::str::from_utf8(record)
            .map_err(|_| ObsError::FormatError("Header card is not ASCII".to_string()))?;

        let (key, value_field) = if let Some(rest) = text.strip_prefix(keywords::HIERARCH) {
            match rest.find('=') {
                Some(eq) => (rest[..eq].trim().to_string(), Some(&rest[eq + 1..])),
                None => (keywords::HIERARCH.to_string(), None),
            }
        } else {
            let key = text.get(..KEYWORD_WIDTH).unwrap_or(text).trim_end().to_string();
            let value_field = if text.get(KEYWORD_WIDTH..KEYWORD_WIDTH + 2) == Some("= ") {
                Some(&text[KEYWORD_WIDTH + 2..])
            } else {
                None
            };
            (key, value_field)
        };

        let Some(field) = value_field else {
            // Commentary card: everything after the keyword is text
            let rest = text.get(KEYWORD_WIDTH..).unwrap_or("").trim_end();
            return Ok(Card {
                key,
                value: None,
                comment: if rest.is_empty() { None } else { Some(rest.to_string()) },
            });
        };

        let (value, comment) = parse_value(field)
            .map_err(|msg| ObsError::FormatError(format!("Card {}: {}", key, msg)))?;
        Ok(Card { key, value, comment })
    }
}

/// Render a value in FITS free/fixed format
fn format_value(value: &MetaValue) -> ObsResult<String> {
    Ok(match value {
        MetaValue::Bool(b) => if *b { "T".to_string() } else { "F".to_string() },
        MetaValue::Int(i) => i.to_string(),
        MetaValue::Float(f) => {
            if !f.is_finite() {
                return Err(ObsError::FormatError(format!(
                    "Non-finite value {} cannot be stored in a header", f)));
            }
            // Debug formatting is the shortest representation that round-trips
            let text = format!("{:?}", f).to_uppercase();
            if text.contains('.') || text.contains('E') {
                text
            } else {
                format!("{}.0", text)
            }
        },
        MetaValue::Str(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{:<8}'", escaped)
        },
    })
}

/// Split a value field into its value and optional comment
fn parse_value(field: &str) -> Result<(Option<MetaValue>, Option<String>), String> {
    let trimmed = field.trim_start();

    if let Some(quoted) = trimmed.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = quoted.char_indices().peekable();
        let mut close = None;
        while let Some((idx, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                } else {
                    close = Some(idx);
                    break;
                }
            } else {
                value.push(c);
            }
        }
        let close = close.ok_or_else(|| "unterminated string value".to_string())?;
        let comment = split_comment(&quoted[close + 1..]);
        // Trailing blanks in strings are not significant
        return Ok((Some(MetaValue::Str(value.trim_end().to_string())), comment));
    }

    let (token, comment) = match trimmed.find('/') {
        Some(slash) => (trimmed[..slash].trim(), split_comment(&trimmed[slash..])),
        None => (trimmed.trim(), None),
    };

    let value = match token {
        "" => None,
        "T" => Some(MetaValue::Bool(true)),
        "F" => Some(MetaValue::Bool(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                Some(MetaValue::Int(i))
            } else {
                let normalized = token.replace('D', "E");
                match normalized.parse::<f64>() {
                    Ok(f) => Some(MetaValue::Float(f)),
                    Err(_) => return Err(format!("cannot parse value {:?}", token)),
                }
            }
        }
    };
    Ok((value, comment))
}

fn split_comment(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let comment = rest.strip_prefix('/')?.trim();
    if comment.is_empty() { None } else { Some(comment.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(card: &Card) -> Card {
        let record = card.to_record().unwrap();
        assert_eq!(record.len(), CARD_SIZE);
        Card::parse(record.as_bytes()).unwrap()
    }

    #[test]
    fn fixed_format_values_end_at_column_30() {
        let record = Card::new("NAXIS1", 500i64).to_record().unwrap();
        assert_eq!(&record[..30], "NAXIS1  =                  500");
        let record = Card::new("SIMPLE", true).to_record().unwrap();
        assert_eq!(&record[..30], "SIMPLE  =                    T");
    }

    #[test]
    fn strings_are_quoted_and_padded() {
        let record = Card::new("NAME", "0").to_record().unwrap();
        assert_eq!(&record[..20], "NAME    = '0       '");
        let card = round_trip(&Card::new("OBSERVER", "O'Brien"));
        assert_eq!(card.value, Some(MetaValue::Str("O'Brien".to_string())));
    }

    #[test]
    fn values_round_trip() {
        for value in [
            MetaValue::Int(-42),
            MetaValue::Float(0.1),
            MetaValue::Float(2.0),
            MetaValue::Float(1.0e-12),
            MetaValue::Bool(false),
            MetaValue::Str("imsim 2".to_string()),
        ] {
            let card = round_trip(&Card { key: "KEY".to_string(), value: Some(value.clone()), comment: None });
            assert_eq!(card.value, Some(value));
        }
    }

    #[test]
    fn long_keys_use_hierarch() {
        let card = Card::new("CALIB_CREATION_DATE", "2026-10-18").with_comment("created");
        let record = card.to_record().unwrap();
        assert!(record.starts_with("HIERARCH CALIB_CREATION_DATE = "));
        assert_eq!(round_trip(&card), card);
    }

    #[test]
    fn parses_comment_and_commentary_cards() {
        let card = Card::parse(format!("{:<80}", "EXPTIME =                 15.0 / seconds").as_bytes()).unwrap();
        assert_eq!(card.value, Some(MetaValue::Float(15.0)));
        assert_eq!(card.comment.as_deref(), Some("seconds"));

        let card = Card::parse(format!("{:<80}", "HISTORY assembled from channels").as_bytes()).unwrap();
        assert_eq!(card.key, "HISTORY");
        assert_eq!(card.value, None);

        assert!(Card::parse(format!("{:<80}", "END").as_bytes()).unwrap().is_end());
    }

    #[test]
    fn rejects_non_finite_and_oversized() {
        assert!(Card::new("X", f64::NAN).to_record().is_err());
        assert!(Card::new("X", "a".repeat(80)).to_record().is_err());
    }
}
