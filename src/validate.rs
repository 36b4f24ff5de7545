//! Input guards shared by the writer, the engine configuration and the outer
//! surfaces (CLI and HTTP), which receive identifiers as text.

use lazy_static::lazy_static;
use regex::Regex;

use crate::datatype::{Instant, END_OF_TIME};
use crate::error::{CanopyError, Result};

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref CANONICAL_DIGITS: Regex = Regex::new(r"^(0|[1-9][0-9]*)$").unwrap();
}

pub fn is_digits(s: &str) -> bool {
    DIGITS.is_match(s)
}

pub fn is_canonical_digits(s: &str) -> bool {
    CANONICAL_DIGITS.is_match(s)
}

/// Identifiers such as the data set, the tree type and instants must be
/// strictly positive.
pub fn positive(value: i64, name: &str) -> Result<i64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(CanopyError::Validation(format!(
            "{} must be an integer greater than 0, got {}",
            name, value
        )))
    }
}

/// Parent references and depths may be zero (zero meaning "top level").
pub fn non_negative(value: i64, name: &str) -> Result<i64> {
    if value >= 0 {
        Ok(value)
    } else {
        Err(CanopyError::Validation(format!(
            "{} must be a non-negative integer, got {}",
            name, value
        )))
    }
}

/// Instants lie strictly between 0 and [`END_OF_TIME`], which closes every
/// open validity interval.
pub fn instant(value: Instant, name: &str) -> Result<Instant> {
    if value > 0 && value < END_OF_TIME {
        Ok(value)
    } else {
        Err(CanopyError::Validation(format!(
            "{} must lie between 0 and {} (exclusive), got {}",
            name, END_OF_TIME, value
        )))
    }
}

/// Parses an identifier given as text. Only decimal digits are accepted;
/// leading zeros are dropped by the conversion.
pub fn parse_id(text: &str, name: &str) -> Result<i64> {
    if !is_digits(text) {
        return Err(CanopyError::Validation(format!(
            "{} must be a non-negative integer, got '{}'",
            name, text
        )));
    }
    text.parse::<i64>()
        .map_err(|e| CanopyError::Validation(format!("{} is out of range: {}", name, e)))
}

/// A label is either absent (positional branch) or a non-empty string with at
/// least one non-digit character, so it can never be mistaken for an id.
pub fn label(label: Option<&str>) -> Result<Option<&str>> {
    match label {
        None => Ok(None),
        Some("") => Err(CanopyError::Validation(
            "label must be a non-empty string or absent".to_string(),
        )),
        Some(l) if is_digits(l) => Err(CanopyError::Validation(format!(
            "label ({}) must contain at least 1 non-digit character",
            l
        ))),
        Some(l) => Ok(Some(l)),
    }
}
