//! The `Cnpj` type identifies a fund by its Brazilian registration number.
//!
//! A registration number has fourteen digits. It is written with punctuation when talking to the
//! statement API (`12.345.678/0001-90`) and as bare digits everywhere else (`12345678000190`),
//! including the database and the names of staged files.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const DIGITS: usize = 14;

/// A normalized fund registration number, stored as fourteen ASCII digits.
///
/// Parsing accepts either the bare or the punctuated form:
/// ```
/// # use statement_etl::model::Cnpj;
/// # use std::str::FromStr;
/// let a = Cnpj::from_str("12.345.678/0001-90").unwrap();
/// let b = Cnpj::from_str("12345678000190").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.digits(), "12345678000190");
/// assert_eq!(b.formatted(), "12.345.678/0001-90");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    /// The fourteen digits without punctuation.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// The punctuated form expected by the statement API.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!(
            "{}.{}.{}/{}-{}",
            &d[..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..]
        )
    }
}

/// An error that can occur when parsing a string into a `Cnpj`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CnpjError {
    #[error("'{0}' contains characters other than digits and . / -")]
    InvalidCharacter(String),

    #[error("'{0}' has {1} digits, expected 14")]
    WrongLength(String, usize),
}

impl FromStr for Cnpj {
    type Err = CnpjError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut digits = String::with_capacity(DIGITS);
        for c in trimmed.chars() {
            match c {
                '0'..='9' => digits.push(c),
                '.' | '/' | '-' => {}
                _ => return Err(CnpjError::InvalidCharacter(trimmed.to_string())),
            }
        }
        if digits.len() != DIGITS {
            return Err(CnpjError::WrongLength(trimmed.to_string(), digits.len()));
        }
        Ok(Self(digits))
    }
}

impl Display for Cnpj {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Cnpj {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cnpj {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cnpj::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_punctuated() {
        let cnpj = Cnpj::from_str(" 22.610.500/0001-88 ").unwrap();
        assert_eq!(cnpj.digits(), "22610500000188");
        assert_eq!(cnpj.to_string(), "22610500000188");
    }

    #[test]
    fn test_formatted_round_trip() {
        let cnpj = Cnpj::from_str("22610500000188").unwrap();
        assert_eq!(cnpj.formatted(), "22.610.500/0001-88");
        assert_eq!(Cnpj::from_str(&cnpj.formatted()).unwrap(), cnpj);
    }

    #[test]
    fn test_wrong_length() {
        let err = Cnpj::from_str("1234567800019").unwrap_err();
        assert_eq!(err, CnpjError::WrongLength("1234567800019".to_string(), 13));
        assert!(Cnpj::from_str("").is_err());
    }

    #[test]
    fn test_invalid_character() {
        assert!(matches!(
            Cnpj::from_str("12.345.678/0001-9X"),
            Err(CnpjError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn test_serde_uses_digits() {
        let cnpj = Cnpj::from_str("12.345.678/0001-90").unwrap();
        let json = serde_json::to_string(&cnpj).unwrap();
        assert_eq!(json, "\"12345678000190\"");
        let back: Cnpj = serde_json::from_str("\"12.345.678/0001-90\"").unwrap();
        assert_eq!(back, cnpj);
    }
}
