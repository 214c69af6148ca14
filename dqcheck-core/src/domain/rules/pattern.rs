// dqcheck-core/src/domain/rules/pattern.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Email,
    PhoneUs,
    PhoneInternational,
    DateIso,
    Ssn,
    ZipCode,
    Url,
    IpAddress,
    Currency,
    Percentage,
    CustomRegex,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::PhoneUs => "phone_us",
            Self::PhoneInternational => "phone_international",
            Self::DateIso => "date_iso",
            Self::Ssn => "ssn",
            Self::ZipCode => "zip_code",
            Self::Url => "url",
            Self::IpAddress => "ip_address",
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::CustomRegex => "custom_regex",
        }
    }

    /// Source of the built-in regex. `None` for `custom_regex`.
    pub fn builtin_regex(&self) -> Option<&'static str> {
        match self {
            Self::Email => Some(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"),
            Self::PhoneUs => Some(r"^\+?1?\d{10}$"),
            Self::PhoneInternational => Some(r"^\+?[1-9]\d{1,14}$"),
            Self::DateIso => Some(r"^\d{4}-\d{2}-\d{2}$"),
            Self::Ssn => Some(r"^\d{3}-\d{2}-\d{4}$"),
            Self::ZipCode => Some(r"^\d{5}(-\d{4})?$"),
            Self::Url => Some(r"^https?://[^\s/$.?#].[^\s]*$"),
            Self::IpAddress => Some(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$"),
            Self::Currency => Some(r"^[$€£¥₹]\s?\d+(,\d{3})*(\.\d{2})?$"),
            Self::Percentage => Some(r"^\d+(\.\d+)?%$"),
            Self::CustomRegex => None,
        }
    }

    /// Builds the matcher. Custom patterns must match the whole value.
    pub fn compile(&self, custom_pattern: Option<&str>) -> Result<Regex, DomainError> {
        let source = match (self.builtin_regex(), custom_pattern) {
            (Some(builtin), _) => builtin.to_string(),
            (None, Some(custom)) => format!("^(?:{})$", custom),
            (None, None) => {
                return Err(DomainError::InvalidRule(
                    "pattern_type 'custom_regex' requires 'custom_pattern'".into(),
                ));
            }
        };
        Regex::new(&source).map_err(|e| {
            DomainError::InvalidRule(format!("custom_pattern is not a valid regex: {}", e))
        })
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "phone_us" => Ok(Self::PhoneUs),
            "phone_international" => Ok(Self::PhoneInternational),
            "date_iso" => Ok(Self::DateIso),
            "ssn" => Ok(Self::Ssn),
            "zip_code" | "zip" => Ok(Self::ZipCode),
            "url" => Ok(Self::Url),
            "ip_address" => Ok(Self::IpAddress),
            "currency" => Ok(Self::Currency),
            "percentage" => Ok(Self::Percentage),
            "custom_regex" | "custom" => Ok(Self::CustomRegex),
            other => Err(format!("unknown pattern_type '{}'", other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns() {
        let email = PatternType::Email.compile(None).unwrap();
        assert!(email.is_match("a@b.com"));
        assert!(!email.is_match("not-an-email"));

        let zip = PatternType::ZipCode.compile(None).unwrap();
        assert!(zip.is_match("02134"));
        assert!(zip.is_match("02134-1234"));
        assert!(!zip.is_match("2134"));

        let pct = PatternType::Percentage.compile(None).unwrap();
        assert!(pct.is_match("12.5%"));
        assert!(!pct.is_match("12.5"));
    }

    #[test]
    fn test_custom_regex_is_anchored() {
        let re = PatternType::CustomRegex.compile(Some("[A-Z]{3}")).unwrap();
        assert!(re.is_match("ABC"));
        assert!(!re.is_match("xABCx"));
    }

    #[test]
    fn test_custom_regex_errors() {
        assert!(matches!(
            PatternType::CustomRegex.compile(None),
            Err(DomainError::InvalidRule(_))
        ));
        assert!(matches!(
            PatternType::CustomRegex.compile(Some("([unclosed")),
            Err(DomainError::InvalidRule(_))
        ));
    }
}
