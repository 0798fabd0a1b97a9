//! Postal address as reported by the payment provider.

use serde::{Deserialize, Serialize};

/// A postal address.
///
/// Field names follow the provider's address object so the same type is used
/// for checkout payloads, stored shipping addresses and API requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State or province.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Two-letter country code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    /// Single-line rendering, skipping blank parts.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            &self.line1,
            &self.line2,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|part| non_blank(part.as_deref()))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Returns the trimmed value when it is present and not blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_skips_blank_parts() {
        let address = Address {
            line1: Some("12 Harbour St".to_string()),
            line2: Some("  ".to_string()),
            city: Some("Halifax".to_string()),
            state: Some("NS".to_string()),
            postal_code: None,
            country: Some("CA".to_string()),
        };
        assert_eq!(address.one_line(), "12 Harbour St, Halifax, NS, CA");
    }

    #[test]
    fn test_one_line_empty() {
        assert_eq!(Address::default().one_line(), "");
    }
}
