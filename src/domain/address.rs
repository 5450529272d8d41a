//! Shipping and billing addresses.
//!
//! Manually entered addresses are always collected as discrete fields. Saved
//! addresses come from the external address book and may only carry a single
//! free-text line; those are resolved into a [`PostalAddress`] with
//! [`SavedAddress::to_postal`], which falls back to [`UNKNOWN`] for anything it
//! cannot work out.

use serde::{Deserialize, Serialize};

/// Placeholder sent for a required field that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// Address typed into the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressForm {
    pub name: String,
    pub phone: String,
    pub pincode: String,
    pub street: String,
    pub locality: String,
    pub city: String,
    pub state: String,
    pub landmark: Option<String>,
}

impl AddressForm {
    /// Names of the required fields that are still blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("phone", &self.phone),
            ("pincode", &self.pincode),
            ("street", &self.street),
            ("locality", &self.locality),
            ("city", &self.city),
            ("state", &self.state),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn to_postal(&self) -> PostalAddress {
        PostalAddress {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            pincode: self.pincode.trim().to_string(),
            street: self.street.trim().to_string(),
            locality: self.locality.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            landmark: non_blank(self.landmark.as_deref()),
        }
    }
}

/// Address picked from the customer's address book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAddress {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub pincode: String,
    /// Free-text address as stored by the address book.
    pub address_line: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub landmark: Option<String>,
}

impl SavedAddress {
    /// Resolve into a postal address: structured fields first, then a
    /// best-effort parse of the free-text line, then [`UNKNOWN`].
    pub fn to_postal(&self) -> PostalAddress {
        let parsed = ParsedLine::parse(&self.address_line);
        let pick = |structured: Option<&str>, fallback: Option<String>| {
            non_blank(structured)
                .or(fallback)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        PostalAddress {
            name: or_unknown(&self.name),
            phone: or_unknown(&self.phone),
            pincode: or_unknown(&self.pincode),
            street: parsed.street.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            locality: parsed.locality.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            city: pick(self.city.as_deref(), parsed.city),
            state: pick(self.state.as_deref(), parsed.state),
            landmark: non_blank(self.landmark.as_deref()).or(parsed.landmark),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum AddressSelection {
    Saved(SavedAddress),
    Manual(AddressForm),
}

impl AddressSelection {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        match self {
            // Picking an address book entry is enough; gaps are filled when the order is built.
            Self::Saved(_) => Vec::new(),
            Self::Manual(form) => form.missing_fields(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn to_postal(&self) -> PostalAddress {
        match self {
            Self::Saved(saved) => saved.to_postal(),
            Self::Manual(form) => form.to_postal(),
        }
    }
}

/// Address as sent to the order service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub name: String,
    pub phone: String,
    pub pincode: String,
    pub street: String,
    pub locality: String,
    pub city: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

/// Pieces recovered from a comma separated free-text address.
///
/// Expected shape: `street, [locality,] city, state[, pincode]`, with an
/// optional `near ...` / `landmark: ...` segment anywhere.
#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedLine {
    street: Option<String>,
    locality: Option<String>,
    city: Option<String>,
    state: Option<String>,
    landmark: Option<String>,
}

impl ParsedLine {
    fn parse(line: &str) -> Self {
        let mut landmark = None;
        let mut segments: Vec<&str> = Vec::new();

        for segment in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match landmark_of(segment) {
                Some(found) if landmark.is_none() => landmark = Some(found),
                _ => segments.push(segment),
            }
        }

        if segments
            .last()
            .is_some_and(|last| last.chars().all(|c| c.is_ascii_digit() || c == ' '))
        {
            segments.pop();
        }

        let mut parsed = Self {
            landmark,
            ..Self::default()
        };

        match segments.as_slice() {
            [] => {}
            [only] => parsed.street = Some((*only).to_string()),
            [street, city] => {
                parsed.street = Some((*street).to_string());
                parsed.city = Some((*city).to_string());
            }
            [street @ .., city, state] => {
                let (street, locality) = match street {
                    [single] => (vec![*single], None),
                    [head @ .., locality] => (head.to_vec(), Some((*locality).to_string())),
                    [] => (Vec::new(), None),
                };
                parsed.street = Some(street.join(", "));
                parsed.locality = locality;
                parsed.city = Some((*city).to_string());
                parsed.state = Some((*state).to_string());
            }
        }

        parsed
    }
}

fn landmark_of(segment: &str) -> Option<String> {
    let lower = segment.to_ascii_lowercase();
    ["landmark:", "landmark ", "near "]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| segment[prefix.len()..].trim().to_string())
        .filter(|rest| !rest.is_empty())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn or_unknown(value: &str) -> String {
    non_blank(Some(value)).unwrap_or_else(|| UNKNOWN.to_string())
}
