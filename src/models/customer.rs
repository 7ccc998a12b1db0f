//! Customer entity (local shape).

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Customer as stored in a `SyncedRecord`'s fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Customer {
    /// Display name (QuickBooks `DisplayName`, must be unique per company)
    #[validate(length(min = 1, max = 500))]
    pub name: String,
    pub company_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    /// State / province code
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl Address {
    /// An address counts as present once it has a street line or a city.
    pub fn is_present(&self) -> bool {
        has_text(&self.line1) || has_text(&self.city)
    }

    /// Single-line rendering, skipping empty parts.
    pub fn full(&self) -> String {
        [
            &self.line1,
            &self.line2,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
