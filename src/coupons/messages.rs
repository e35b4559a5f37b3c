// Message catalog for redemption violations
//
// Maps localization keys to human-readable text. Unknown keys render as the key itself.

use std::collections::HashMap;

use crate::coupons::{Violation, ViolationDetail, ViolationKind};

const ENGLISH: [(ViolationKind, &str); 6] = [
    (ViolationKind::CodeNotFound, "invalid coupon code"),
    (ViolationKind::SingleCodeExhausted, "invalid limit single coupon code"),
    (ViolationKind::AlreadyUsed, "coupon code already used"),
    (ViolationKind::Deactivated, "coupon code deactivated"),
    (ViolationKind::OutsideValidityWindow, "invalid usage date"),
    (ViolationKind::AccountLimitExceeded, "invalid usage limit"),
];

/// Localized messages keyed by `custom.errors.*`
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    /// Catalog with the default English messages
    pub fn english() -> Self {
        let messages = ENGLISH
            .iter()
            .map(|(kind, text)| (kind.message_key().to_string(), text.to_string()))
            .collect();
        Self { messages }
    }

    /// Replace or add a message for a key
    pub fn with_message(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.messages.insert(key.into(), text.into());
        self
    }

    pub fn message_for(&self, kind: ViolationKind) -> String {
        let key = kind.message_key();
        self.messages
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Render a violation for API responses
    pub fn detail(&self, violation: &Violation) -> ViolationDetail {
        let kind = violation.kind();
        ViolationDetail {
            kind,
            field: violation.field().to_string(),
            message_key: kind.message_key().to_string(),
            message: self.message_for(kind),
            context: violation.context(),
        }
    }

    pub fn details(&self, violations: &[Violation]) -> Vec<ViolationDetail> {
        violations.iter().map(|v| self.detail(v)).collect()
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::english()
    }
}
