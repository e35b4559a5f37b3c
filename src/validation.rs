// Validation utilities module
// Provides custom validation functions for request DTOs

use validator::{Validate, ValidationError};

use crate::coupons::CartItem;

/// Validates that a coupon code only contains letters, digits, `-` and `_`
/// Surrounding whitespace is tolerated since codes are trimmed before lookup
pub fn validate_coupon_code_charset(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("coupon_code_blank"));
    }
    if trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("coupon_code_invalid_characters"))
    }
}

/// Validates every cart item of a purchase
pub fn validate_cart_items(items: &[CartItem]) -> Result<(), ValidationError> {
    if items.iter().all(|item| item.validate().is_ok()) {
        Ok(())
    } else {
        Err(ValidationError::new("cart_item_invalid"))
    }
}
