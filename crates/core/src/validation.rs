use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::material::Material;
use crate::domain::request::NewRequest;
use crate::domain::user::User;
use crate::errors::DomainError;

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok()).as_ref()
}

pub fn is_valid_email(address: &str) -> bool {
    email_pattern().is_some_and(|pattern| pattern.is_match(address.trim()))
}

/// Checks a submission before anything is persisted.
pub fn validate_submission(draft: &NewRequest) -> Result<(), DomainError> {
    let approver = draft.approver_email.trim();
    if approver.is_empty() {
        return Err(DomainError::Validation("approver email is required".to_string()));
    }
    if !is_valid_email(approver) {
        return Err(DomainError::Validation(format!(
            "approver email `{approver}` is not a valid address"
        )));
    }

    if draft.requester.trim().is_empty() {
        return Err(DomainError::Validation("requester is required".to_string()));
    }

    if draft.amount < Decimal::ZERO {
        return Err(DomainError::Validation("amount must not be negative".to_string()));
    }

    if draft.line_items.is_empty() {
        return Err(DomainError::Validation("at least one line item is required".to_string()));
    }

    for (index, line) in draft.line_items.iter().enumerate() {
        if line.item.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "line item {} has an empty name",
                index + 1
            )));
        }
        if line.quantity < 1 {
            return Err(DomainError::Validation(format!(
                "line item {} (`{}`) must have a quantity of at least 1",
                index + 1,
                line.item.trim()
            )));
        }
    }

    Ok(())
}

pub fn validate_material(material: &Material) -> Result<(), DomainError> {
    if material.name.trim().is_empty() {
        return Err(DomainError::Validation("material name is required".to_string()));
    }
    if material.unit.trim().is_empty() {
        return Err(DomainError::Validation("material unit is required".to_string()));
    }
    if material.unit_price < Decimal::ZERO {
        return Err(DomainError::Validation("unit price must not be negative".to_string()));
    }
    if material.barcode.as_deref().is_some_and(|code| code.trim().is_empty()) {
        return Err(DomainError::Validation("barcode must not be blank when given".to_string()));
    }
    Ok(())
}

pub fn validate_user(user: &User) -> Result<(), DomainError> {
    if user.name.trim().is_empty() {
        return Err(DomainError::Validation("user name is required".to_string()));
    }
    if !is_valid_email(&user.email) {
        return Err(DomainError::Validation(format!(
            "user email `{}` is not a valid address",
            user.email.trim()
        )));
    }
    if user.department.trim().is_empty() {
        return Err(DomainError::Validation("department is required".to_string()));
    }
    Ok(())
}
