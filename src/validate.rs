use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationErrors;

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[a-zA-Z ]{3,50}$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn check_name(errors: &mut ValidationErrors, name: &str) {
    let name = name.trim();
    if name.is_empty() {
        errors.add("name", "Name is required");
    } else if name.len() < 3 || name.len() > 50 {
        errors.add("name", "Name must be between 3-50 characters");
    } else if !NAME_RE.is_match(name) {
        errors.add(
            "name",
            "Should be 3-50 char long, no special characters or numbers.",
        );
    }
}

pub fn check_username(errors: &mut ValidationErrors, username: &str) {
    let username = username.trim();
    if username.is_empty() {
        errors.add("username", "Username is required");
    } else if username.len() < 3 || username.len() > 50 {
        errors.add("username", "Username must be between 3-50 characters");
    } else if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.add(
            "username",
            "Username should contain alphabets and numbers only",
        );
    }
}

pub fn check_email(errors: &mut ValidationErrors, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        errors.add("email", "Email is required");
    } else if !is_valid_email(email) {
        errors.add("email", "Invalid Email");
    }
}

/// 6-18 chars with at least one lower case, one upper case, one digit and
/// one special character. The regex crate has no lookahead, so the class
/// checks are done by scanning.
pub fn check_password(errors: &mut ValidationErrors, password: &str) {
    if password.is_empty() {
        errors.add("password", "Password is required");
        return;
    }
    if password.len() < 6 || password.len() > 18 {
        errors.add("password", "Password must be between 6-18 characters");
        return;
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());
    if !(has_lower && has_upper && has_digit && has_special) {
        errors.add(
            "password",
            "Password should have at least one lower case, one UPPER CASE, one number, one special character",
        );
    }
}

pub fn check_password_confirmation(
    errors: &mut ValidationErrors,
    password: &str,
    password2: &str,
) {
    if password != password2 {
        errors.add("password2", "Passwords do not match");
    }
}
