use axum::extract::FromRef;
use tracing::{error, info, warn};

use crate::auth::dto::{LoginForm, RegisterForm, ResetPasswordForm};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo_types::{NewUser, User};
use crate::auth::reset::ResetTokenKeys;
use crate::error::{AuthError, ValidationErrors};
use crate::mailer::reset_password_email;
use crate::state::AppState;
use crate::validate;

/// Validates the registration form, checks username/email uniqueness against
/// the store, hashes the password and persists the user. No write happens
/// until every check has passed.
pub async fn register(
    state: &AppState,
    form: RegisterForm,
    profile_image: Option<String>,
) -> Result<User, AuthError> {
    let mut errors = ValidationErrors::new();
    validate::check_name(&mut errors, &form.name);
    validate::check_username(&mut errors, &form.username);
    validate::check_email(&mut errors, &form.email);
    validate::check_password(&mut errors, &form.password);
    validate::check_password_confirmation(&mut errors, &form.password, &form.password2);

    let username = form.username.trim();
    let email = form.email.trim();
    if errors.get("username").is_none()
        && state.users.find_by_username(username).await?.is_some()
    {
        errors.add("username", "Username already in use");
    }
    if errors.get("email").is_none() && state.users.find_by_email(email).await?.is_some() {
        errors.add("email", "Email already in use");
    }
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    let password_hash = hash_password(&form.password)?;
    let user = state
        .users
        .create(NewUser {
            name: form.name.trim().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            profile_image,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Missing user and wrong password collapse to the same error so responses
/// cannot be used for username enumeration.
pub async fn login(state: &AppState, form: &LoginForm) -> Result<User, AuthError> {
    let user = match state.users.find_by_username(form.username.trim()).await? {
        Some(u) => u,
        None => {
            warn!(username = %form.username, "login with unknown username");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(&form.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Issues a reset token for the account behind `email`, stores it on the
/// user record (overwriting any prior token) and emails the reset link.
/// Returns whether the email went out; delivery failure is soft and leaves
/// the token valid until its natural expiry.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<bool, AuthError> {
    let email = email.trim();
    let mut errors = ValidationErrors::new();
    validate::check_email(&mut errors, email);
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    let user = state
        .users
        .find_by_email(email)
        .await?
        .ok_or(AuthError::NotFound("Email is not registered with us"))?;

    let keys = ResetTokenKeys::from_ref(state);
    let token = keys.sign(&user.email)?;
    state.users.set_reset_token(user.id, &token).await?;

    let mail = reset_password_email(&user.email, &state.config.base_url, &token);
    match state.mailer.send(mail).await {
        Ok(()) => {
            info!(user_id = %user.id, "reset email sent");
            Ok(true)
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "reset email failed");
            Ok(false)
        }
    }
}

/// Verifies the token and sets the new password. The token is single-use:
/// consumption is one conditional store update, so a concurrent reset with
/// the same token fails with `TokenNotFound`.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    form: &ResetPasswordForm,
) -> Result<(), AuthError> {
    let mut errors = ValidationErrors::new();
    validate::check_password(&mut errors, &form.password);
    validate::check_password_confirmation(&mut errors, &form.password, &form.password2);
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    let keys = ResetTokenKeys::from_ref(state);
    if let Err(e) = keys.verify(token) {
        // A stale token must not linger on the user record after it has
        // expired or been tampered with.
        state.users.clear_reset_token_by_value(token).await?;
        return Err(e);
    }

    let user = state
        .users
        .consume_reset_token(token)
        .await?
        .ok_or(AuthError::TokenNotFound)?;

    let new_hash = hash_password(&form.password)?;
    state.users.update_password(user.id, &new_hash).await?;

    info!(user_id = %user.id, "password reset completed");
    Ok(())
}
