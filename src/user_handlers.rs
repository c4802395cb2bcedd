use tracing::{info, warn};

use crate::auth::{
    current_code, generate_recovery_code, hash_secret, validate_password, verify_secret,
};
use crate::config::{PasswordMode, Settings};
use crate::error::ApiError;
use crate::models::{ApiResponse, PublicConfig, UserDocument};
use crate::state::Caller;

const GLOBAL_MODE: &str = "Passwords are managed globally.";

pub enum Authentication {
    Granted(UserDocument),
    Denied(ApiResponse),
}

pub fn get_config(settings: &Settings) -> ApiResponse {
    ApiResponse {
        success: true,
        config: Some(PublicConfig {
            enable_pwa: settings.server.enable_pwa,
            enable_offline_mode: settings.server.enable_offline_mode,
            require_global_code: settings.access.require_global_code,
            store_ip: settings.server.store_ip,
        }),
        ..ApiResponse::default()
    }
}

pub fn check_user(caller: &Caller) -> Result<ApiResponse, ApiError> {
    if caller.login.is_empty() {
        return Ok(ApiResponse::fail("Login required."));
    }
    let settings = caller.settings();
    let doc = caller.state.store.load(&caller.login)?;
    let has_password = match settings.password.mode {
        PasswordMode::Global => true,
        PasswordMode::Individual => doc.as_ref().is_some_and(|doc| doc.user.has_password()),
    };
    Ok(ApiResponse {
        success: true,
        user_exists: Some(doc.is_some()),
        has_password: Some(has_password),
        require_global_code: Some(settings.access.require_global_code),
        ..ApiResponse::default()
    })
}

/// `Some(rejection)` when an access code is required and the caller's is
/// wrong. A wrong code counts as a failed attempt.
pub fn verify_global_code(caller: &Caller) -> Result<Option<ApiResponse>, ApiError> {
    let access = &caller.settings().access;
    if !access.require_global_code {
        return Ok(None);
    }
    if caller.request.global_code() == current_code(&access.global_code_pattern) {
        return Ok(None);
    }
    caller.state.throttle.record_failure(&caller.ip_key())?;
    Ok(Some(ApiResponse {
        code_error: Some(true),
        ..ApiResponse::fail("Invalid access code.")
    }))
}

/// Hashes `password` and a fresh recovery code into `doc`; returns the
/// plain recovery code, which is shown to the user exactly once.
fn reissue_credentials(
    doc: &mut UserDocument,
    password: &str,
    cost: u32,
) -> Result<String, ApiError> {
    let code = generate_recovery_code();
    doc.user.password_hash = Some(hash_secret(password, cost)?);
    doc.user.recovery_code = Some(hash_secret(&code, cost)?);
    Ok(code)
}

fn with_recovery_code(message: &str, code: String) -> ApiResponse {
    ApiResponse {
        recovery_code: Some(code),
        ..ApiResponse::ok(message)
    }
}

pub fn set_password(caller: &Caller) -> Result<ApiResponse, ApiError> {
    let settings = caller.settings();
    if settings.password.mode == PasswordMode::Global {
        return Ok(ApiResponse::fail(GLOBAL_MODE));
    }
    if caller.login.is_empty() {
        return Ok(ApiResponse::fail("Login required."));
    }
    let password = caller.request.secret();
    if let Some(problem) = validate_password(&password, &settings.password) {
        return Ok(ApiResponse::fail(problem));
    }

    let store = &caller.state.store;
    let mut doc = store
        .load(&caller.login)?
        .unwrap_or_else(|| UserDocument::new(&caller.login));
    if doc.user.has_password() {
        return Ok(ApiResponse::fail("User already has a password."));
    }

    let code = reissue_credentials(&mut doc, &password, settings.server.bcrypt_cost)?;
    store.save(&doc)?;
    info!(login = %caller.login, "password set");
    Ok(with_recovery_code("Password set successfully!", code))
}

pub fn recover_password(caller: &Caller) -> Result<ApiResponse, ApiError> {
    let settings = caller.settings();
    if settings.password.mode == PasswordMode::Global {
        return Ok(ApiResponse::fail(GLOBAL_MODE));
    }
    if caller.login.is_empty() {
        return Ok(ApiResponse::fail("Login required."));
    }
    let recovery_code = caller.request.recovery_code();
    let password = caller.request.secret();
    if recovery_code.is_empty() || password.is_empty() {
        return Ok(ApiResponse::fail("Recovery code and new password required."));
    }
    if let Some(problem) = validate_password(&password, &settings.password) {
        return Ok(ApiResponse::fail(problem));
    }

    let store = &caller.state.store;
    let throttle = &caller.state.throttle;
    let doc = store.load(&caller.login)?;
    let Some(mut doc) = doc.filter(|doc| {
        doc.user
            .recovery_code
            .as_deref()
            .is_some_and(|hashed| verify_secret(&recovery_code, hashed))
    }) else {
        warn!(login = %caller.login, ip = %caller.ip_key(), "invalid recovery code");
        throttle.record_failure(&caller.ip_key())?;
        return Ok(ApiResponse::fail("Invalid recovery code."));
    };
    throttle.clear(&caller.ip_key())?;

    let code = reissue_credentials(&mut doc, &password, settings.server.bcrypt_cost)?;
    store.save(&doc)?;
    info!(login = %caller.login, "password recovered");
    Ok(with_recovery_code("Password reset successfully!", code))
}

/// Checks `login` + `secret`. Every outcome other than `Granted` carries
/// `login_error` so the client returns to its login screen.
pub fn authenticate(caller: &Caller) -> Result<Authentication, ApiError> {
    let secret = caller.request.secret();
    if caller.login.is_empty() || secret.is_empty() {
        return Ok(Authentication::Denied(ApiResponse::login_error(
            "Login and password required.",
        )));
    }

    let settings = caller.settings();
    let store = &caller.state.store;
    let throttle = &caller.state.throttle;
    let doc = store.load(&caller.login)?;

    let doc = match settings.password.mode {
        PasswordMode::Global => {
            if secret != current_code(&settings.password.global_pattern) {
                throttle.record_failure(&caller.ip_key())?;
                return Ok(Authentication::Denied(ApiResponse::login_error("Invalid password.")));
            }
            match doc {
                Some(doc) => doc,
                None => {
                    let doc = UserDocument::new(&caller.login);
                    store.save(&doc)?;
                    info!(login = %caller.login, "created user on first login");
                    doc
                }
            }
        }
        PasswordMode::Individual => {
            let Some(doc) = doc.filter(|doc| doc.user.has_password()) else {
                return Ok(Authentication::Denied(ApiResponse::login_error(
                    "Please set a password first.",
                )));
            };
            let hashed = doc.user.password_hash.as_deref().unwrap_or_default();
            if !verify_secret(&secret, hashed) {
                warn!(login = %caller.login, ip = %caller.ip_key(), "invalid password");
                throttle.record_failure(&caller.ip_key())?;
                return Ok(Authentication::Denied(ApiResponse::login_error("Invalid password.")));
            }
            doc
        }
    };

    throttle.clear(&caller.ip_key())?;
    Ok(Authentication::Granted(doc))
}

pub fn change_password(caller: &Caller, mut doc: UserDocument) -> Result<ApiResponse, ApiError> {
    let settings = caller.settings();
    if settings.password.mode == PasswordMode::Global {
        return Ok(ApiResponse::fail(GLOBAL_MODE));
    }
    let password = caller.request.new_password();
    if password.is_empty() {
        return Ok(ApiResponse::fail("New password required."));
    }
    if let Some(problem) = validate_password(&password, &settings.password) {
        return Ok(ApiResponse::fail(problem));
    }

    let code = reissue_credentials(&mut doc, &password, settings.server.bcrypt_cost)?;
    caller.state.store.save(&doc)?;
    info!(login = %caller.login, "password changed");
    Ok(with_recovery_code("Password changed successfully!", code))
}
