use actix_web::error::{InternalError, UrlencodedError};
use actix_web::http::header;
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use tracing::{debug, warn};

use crate::api_key::{self, request_origin, API_KEY_HEADER};
use crate::brute_force::ThrottleStatus;
use crate::error::ApiError;
use crate::firewall;
use crate::models::{normalize_login, ApiRequest, ApiResponse};
use crate::note_handlers;
use crate::state::{AppState, Caller};
use crate::user_handlers::{self, Authentication};

#[get("/")]
async fn index() -> impl Responder {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Quick Notes API</title>
        <style>
            body { font-family: sans-serif; max-width: 720px; margin: 40px auto; color: #222; }
            code { background: #f2f2f2; padding: 2px 6px; border-radius: 4px; }
            li { margin-bottom: 8px; }
        </style>
    </head>
    <body>
        <h1>Quick Notes API</h1>
        <p>All actions are form-encoded <code>POST /api</code> requests carrying an <code>action</code> field:</p>
        <ul>
            <li><code>get_config</code>, <code>check_user</code></li>
            <li><code>set_password</code>, <code>recover_password</code>, <code>change_password</code></li>
            <li><code>check_login</code></li>
            <li><code>get_notes</code>, <code>add_note</code>, <code>update_note</code>, <code>delete_note</code></li>
        </ul>
        <p><code>GET /health</code> returns OK.</p>
    </body>
    </html>
    "#;

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

/// Simple health check
#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

/// Firewall, then throttle, then the action itself.
async fn api(
    req: HttpRequest,
    form: web::Form<ApiRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let settings = &state.settings;
    let ip = firewall::client_ip(&req, settings.server.trust_forwarded_headers);

    if !firewall::is_allowed(&settings.firewall, ip) {
        warn!(ip = %firewall::ip_key(ip), "blocked by firewall");
        return Ok(HttpResponse::Forbidden().json(ApiResponse {
            firewall: Some(true),
            ..ApiResponse::fail("Access denied.")
        }));
    }

    state.store.ensure_dir()?;
    match state.throttle.check(&firewall::ip_key(ip))? {
        ThrottleStatus::Locked { remaining } => {
            let minutes = (remaining + 59) / 60;
            return Ok(HttpResponse::TooManyRequests()
                .insert_header((header::RETRY_AFTER, remaining.to_string()))
                .json(ApiResponse {
                    lockout: Some(true),
                    retry_after: Some(remaining),
                    ..ApiResponse::fail(format!(
                        "Too many failed attempts. Try again in {minutes} minutes."
                    ))
                }));
        }
        ThrottleStatus::Allowed { delay } if !delay.is_zero() => {
            debug!(ip = %firewall::ip_key(ip), ?delay, "throttling request");
            tokio::time::sleep(delay).await;
        }
        ThrottleStatus::Allowed { .. } => {}
    }

    let request = form.into_inner();
    let header_value = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let caller = Caller {
        login: request.login(),
        request,
        ip,
        origin: request_origin(&req),
        host: header_value(header::HOST.as_str()),
        api_key: header_value(API_KEY_HEADER),
        state: state.clone(),
    };

    let body = web::block(move || dispatch(&caller)).await??;
    Ok(HttpResponse::Ok().json(body))
}

pub fn dispatch(caller: &Caller) -> Result<ApiResponse, ApiError> {
    let Some(action) = caller
        .request
        .action
        .as_deref()
        .filter(|action| !action.is_empty())
    else {
        return Ok(ApiResponse::fail("No action specified."));
    };

    let settings = caller.settings();
    if !caller.login.is_empty() {
        let access = &settings.access;
        let listed = |names: &[String]| names.iter().any(|n| normalize_login(n) == caller.login);
        if !access.allowed_usernames.is_empty() && !listed(&access.allowed_usernames) {
            return Ok(ApiResponse::fail("Username not allowed."));
        }
        if listed(&access.blocked_usernames) {
            return Ok(ApiResponse::fail("This username is reserved."));
        }
    }

    let key = caller.api_key.as_deref().or(caller.request.api_key.as_deref());
    if !api_key::verify(
        &settings.api_keys,
        caller.origin.as_deref(),
        caller.host.as_deref(),
        key,
    ) {
        return Ok(ApiResponse {
            api_key_error: Some(true),
            ..ApiResponse::fail("Invalid or missing API key.")
        });
    }

    match action {
        "get_config" => return Ok(user_handlers::get_config(settings)),
        "check_user" => return user_handlers::check_user(caller),
        _ => {}
    }

    if let Some(rejection) = user_handlers::verify_global_code(caller)? {
        return Ok(rejection);
    }

    match action {
        "set_password" => return user_handlers::set_password(caller),
        "recover_password" => return user_handlers::recover_password(caller),
        _ => {}
    }

    let doc = match user_handlers::authenticate(caller)? {
        Authentication::Granted(doc) => doc,
        Authentication::Denied(rejection) => return Ok(rejection),
    };

    match action {
        "check_login" => Ok(ApiResponse::ok("Login successful.")),
        "change_password" => user_handlers::change_password(caller, doc),
        "get_notes" => Ok(note_handlers::get_notes(doc)),
        "add_note" => note_handlers::add_note(caller, doc),
        "update_note" => note_handlers::update_note(caller, doc),
        "delete_note" => note_handlers::delete_note(caller, doc),
        other => Ok(ApiResponse::fail(format!(
            "Invalid API call for action: \"{}\".",
            strip_tags(other)
        ))),
    }
}

/// Drops anything between `<` and `>`.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn form_error(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ApiResponse::fail("Malformed request body."));
    InternalError::from_response(err, response).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().error_handler(form_error))
        .service(index)
        .service(health)
        .route("/api", web::post().to(api))
        .route("/api/", web::post().to(api));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("get_<b>notes</b>"), "get_notes");
        assert_eq!(strip_tags("<script>alert(1)</script>x"), "alert(1)x");
        assert_eq!(strip_tags("a > b"), "a > b");
    }
}
