//! Access checks for the admin area and customer-only pages.
//!
//! Both areas decide through [`check`] against the same [`SessionState`] snapshot taken
//! from the shared session provider.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};

use crate::{auth::Session, session::SessionState, state::AppState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Area {
    Admin,
    Customer,
}

impl Area {
    pub fn login_path(self) -> &'static str {
        match self {
            Area::Admin => "/admin/login",
            Area::Customer => "/login",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow(Session),
    Loading,
    Redirect(String),
    Forbidden,
}

pub fn check(area: Area, state: &SessionState, requested: &str) -> GuardOutcome {
    match state {
        SessionState::Loading => GuardOutcome::Loading,
        SessionState::Anonymous => GuardOutcome::Redirect(login_redirect(area, requested)),
        SessionState::Authenticated(session) => {
            if area == Area::Admin && !session.user.is_admin() {
                GuardOutcome::Forbidden
            } else {
                GuardOutcome::Allow(session.clone())
            }
        }
    }
}

/// Login URL that sends the user back to `requested` afterwards.
pub fn login_redirect(area: Area, requested: &str) -> String {
    format!("{}?redirect={}", area.login_path(), urlencoding::encode(requested))
}

/// Accepts only local paths as post-login targets. Browsers read `/\host` like
/// `//host` and drop tabs and newlines, so backslashes and control characters are
/// refused as well.
pub fn safe_redirect_target(raw: Option<&str>, fallback: &str) -> String {
    match raw.map(str::trim) {
        Some(target) if is_local_path(target) => target.to_string(),
        _ => fallback.to_string(),
    }
}

fn is_local_path(target: &str) -> bool {
    let mut chars = target.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/') | Some('\\'))
        && !target.contains('\\')
        && !target.chars().any(char::is_control)
}

pub fn requested_path(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

/// Resolves a customer-only page; `Err` carries the response to send instead.
/// `requested` is where the customer returns after logging in.
pub async fn require_customer(
    state: &AppState,
    req: &HttpRequest,
    requested: &str,
) -> Result<Session, HttpResponse> {
    let snapshot = state.session_state(req).await;
    match check(Area::Customer, &snapshot, requested) {
        GuardOutcome::Allow(session) => Ok(session),
        outcome => Err(outcome_response(outcome)),
    }
}

pub async fn admin_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: MessageBody + 'static,
{
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return Ok(req.into_response(HttpResponse::InternalServerError().finish()));
    };
    let snapshot = state.session_state(req.request()).await;
    match check(Area::Admin, &snapshot, &requested_path(req.request())) {
        GuardOutcome::Allow(session) => {
            req.extensions_mut().insert(session);
            let res = next.call(req).await?;
            Ok(res.map_into_boxed_body())
        }
        outcome => Ok(req.into_response(outcome_response(outcome))),
    }
}

fn outcome_response(outcome: GuardOutcome) -> HttpResponse {
    match outcome {
        GuardOutcome::Redirect(location) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, location))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish(),
        GuardOutcome::Loading => HttpResponse::ServiceUnavailable()
            .insert_header((header::RETRY_AFTER, "1"))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .content_type("text/html; charset=utf-8")
            .body(plain_page(
                "Loading",
                r#"<meta http-equiv="refresh" content="1" /><p>Checking your session&hellip;</p>"#,
            )),
        GuardOutcome::Forbidden => HttpResponse::Forbidden()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .content_type("text/html; charset=utf-8")
            .body(plain_page(
                "Admins only",
                r#"<p>This area is for shop staff.</p><p><a href="/logout">Sign out</a> or <a href="/">return to the shop</a>.</p>"#,
            )),
        GuardOutcome::Allow(_) => HttpResponse::Ok().finish(),
    }
}

fn plain_page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <link rel="stylesheet" href="/static/app.css" />
  </head>
  <body>
    <main class="card narrow">
      <h1>{title}</h1>
      {body}
    </main>
  </body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::models::{ROLE_ADMIN, ROLE_CUSTOMER};
    use chrono::{Duration, Utc};

    fn session(role: &str) -> Session {
        Session {
            token: "token".to_string(),
            user: AuthUser {
                id: "user".to_string(),
                email: "user@example.com".to_string(),
                role: role.to_string(),
            },
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn anonymous_users_are_sent_to_the_matching_login() {
        let requested = "/book?step=details&date=2024-05-06";
        assert_eq!(
            check(Area::Customer, &SessionState::Anonymous, requested),
            GuardOutcome::Redirect(format!("/login?redirect={}", urlencoding::encode(requested)))
        );
        assert_eq!(
            check(Area::Admin, &SessionState::Anonymous, "/admin/products"),
            GuardOutcome::Redirect("/admin/login?redirect=%2Fadmin%2Fproducts".to_string())
        );
    }

    #[test]
    fn loading_state_holds_the_page() {
        assert_eq!(check(Area::Admin, &SessionState::Loading, "/admin"), GuardOutcome::Loading);
        assert_eq!(check(Area::Customer, &SessionState::Loading, "/book"), GuardOutcome::Loading);
    }

    #[test]
    fn admin_area_requires_admin_role() {
        let shopper = session(ROLE_CUSTOMER);
        let customer = SessionState::Authenticated(shopper.clone());
        assert_eq!(check(Area::Admin, &customer, "/admin"), GuardOutcome::Forbidden);
        assert_eq!(
            check(Area::Customer, &customer, "/book"),
            GuardOutcome::Allow(shopper)
        );

        let admin = SessionState::Authenticated(session(ROLE_ADMIN));
        assert!(matches!(check(Area::Admin, &admin, "/admin"), GuardOutcome::Allow(_)));
    }

    #[test]
    fn redirect_targets_must_be_local() {
        assert_eq!(safe_redirect_target(Some("/book?step=details"), "/"), "/book?step=details");
        assert_eq!(safe_redirect_target(Some("//evil.example"), "/"), "/");
        assert_eq!(safe_redirect_target(Some("https://evil.example"), "/"), "/");
        assert_eq!(safe_redirect_target(None, "/admin/dashboard"), "/admin/dashboard");
        assert_eq!(safe_redirect_target(Some("/\\evil.example"), "/"), "/");
        assert_eq!(safe_redirect_target(Some("/admin\\..\\x"), "/"), "/");
        assert_eq!(safe_redirect_target(Some("/\t/evil.example"), "/"), "/");
    }
}
