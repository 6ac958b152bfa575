//! Account linking page.
//!
//! The platform's account-linking call to action opens this URL with a
//! linking token and a redirect URI. The page lets the user confirm, which
//! sends them back to the redirect URI with an authorization code appended.

use axum::{
    extract::Query,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use htmlescape::{encode_attribute, encode_minimal};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Authorization code handed back on successful linking.
pub const AUTH_CODE: &str = "1234567890";

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub account_linking_token: String,
    #[serde(default)]
    pub redirect_uri: String,
}

/// Why a redirect URI cannot be put in a link.
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("redirect_uri is not a URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("redirect_uri scheme {0:?} is not http(s)")]
    UnsupportedScheme(String),
}

/// Only absolute http(s) URLs may become `href` targets.
pub fn check_redirect(redirect_uri: &str) -> Result<Url, RedirectError> {
    let url = Url::parse(redirect_uri)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RedirectError::UnsupportedScheme(other.to_string())),
    }
}

/// Where to send the user once they confirm.
pub fn success_redirect(redirect_uri: &str) -> String {
    format!("{}&authorization_code={}", redirect_uri, AUTH_CODE)
}

pub fn render_authorize_page(query: &AuthorizeQuery) -> Result<String, RedirectError> {
    check_redirect(&query.redirect_uri)?;
    let success = success_redirect(&query.redirect_uri);

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Account Linking</title>
  </head>
  <body>
    <h1>Link your account</h1>
    <p>Account linking token: <code>{token}</code></p>
    <p>Redirect URI: <code>{redirect}</code></p>
    <p>
      <a href="{success_attr}">Complete account link</a>
      &middot;
      <a href="{redirect_attr}">Cancel</a>
    </p>
  </body>
</html>
"#,
        token = encode_minimal(&query.account_linking_token),
        redirect = encode_minimal(&query.redirect_uri),
        success_attr = encode_attribute(&success),
        redirect_attr = encode_attribute(&query.redirect_uri),
    ))
}

/// `GET /authorize`
pub async fn authorize(Query(query): Query<AuthorizeQuery>) -> Response {
    info!(
        has_linking_token = !query.account_linking_token.is_empty(),
        redirect_uri = %query.redirect_uri,
        "account_linking_requested"
    );

    match render_authorize_page(&query) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!(redirect_uri = %query.redirect_uri, error = %e, "account_linking_rejected");
            (StatusCode::BAD_REQUEST, "invalid redirect_uri").into_response()
        }
    }
}
