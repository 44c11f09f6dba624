//! Page routes
//!
//! Minimal HTML shells for the browser-facing routes. Access to these is
//! decided by the route authorizer before a handler runs; the handlers only
//! render.

use axum::{
    extract::Path,
    response::Html,
    routing::get,
    Router,
};

use crate::api::middleware::{AppState, CurrentIdentity};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/login", get(login))
        .route("/signup", get(signup))
        .route("/content", get(browse))
        .route("/content/{id}", get(detail))
        .route("/user", get(account))
}

fn render(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{} | MyFlix</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    ))
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn landing() -> Html<String> {
    render(
        "Welcome",
        "<h1>Unlimited movies and TV shows</h1>\n<a href=\"/signup\">Get started</a> <a href=\"/login\">Sign in</a>",
    )
}

async fn login() -> Html<String> {
    render("Sign in", "<h1>Sign in</h1>\n<form id=\"login\" data-action=\"/api/auth/login\"></form>")
}

async fn signup() -> Html<String> {
    render("Sign up", "<h1>Create your account</h1>\n<form id=\"signup\" data-action=\"/api/auth/signup\"></form>")
}

async fn browse(CurrentIdentity(identity): CurrentIdentity) -> Html<String> {
    let name = identity
        .as_deref()
        .map(|i| escape(&i.display_name))
        .unwrap_or_default();
    render(
        "Browse",
        &format!("<h1>Welcome back, {}</h1>\n<div id=\"catalog\" data-source=\"/api/content\"></div>", name),
    )
}

async fn detail(Path(id): Path<String>) -> Html<String> {
    let id = escape(&id);
    render(
        "Details",
        &format!("<div id=\"content\" data-source=\"/api/content/{}\"></div>", id),
    )
}

async fn account(CurrentIdentity(identity): CurrentIdentity) -> Html<String> {
    let email = identity
        .as_deref()
        .map(|i| escape(&i.email))
        .unwrap_or_default();
    render(
        "Account",
        &format!("<h1>Account</h1>\n<p>{}</p>\n<form id=\"change-password\" data-action=\"/api/change-password\"></form>", email),
    )
}
