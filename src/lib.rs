pub mod atestados;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod docstore;
pub mod err;
pub mod health;
pub mod limits;
pub mod models;
pub mod session;
pub mod store;
pub mod users;
pub mod validation;

use axum::handler::Handler;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::{Extension, Router};
use serde::Serialize;

use crate::attachments::AttachmentStore;
use crate::credentials::PasswordPolicy;
use crate::docstore::DocumentStore;
use crate::err::{Error, Reply};
use crate::session::TokenService;

pub type Payload<T> = Result<Reply<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::ok(value))
}

pub fn created<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Reply::created(value))
}

/// Everything a handler needs, shared through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub tokens: TokenService,
    pub passwords: PasswordPolicy,
    pub attachments: AttachmentStore,
    pub secure_cookies: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login_user))
        .route("/auth/signup", post(auth::register_student))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me))
        .route("/profile", get(users::me))
        .route("/users", get(users::list_users))
        .route("/admin/create-user", post(users::create_user))
        .route("/admin/atestados", get(atestados::review_queue))
        .route(
            "/atestados",
            get(atestados::list_certificates).post(atestados::submit_certificate),
        )
        .route("/atestados/:id", get(atestados::show_certificate))
        .route("/atestados/:id/status", patch(atestados::change_status))
        .route("/uploads/*path", get(atestados::download_attachment))
        .fallback(err::handler404.into_service())
        .layer(middleware::from_fn(limits::limit_body))
        .layer(Extension(state))
}
