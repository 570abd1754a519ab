use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use atestado_server::attachments::AttachmentStore;
use atestado_server::config::Config;
use atestado_server::credentials::PasswordPolicy;
use atestado_server::docstore::DocumentStore;
use atestado_server::session::TokenService;
use atestado_server::store::{MemoryRowStore, PgRowStore, RowStore};
use atestado_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::parse();
    config.validate()?;

    let rows: Arc<dyn RowStore> = match (&config.database_url, config.in_memory) {
        (Some(url), false) => {
            let pg = PgRowStore::connect(url, config.max_connections)
                .await
                .context("connecting to Postgres")?;
            pg.migrate().await.context("running migrations")?;
            log::info!("Using Postgres store");
            Arc::new(pg)
        }
        _ => {
            log::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(MemoryRowStore::with_default_schema())
        }
    };

    let attachments = AttachmentStore::new(&config.upload_dir, config.storage_bucket.clone());
    attachments
        .prepare()
        .await
        .with_context(|| format!("creating {}", config.upload_dir.display()))?;

    let state = AppState {
        store: DocumentStore::new(rows),
        tokens: TokenService::new(config.jwt_secret.clone()),
        passwords: PasswordPolicy::default(),
        attachments,
        secure_cookies: config.secure_cookies,
    };

    log::info!("Starting atestado HTTP server on http://{}", config.bind);
    axum::Server::bind(&config.bind)
        .serve(router(state).into_make_service())
        .await?;
    Ok(())
}
