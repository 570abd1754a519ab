use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CERTIFICATES, USERS};
use crate::{proceeds, AppState, Payload};

/// Liveness probe. Counting both collections also proves the store answers.
pub async fn health(Extension(state): Extension<AppState>) -> Payload<Health> {
    let usuarios = state.store.count(USERS).await?;
    let atestados = state.store.count(CERTIFICATES).await?;
    proceeds(Health {
        data: HealthData {
            timestamp: Utc::now(),
            collections: Collections {
                usuarios,
                atestados,
            },
        },
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    data: HealthData,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    timestamp: DateTime<Utc>,
    collections: Collections,
}

#[derive(Debug, Clone, Serialize)]
pub struct Collections {
    usuarios: u64,
    atestados: u64,
}
