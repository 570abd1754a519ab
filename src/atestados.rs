use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::attachments::{accepted_content_type, content_type_for, StoredFile, MAX_ATTACHMENT_BYTES};
use crate::credentials::Capability;
use crate::docstore::to_camel_case;
use crate::err::Error;
use crate::limits::MAX_TEXT_FIELD_BYTES;
use crate::models::{
    Certificate, CertificateStatus, ReviewItem, Submitter, UserRecord, CERTIFICATES, USERS,
};
use crate::session::CurrentUser;
use crate::store::{Direction, Operator};
use crate::validation::{json_body, present, Checks};
use crate::{created, proceeds, AppState, Payload};

fn can_review(current: &CurrentUser) -> bool {
    current.user.cargo.is_staff()
}

async fn load_certificate(state: &AppState, id: &str) -> Result<Certificate, Error> {
    state
        .store
        .collection(CERTIFICATES)
        .doc(id)
        .get()
        .await?
        .decode()?
        .ok_or_else(|| Error::not_found("Atestado não encontrado"))
}

/// Students see their own submissions; reviewers see everything, optionally
/// narrowed to one student.
pub async fn list_certificates(
    current: CurrentUser,
    Query(filter): Query<ListFilter>,
    Extension(state): Extension<AppState>,
) -> Payload<CertificateList> {
    let owner = if can_review(&current) {
        filter.user_id
    } else {
        match filter.user_id {
            Some(requested) if requested != current.user.id => return Err(Error::forbidden()),
            _ => Some(current.user.id.clone()),
        }
    };

    let mut query = state.store.collection(CERTIFICATES);
    if let Some(owner) = owner {
        query = query.filter("idUsuario", Operator::Eq, owner);
    }
    let data: Vec<Certificate> = query
        .order_by("createdAt", Direction::Desc)
        .get()
        .await?
        .decode()?;
    proceeds(CertificateList { data })
}

pub async fn show_certificate(
    current: CurrentUser,
    Path(id): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<CertificateData> {
    let certificate = load_certificate(&state, &id).await?;
    if certificate.id_usuario != current.user.id && !can_review(&current) {
        return Err(Error::forbidden());
    }
    proceeds(CertificateData { data: certificate })
}

/// Reads a text field, recording a failure instead of buffering past
/// `MAX_TEXT_FIELD_BYTES`.
async fn read_text(
    field: &mut Field<'_>,
    name: &str,
    checks: &mut Checks,
) -> Result<Option<String>, Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            checks.fail(name, "Campo deve ter no máximo 4096 bytes");
            return Ok(None);
        }
        bytes.extend_from_slice(&chunk);
    }
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            checks.fail(name, "Campo deve ser texto UTF-8");
            Ok(None)
        }
    }
}

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// Reads the multipart form. Field names may come as `data_inicio` or
/// `dataInicio`.
async fn read_form(mut multipart: Multipart) -> Result<(SubmitCertificate, Option<Upload>), Error> {
    let mut form = SubmitCertificate::default();
    let mut upload = None;
    let mut checks = Checks::new();

    while let Some(mut field) = multipart.next_field().await? {
        let name = to_camel_case(field.name().unwrap_or_default());
        match name.as_str() {
            "imagemAtestado" | "imagem" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(|mime| mime.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if bytes.len() + chunk.len() > MAX_ATTACHMENT_BYTES {
                        checks.fail(&name, "Arquivo deve ter no máximo 5MB");
                        break;
                    }
                    bytes.extend_from_slice(&chunk);
                }
                if bytes.is_empty() {
                    continue;
                }
                if !content_type.as_deref().map(accepted_content_type).unwrap_or(false) {
                    checks.fail(&name, "Arquivo deve ser uma imagem ou PDF");
                }
                upload = Some(Upload { file_name, bytes });
            }
            "dataInicio" => form.data_inicio = read_text(&mut field, &name, &mut checks).await?,
            "dataFim" => form.data_fim = read_text(&mut field, &name, &mut checks).await?,
            "motivo" => form.motivo = read_text(&mut field, &name, &mut checks).await?,
            _ => log::debug!("Ignoring form field `{}`", name),
        }
    }
    checks.finish()?;
    Ok((form, upload))
}

pub async fn submit_certificate(
    current: CurrentUser,
    multipart: Multipart,
    Extension(state): Extension<AppState>,
) -> Payload<CertificateData> {
    current.require(Capability::SubmitCertificate)?;
    let (form, upload) = read_form(multipart).await?;
    let (data_inicio, data_fim, motivo) = form.validate()?;

    let stored: Option<StoredFile> = match &upload {
        Some(upload) => Some(
            state
                .attachments
                .save(&current.user.id, upload.file_name.as_deref(), &upload.bytes)
                .await?,
        ),
        None => None,
    };

    let now = Utc::now();
    let certificate = Certificate {
        id: Uuid::new_v4().to_string(),
        id_usuario: current.user.id.clone(),
        data_inicio,
        data_fim,
        motivo,
        status: CertificateStatus::Pendente,
        imagem_atestado: stored.as_ref().map(|file| file.url.clone()),
        observacoes_admin: String::new(),
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = state.store.collection(CERTIFICATES).add(&certificate).await {
        if let Some(file) = &stored {
            if let Err(cleanup) = state.attachments.remove(&file.path).await {
                log::warn!("Could not remove orphaned upload {}: {:?}", file.path, cleanup);
            }
        }
        return Err(err.into());
    }
    log::info!("Certificate {} submitted by {}", certificate.id, current.user.id);
    created(CertificateData { data: certificate })
}

pub async fn change_status(
    current: CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<ChangeStatus>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<CertificateData> {
    current.require(Capability::ChangeSubmissionStatus)?;
    let request = json_body(payload)?;
    let status = present(&request.status).and_then(|s| s.parse::<CertificateStatus>().ok());
    let status = match status {
        Some(status) => status,
        None => {
            return Err(Error::validation(vec![
                "status: Status deve ser pendente, aprovado ou rejeitado",
            ]))
        }
    };

    let mut changes = json!({
        "status": status,
        "updatedAt": Utc::now(),
    });
    if let Some(notes) = request.observacoes_admin {
        changes["observacoesAdmin"] = Value::String(notes);
    }
    let updated = state
        .store
        .collection(CERTIFICATES)
        .doc(&id)
        .update(&changes)
        .await?;
    if !updated {
        return Err(Error::not_found("Atestado não encontrado"));
    }
    log::info!("Certificate {} set to {:?} by {}", id, status, current.user.id);
    proceeds(CertificateData {
        data: load_certificate(&state, &id).await?,
    })
}

/// Every submission, newest first, joined with its submitter.
pub async fn review_queue(
    current: CurrentUser,
    Extension(state): Extension<AppState>,
) -> Payload<ReviewQueue> {
    current.require(Capability::ReviewSubmissions)?;
    let certificates: Vec<Certificate> = state
        .store
        .collection(CERTIFICATES)
        .order_by("createdAt", Direction::Desc)
        .get()
        .await?
        .decode()?;

    let mut owner_ids: Vec<Value> = certificates
        .iter()
        .map(|c| Value::String(c.id_usuario.clone()))
        .collect();
    owner_ids.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    owner_ids.dedup();

    let owners: HashMap<String, Submitter> = if owner_ids.is_empty() {
        HashMap::new()
    } else {
        let users: Vec<UserRecord> = state
            .store
            .collection(USERS)
            .filter("id", Operator::In, owner_ids)
            .get()
            .await?
            .decode()?;
        users
            .iter()
            .map(|user| (user.id.clone(), Submitter::from(user)))
            .collect()
    };

    let data = certificates
        .into_iter()
        .map(|certificate| {
            let usuario = owners.get(&certificate.id_usuario).cloned();
            ReviewItem::new(certificate, usuario)
        })
        .collect();
    proceeds(ReviewQueue { data })
}

/// Serves an uploaded file to its owner or to reviewers.
pub async fn download_attachment(
    current: CurrentUser,
    Path(path): Path<String>,
    Extension(state): Extension<AppState>,
) -> Result<Response, Error> {
    let path = path.trim_start_matches('/');
    let owner = state
        .attachments
        .owner_of(path)
        .ok_or_else(|| Error::not_found("Arquivo não encontrado"))?;
    if owner != current.user.id && !can_review(&current) {
        return Err(Error::forbidden());
    }
    let bytes = state.attachments.read(path).await?;
    Ok(([(CONTENT_TYPE, content_type_for(path))], bytes).into_response())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateList {
    data: Vec<Certificate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateData {
    data: Certificate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueue {
    data: Vec<ReviewItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeStatus {
    pub status: Option<String>,
    pub observacoes_admin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitCertificate {
    pub data_inicio: Option<String>,
    pub data_fim: Option<String>,
    pub motivo: Option<String>,
}

impl SubmitCertificate {
    pub fn validate(self) -> Result<(chrono::NaiveDate, chrono::NaiveDate, String), Error> {
        let mut checks = Checks::new();
        let inicio = checks.date("dataInicio", &self.data_inicio);
        let fim = checks.date("dataFim", &self.data_fim);
        checks.required("motivo", &self.motivo, "Motivo é obrigatório");
        if let (Some(inicio), Some(fim)) = (inicio, fim) {
            checks.check(
                fim >= inicio,
                "dataFim",
                "Data final deve ser igual ou posterior à data inicial",
            );
        }
        checks.finish()?;
        match (inicio, fim, present(&self.motivo)) {
            (Some(inicio), Some(fim), Some(motivo)) => Ok((inicio, fim, motivo.to_string())),
            _ => Err(Error::validation(vec!["formulário incompleto"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn form(inicio: &str, fim: &str, motivo: &str) -> SubmitCertificate {
        SubmitCertificate {
            data_inicio: Some(inicio.into()),
            data_fim: Some(fim.into()),
            motivo: Some(motivo.into()),
        }
    }

    #[test]
    fn valid_range_passes() {
        let (inicio, fim, motivo) = form("2025-03-01", "2025-03-03", " gripe ").validate().unwrap();
        assert_eq!(inicio, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(fim, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(motivo, "gripe");
    }

    #[test]
    fn reversed_range_and_blank_reason_fail() {
        match form("2025-03-05", "2025-03-01", "  ").validate() {
            Err(Error::Validation { details, .. }) => {
                assert_eq!(details.len(), 2);
                assert!(details[0].starts_with("motivo: "));
                assert!(details[1].starts_with("dataFim: "));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
