use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const USERS: &str = "usuarios";
pub const CERTIFICATES: &str = "atestados";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Administrador,
    Funcionario,
    Usuario,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrador => "ADMINISTRADOR",
            Role::Funcionario => "FUNCIONARIO",
            Role::Usuario => "USUARIO",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Administrador | Role::Funcionario)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMINISTRADOR" => Ok(Role::Administrador),
            "FUNCIONARIO" => Ok(Role::Funcionario),
            "USUARIO" => Ok(Role::Usuario),
            _ => Err(()),
        }
    }
}

fn default_user_status() -> String {
    "ativo".to_string()
}

/// A `usuarios` document as stored. Never serialized to clients; use
/// [`UserProfile`] for that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub nome: String,
    pub email: String,
    #[serde(default)]
    pub telefone: String,
    pub cargo: Role,
    #[serde(default)]
    pub ra: Option<String>,
    pub senha_hash: String,
    #[serde(default)]
    pub curso: Option<String>,
    #[serde(default)]
    pub periodo: Option<String>,
    #[serde(default)]
    pub turma: Option<String>,
    #[serde(default = "default_user_status")]
    pub status: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub nome: String,
    pub email: String,
    pub telefone: String,
    pub cargo: Role,
    pub ra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curso: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub periodo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turma: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            nome: user.nome.clone(),
            email: user.email.clone(),
            telefone: user.telefone.clone(),
            cargo: user.cargo,
            ra: user.ra.clone(),
            curso: user.curso.clone(),
            periodo: user.periodo.clone(),
            turma: user.turma.clone(),
            status: user.status.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pendente,
    Aprovado,
    Rejeitado,
}

impl FromStr for CertificateStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendente" => Ok(CertificateStatus::Pendente),
            "aprovado" => Ok(CertificateStatus::Aprovado),
            "rejeitado" => Ok(CertificateStatus::Rejeitado),
            _ => Err(()),
        }
    }
}

/// An `atestados` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub id_usuario: String,
    pub data_inicio: NaiveDate,
    pub data_fim: NaiveDate,
    pub motivo: String,
    pub status: CertificateStatus,
    #[serde(default)]
    pub imagem_atestado: Option<String>,
    #[serde(default)]
    pub observacoes_admin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    pub id: String,
    pub nome: String,
    pub email: String,
    pub ra: Option<String>,
}

impl From<&UserRecord> for Submitter {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            nome: user.nome.clone(),
            email: user.email.clone(),
            ra: user.ra.clone(),
        }
    }
}

/// Review-queue row: a submission joined with whoever sent it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    pub data_inicio: NaiveDate,
    pub data_fim: NaiveDate,
    pub motivo: String,
    pub status: CertificateStatus,
    pub imagem: String,
    pub observacoes_admin: String,
    pub created_at: DateTime<Utc>,
    pub usuario: Option<Submitter>,
}

impl ReviewItem {
    pub fn new(certificate: Certificate, usuario: Option<Submitter>) -> Self {
        Self {
            id: certificate.id,
            data_inicio: certificate.data_inicio,
            data_fim: certificate.data_fim,
            motivo: certificate.motivo,
            status: certificate.status,
            imagem: certificate.imagem_atestado.unwrap_or_default(),
            observacoes_admin: certificate.observacoes_admin,
            created_at: certificate.created_at,
            usuario,
        }
    }
}
