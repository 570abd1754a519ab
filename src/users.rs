use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::credentials::{find_user_by_email, Capability};
use crate::err::Error;
use crate::models::{Role, UserProfile, UserRecord, USERS};
use crate::session::CurrentUser;
use crate::store::{Direction, Operator};
use crate::validation::{json_body, present, Checks};
use crate::{created, proceeds, AppState, Payload};

/// A user that passed validation and is about to be stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub nome: String,
    pub email: String,
    pub telefone: String,
    pub cargo: Role,
    pub ra: Option<String>,
    pub senha: String,
    pub curso: Option<String>,
    pub periodo: Option<String>,
    pub turma: Option<String>,
    pub status: String,
    pub metadata: Option<Value>,
}

async fn ra_taken(state: &AppState, ra: &str) -> Result<bool, Error> {
    let found = state
        .store
        .collection(USERS)
        .filter("ra", Operator::Eq, ra)
        .limit(1)
        .get()
        .await?;
    Ok(!found.is_empty())
}

/// Stores a new user. The lookups only produce a friendlier message; the
/// unique constraints on `email` and `ra` are what actually keep
/// concurrent registrations apart.
pub async fn register(state: &AppState, new_user: NewUser) -> Result<UserProfile, Error> {
    if find_user_by_email(&state.store, &new_user.email).await?.is_some() {
        return Err(Error::Conflict {
            message: "Usuário com este email já existe".to_string(),
        });
    }
    if let Some(ra) = &new_user.ra {
        if ra_taken(state, ra).await? {
            return Err(Error::Conflict {
                message: "RA já está sendo usado por outro usuário".to_string(),
            });
        }
    }

    let now = Utc::now();
    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        nome: new_user.nome,
        email: new_user.email,
        telefone: new_user.telefone,
        cargo: new_user.cargo,
        ra: new_user.ra,
        senha_hash: state.passwords.hash(new_user.senha).await?,
        curso: new_user.curso,
        periodo: new_user.periodo,
        turma: new_user.turma,
        status: new_user.status,
        metadata: new_user.metadata,
        created_at: now,
        updated_at: now,
    };
    state.store.collection(USERS).add(&user).await?;
    log::info!("Created {} account {}", user.cargo, user.id);
    Ok(UserProfile::from(&user))
}

pub async fn me(current: CurrentUser) -> Payload<ProfileResponse> {
    proceeds(ProfileResponse {
        user: UserProfile::from(&current.user),
    })
}

pub async fn list_users(
    current: CurrentUser,
    Extension(state): Extension<AppState>,
) -> Payload<UserList> {
    current.require(Capability::ListUsers)?;
    let users: Vec<UserRecord> = state
        .store
        .collection(USERS)
        .order_by("createdAt", Direction::Asc)
        .get()
        .await?
        .decode()?;
    proceeds(UserList {
        data: users.iter().map(UserProfile::from).collect(),
    })
}

pub async fn create_user(
    current: CurrentUser,
    payload: Result<Json<CreateUser>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<UserCreated> {
    current.require(Capability::CreateUser)?;
    let request = json_body(payload)?;
    let new_user = request.validate()?;
    let profile = register(&state, new_user).await?;
    log::info!("Account {} created by administrator {}", profile.id, current.user.id);
    created(UserCreated {
        message: "Usuário criado com sucesso",
        data: profile,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserList {
    data: Vec<UserProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCreated {
    message: &'static str,
    data: UserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUser {
    pub nome: Option<String>,
    pub email: Option<String>,
    pub ra: Option<String>,
    pub telefone: Option<String>,
    pub senha: Option<String>,
    pub confirmar_senha: Option<String>,
    pub cargo: Option<String>,
    pub curso: Option<String>,
    pub periodo: Option<String>,
    pub turma: Option<String>,
    pub status: Option<String>,
}

impl CreateUser {
    pub fn validate(self) -> Result<NewUser, Error> {
        let mut checks = Checks::new();
        checks
            .min_chars("nome", &self.nome, 2, "Nome deve ter pelo menos 2 caracteres")
            .email("email", &self.email)
            .min_chars("telefone", &self.telefone, 10, "Telefone deve ter pelo menos 10 dígitos")
            .strong_password("senha", &self.senha)
            .matches("confirmarSenha", &self.confirmar_senha, &self.senha);

        let cargo = present(&self.cargo).and_then(|c| c.parse::<Role>().ok());
        if cargo.is_none() {
            checks.fail(
                "cargo",
                "Cargo inválido (ADMINISTRADOR, FUNCIONARIO ou USUARIO)",
            );
        }
        if cargo == Some(Role::Usuario) {
            checks
                .required("ra", &self.ra, "RA é obrigatório para alunos")
                .required("curso", &self.curso, "Curso é obrigatório para alunos")
                .required("periodo", &self.periodo, "Período é obrigatório para alunos");
        }
        if present(&self.ra).is_some() {
            checks.min_chars("ra", &self.ra, 5, "RA deve ter pelo menos 5 caracteres");
        }
        checks.finish()?;

        let owned = |value: &Option<String>| present(value).map(str::to_string);
        Ok(NewUser {
            nome: owned(&self.nome).unwrap_or_default(),
            email: owned(&self.email).unwrap_or_default(),
            telefone: owned(&self.telefone).unwrap_or_default(),
            cargo: cargo.unwrap_or(Role::Usuario),
            ra: owned(&self.ra),
            senha: self.senha.unwrap_or_default(),
            curso: owned(&self.curso),
            periodo: owned(&self.periodo),
            turma: owned(&self.turma),
            status: owned(&self.status).unwrap_or_else(|| "ativo".to_string()),
            metadata: None,
        })
    }
}
