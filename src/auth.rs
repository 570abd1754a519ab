use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::authenticate;
use crate::err::{Error, Reply};
use crate::models::{Role, UserProfile};
use crate::session::{clear_session_cookie, session_cookie};
use crate::users::{register, NewUser};
use crate::validation::{json_body, present, Checks};
use crate::{created, AppState, Payload};

pub async fn login_user(
    payload: Result<Json<LoginUser>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<LoggedInUser> {
    let login = json_body(payload)?;
    let mut checks = Checks::new();
    checks
        .email("email", &login.email)
        .required("senha", &login.senha, "Senha é obrigatória");
    checks.finish()?;

    let email = present(&login.email).unwrap_or_default();
    let password = login.senha.as_deref().unwrap_or_default();
    let user = authenticate(&state.store, &state.passwords, email, password).await?;
    let token = state.tokens.issue_token(&user.id)?;
    log::info!("User {} logged in", user.id);

    Ok(Reply::ok(LoggedInUser {
        message: "Login realizado com sucesso",
        user,
        token: token.clone(),
    })
    .with_cookie(session_cookie(&token, state.secure_cookies)))
}

pub async fn register_student(
    payload: Result<Json<CreateStudent>, JsonRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<CreatedStudent> {
    let student = json_body(payload)?.validate()?;
    let profile = register(&state, student).await?;
    created(CreatedStudent {
        message: "Conta criada com sucesso",
        data: profile,
    })
}

/// Drops the session cookie. The token itself stays valid until it expires.
pub async fn logout(Extension(state): Extension<AppState>) -> Payload<LoggedOut> {
    Ok(Reply::ok(LoggedOut {
        message: "Sessão encerrada",
    })
    .with_cookie(clear_session_cookie(state.secure_cookies)))
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedInUser {
    message: &'static str,
    user: UserProfile,
    token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStudent {
    message: &'static str,
    data: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    message: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginUser {
    pub email: Option<String>,
    pub senha: Option<String>,
}

/// Self-service signup. Always creates a student; the role is not taken
/// from the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateStudent {
    pub nome: Option<String>,
    pub email: Option<String>,
    pub ra: Option<String>,
    pub telefone: Option<String>,
    pub senha: Option<String>,
    pub confirmar_senha: Option<String>,
    pub curso: Option<String>,
    pub periodo: Option<String>,
    pub turma: Option<String>,
    pub metadata: Option<Value>,
}

impl CreateStudent {
    pub fn validate(self) -> Result<NewUser, Error> {
        let mut checks = Checks::new();
        checks
            .min_chars("nome", &self.nome, 2, "Nome deve ter pelo menos 2 caracteres")
            .email("email", &self.email)
            .min_chars("ra", &self.ra, 5, "RA deve ter pelo menos 5 caracteres")
            .min_chars("telefone", &self.telefone, 10, "Telefone deve ter pelo menos 10 dígitos")
            .check(
                self.senha.as_deref().unwrap_or("").chars().count() >= 6,
                "senha",
                "Senha deve ter pelo menos 6 caracteres",
            )
            .matches("confirmarSenha", &self.confirmar_senha, &self.senha);
        checks.finish()?;

        let owned = |value: &Option<String>| present(value).map(str::to_string);
        Ok(NewUser {
            nome: owned(&self.nome).unwrap_or_default(),
            email: owned(&self.email).unwrap_or_default(),
            telefone: owned(&self.telefone).unwrap_or_default(),
            cargo: Role::Usuario,
            ra: owned(&self.ra),
            senha: self.senha.unwrap_or_default(),
            curso: owned(&self.curso),
            periodo: owned(&self.periodo),
            turma: owned(&self.turma),
            status: "ativo".to_string(),
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_ignores_any_requested_role() {
        let request: CreateStudent = serde_json::from_value(serde_json::json!({
            "nome": "Ana Silva",
            "email": "ana@x.com",
            "ra": "RA001",
            "telefone": "11999999999",
            "senha": "Abc12345!",
            "cargo": "ADMINISTRADOR",
        }))
        .unwrap();
        assert_eq!(request.validate().unwrap().cargo, Role::Usuario);
    }

    #[test]
    fn signup_reports_every_bad_field() {
        let request: CreateStudent = serde_json::from_value(serde_json::json!({
            "nome": "A",
            "email": "not-an-email",
            "ra": "R1",
            "telefone": "123",
            "senha": "12345",
            "confirmarSenha": "54321",
        }))
        .unwrap();
        match request.validate() {
            Err(Error::Validation { details, .. }) => {
                let fields: Vec<&str> = details
                    .iter()
                    .filter_map(|d| d.split(':').next())
                    .collect();
                assert_eq!(
                    fields,
                    vec!["nome", "email", "ra", "telefone", "senha", "confirmarSenha"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
