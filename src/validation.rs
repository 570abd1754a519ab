use axum::extract::rejection::JsonRejection;
use axum::Json;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::err::Error;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap());

/// Unwraps a JSON body, turning a malformed one into a 400.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| Error::validation(vec![format!("body: {}", rejection)]))
}

pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Collects `campo: mensagem` failures and reports them together.
#[derive(Debug, Default)]
pub struct Checks {
    details: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, message: &str) -> &mut Self {
        self.details.push(format!("{}: {}", field, message));
        self
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.fail(field, message);
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &Option<String>, message: &str) -> &mut Self {
        self.check(present(value).is_some(), field, message)
    }

    pub fn min_chars(
        &mut self,
        field: &str,
        value: &Option<String>,
        min: usize,
        message: &str,
    ) -> &mut Self {
        let len = present(value).map(|v| v.chars().count()).unwrap_or(0);
        self.check(len >= min, field, message)
    }

    pub fn email(&mut self, field: &str, value: &Option<String>) -> &mut Self {
        let ok = present(value).map(|v| EMAIL.is_match(v)).unwrap_or(false);
        self.check(ok, field, "Email deve ter um formato válido")
    }

    /// Parses a `YYYY-MM-DD` date, recording a failure when it does not parse.
    pub fn date(&mut self, field: &str, value: &Option<String>) -> Option<NaiveDate> {
        let parsed = present(value).and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());
        if parsed.is_none() {
            self.fail(field, "Data deve estar no formato AAAA-MM-DD");
        }
        parsed
    }

    pub fn strong_password(&mut self, field: &str, value: &Option<String>) -> &mut Self {
        let password = value.as_deref().unwrap_or("");
        self.check(
            password.chars().count() >= 8,
            field,
            "Senha deve ter pelo menos 8 caracteres",
        )
        .check(
            password.chars().any(|c| c.is_lowercase()),
            field,
            "Senha deve conter pelo menos uma letra minúscula",
        )
        .check(
            password.chars().any(|c| c.is_uppercase()),
            field,
            "Senha deve conter pelo menos uma letra maiúscula",
        )
        .check(
            password.chars().any(|c| c.is_ascii_digit()),
            field,
            "Senha deve conter pelo menos um número",
        )
        .check(
            SPECIAL.is_match(password),
            field,
            "Senha deve conter pelo menos um caractere especial",
        )
    }

    pub fn matches(
        &mut self,
        field: &str,
        confirmation: &Option<String>,
        original: &Option<String>,
    ) -> &mut Self {
        match confirmation {
            Some(confirmation) => self.check(
                Some(confirmation) == original.as_ref(),
                field,
                "Senhas não coincidem",
            ),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), Error> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(std::mem::take(&mut self.details)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn details(checks: &mut Checks) -> Vec<String> {
        match checks.finish() {
            Err(Error::Validation { details, .. }) => details,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn email_format() {
        let mut checks = Checks::new();
        checks.email("email", &some("ana@x.com"));
        assert!(checks.is_empty());
        checks.email("email", &some("ana@x")).email("email", &None);
        assert_eq!(details(&mut checks).len(), 2);
    }

    #[test]
    fn min_chars_counts_characters_not_bytes() {
        let mut checks = Checks::new();
        checks.min_chars("nome", &some("Zé"), 2, "curto");
        assert!(checks.finish().is_ok());
        checks.min_chars("nome", &some("   "), 1, "vazio");
        assert_eq!(details(&mut checks), vec!["nome: vazio"]);
    }

    #[test]
    fn strong_password_reports_each_missing_class() {
        let mut checks = Checks::new();
        checks.strong_password("senha", &some("Abc12345!"));
        assert!(checks.finish().is_ok());

        checks.strong_password("senha", &some("abcdefgh"));
        let found = details(&mut checks);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|d| d.starts_with("senha: ")));
    }

    #[test]
    fn confirmation_only_checked_when_given() {
        let mut checks = Checks::new();
        checks.matches("confirmarSenha", &None, &some("a"));
        checks.matches("confirmarSenha", &some("a"), &some("a"));
        assert!(checks.finish().is_ok());
        checks.matches("confirmarSenha", &some("b"), &some("a"));
        assert_eq!(details(&mut checks), vec!["confirmarSenha: Senhas não coincidem"]);
    }

    #[test]
    fn dates_parse_iso_days_only() {
        let mut checks = Checks::new();
        assert!(checks.date("dataInicio", &some("2025-03-01")).is_some());
        assert!(checks.date("dataFim", &some("01/03/2025")).is_none());
        assert_eq!(details(&mut checks).len(), 1);
    }
}
