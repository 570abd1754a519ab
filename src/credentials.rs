use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;

use crate::docstore::DocumentStore;
use crate::err::Error;
use crate::models::{Role, UserProfile, UserRecord, USERS};
use crate::store::Operator;

/// Argon2id cost parameters used for new hashes. Verification always reads
/// the parameters back out of the stored PHC string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            lanes: 1,
        }
    }
}

impl PasswordPolicy {
    fn hasher(&self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.lanes, None).map_err(
            |err| Error::Configuration {
                message: format!("invalid argon2 parameters: {}", err),
            },
        )?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash_blocking(&self, password: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// Hashes on the blocking pool so a slow hash only delays its own request.
    pub async fn hash(&self, password: String) -> Result<String, Error> {
        let policy = *self;
        tokio::task::spawn_blocking(move || policy.hash_blocking(&password)).await?
    }
}

pub fn verify_blocking(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            log::warn!("Stored password hash is not a PHC string: {}", err);
            false
        }
    }
}

pub async fn verify(hash: String, password: String) -> Result<bool, Error> {
    Ok(tokio::task::spawn_blocking(move || verify_blocking(&hash, &password)).await?)
}

pub async fn find_user_by_email(
    store: &DocumentStore,
    email: &str,
) -> Result<Option<UserRecord>, Error> {
    let found = store
        .collection(USERS)
        .filter("email", Operator::Eq, email)
        .limit(1)
        .get()
        .await?;
    match found.first() {
        Some(doc) => Ok(doc.decode()?),
        None => Ok(None),
    }
}

pub async fn find_user_by_id(store: &DocumentStore, id: &str) -> Result<Option<UserRecord>, Error> {
    Ok(store.collection(USERS).doc(id).get().await?.decode()?)
}

/// Checks an email/password pair. Unknown email and wrong password fail
/// with the same error after the same Argon2 work.
pub async fn authenticate(
    store: &DocumentStore,
    policy: &PasswordPolicy,
    email: &str,
    password: &str,
) -> Result<UserProfile, Error> {
    let user = match find_user_by_email(store, email).await? {
        Some(user) => user,
        None => {
            if let Err(err) = policy.hash(password.to_string()).await {
                log::warn!("Placeholder hash failed: {}", err);
            }
            log::debug!("Login attempt for unknown email");
            return Err(Error::invalid_credentials());
        }
    };
    if !verify(user.senha_hash.clone(), password.to_string()).await? {
        log::debug!("Password mismatch for user {}", user.id);
        return Err(Error::invalid_credentials());
    }
    Ok(UserProfile::from(&user))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateUser,
    ListUsers,
    ReviewSubmissions,
    ChangeSubmissionStatus,
    SubmitCertificate,
}

pub fn permits(role: Role, capability: Capability) -> bool {
    match role {
        Role::Administrador => !matches!(capability, Capability::SubmitCertificate),
        Role::Funcionario => matches!(
            capability,
            Capability::ListUsers | Capability::ReviewSubmissions
        ),
        Role::Usuario => matches!(capability, Capability::SubmitCertificate),
    }
}

pub fn authorize(role: Role, capability: Capability) -> Result<(), Error> {
    if permits(role, capability) {
        Ok(())
    } else {
        log::debug!("{} denied {:?}", role, capability);
        Err(Error::forbidden())
    }
}

#[cfg(test)]
pub(crate) fn fast_policy() -> PasswordPolicy {
    PasswordPolicy {
        memory_kib: 1024,
        iterations: 1,
        lanes: 1,
    }
}
