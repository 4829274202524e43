//! Signed-in user state, persisted between runs.
//!
//! [`AuthContext`] is created once at startup from the files under the state
//! directory and passed to whatever needs the current user. Storage layout:
//!
//! ```text
//! <state_dir>/user.json   the signed-in user
//! <state_dir>/token       bearer token for profile edits
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api::{
    AuthResponse, BackendUser, CredentialsRequest, EditPersonalProfileRequest,
    EditUsernamePasswordRequest,
};
use crate::client::AuthBackend;
use crate::error::{HospitalError, Result};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    /// May edit scripted dialogues.
    pub can_modify_dialogue: bool,
    /// `true` = male, `false` = female.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl From<BackendUser> for User {
    fn from(u: BackendUser) -> Self {
        User {
            id: u.user_id,
            username: u.username,
            can_modify_dialogue: u.can_modify,
            gender: u.gender,
            birth_date: u.birth_date,
            age: u.age,
        }
    }
}

// -- Validation ------------------------------------------------------------

pub fn validate_username(username: &str) -> Result<()> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(HospitalError::Validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HospitalError::Validation(
            "username may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str, confirm: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HospitalError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(HospitalError::Validation("passwords do not match".into()));
    }
    Ok(())
}

pub fn validate_birth_date(birth_date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(birth_date, "%Y-%m-%d").map_err(|_| {
        HospitalError::Validation(format!("birth date must be YYYY-MM-DD, got '{birth_date}'"))
    })
}

// -- Storage ---------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthStore {
    dir: PathBuf,
}

impl AuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        AuthStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_path(&self) -> PathBuf {
        self.dir.join("user.json")
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join("token")
    }

    /// Read the stored user and token. Both must be present; a user file
    /// that does not parse is removed along with the token.
    pub fn load(&self) -> Result<Option<(User, String)>> {
        let (user_text, token) = match (
            fs::read_to_string(self.user_path()),
            fs::read_to_string(self.token_path()),
        ) {
            (Ok(u), Ok(t)) => (u, t.trim().to_string()),
            _ => return Ok(None),
        };
        if token.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<User>(&user_text) {
            Ok(user) => Ok(Some((user, token))),
            Err(e) => {
                warn!(error = %e, path = %self.user_path().display(), "stored user is corrupt, clearing");
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(user)
            .map_err(|e| HospitalError::Storage(e.to_string()))?;
        fs::write(self.user_path(), json)?;
        Ok(())
    }

    pub fn save(&self, user: &User, token: &str) -> Result<()> {
        self.save_user(user)?;
        fs::write(self.token_path(), token)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for path in [self.user_path(), self.token_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(HospitalError::Storage(format!(
                        "cannot remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Ok(())
    }
}

// -- Context ---------------------------------------------------------------

pub struct AuthContext<B: AuthBackend> {
    backend: B,
    store: AuthStore,
    session: Option<(User, String)>,
}

impl<B: AuthBackend> AuthContext<B> {
    /// Restore whatever user was signed in last time.
    pub fn open(backend: B, store: AuthStore) -> Result<Self> {
        let session = store.load()?;
        Ok(AuthContext {
            backend,
            store,
            session,
        })
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|(u, _)| u)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn token(&self) -> Result<&str> {
        self.session
            .as_ref()
            .map(|(_, t)| t.as_str())
            .ok_or_else(|| HospitalError::Auth("not signed in".into()))
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<&User> {
        let request = CredentialsRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        let resp = self.backend.login(&request).await?;
        self.accept(resp, "login failed")
    }

    /// Validates the form locally before contacting the server.
    pub async fn register(&mut self, username: &str, password: &str, confirm: &str) -> Result<&User> {
        let username = username.trim();
        validate_username(username)?;
        validate_password(password, confirm)?;
        let request = CredentialsRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp = self.backend.register(&request).await?;
        self.accept(resp, "registration failed")
    }

    fn accept(&mut self, resp: AuthResponse, fallback: &str) -> Result<&User> {
        let (user, token) = match (resp.success, resp.user, resp.token) {
            (true, Some(user), Some(token)) => (User::from(user), token),
            _ => {
                return Err(HospitalError::Auth(
                    resp.message.unwrap_or_else(|| fallback.to_string()),
                ))
            }
        };
        self.store.save(&user, &token)?;
        info!(user_id = user.id, username = %user.username, "signed in");
        let (user, _) = &*self.session.insert((user, token));
        Ok(user)
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some((user, _)) = self.session.take() {
            info!(username = %user.username, "signed out");
        }
        self.store.clear()
    }

    /// Replace the stored copy of the signed-in user.
    pub fn update_user_profile(&mut self, user: User) -> Result<()> {
        let Some((current, _)) = self.session.as_mut() else {
            return Err(HospitalError::Auth("not signed in".into()));
        };
        self.store.save_user(&user)?;
        *current = user;
        Ok(())
    }

    pub async fn edit_profile(&mut self, gender: bool, birth_date: &str) -> Result<&User> {
        validate_birth_date(birth_date)?;
        let token = self.token()?.to_string();
        let username = self.user().map(|u| u.username.clone()).unwrap_or_default();
        let request = EditPersonalProfileRequest {
            username,
            gender,
            birth_date: birth_date.to_string(),
        };
        let resp = self.backend.edit_profile(&token, &request).await?;
        let Some(updated) = resp.user.filter(|_| resp.success) else {
            return Err(HospitalError::Auth(
                resp.message.unwrap_or_else(|| "update failed".into()),
            ));
        };
        let mut user = User::from(updated);
        // The profile endpoint does not echo the permission flag.
        if let Some(current) = self.user() {
            user.can_modify_dialogue = current.can_modify_dialogue;
        }
        self.update_user_profile(user)?;
        self.user()
            .ok_or_else(|| HospitalError::Auth("not signed in".into()))
    }

    /// Change username and password. The old token is void afterwards, so
    /// the user is signed out on success.
    pub async fn edit_credentials(
        &mut self,
        new_username: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<()> {
        let new_username = new_username.trim();
        validate_username(new_username)?;
        validate_password(new_password, confirm)?;
        let token = self.token()?.to_string();
        let username = self.user().map(|u| u.username.clone()).unwrap_or_default();
        let request = EditUsernamePasswordRequest {
            username,
            new_username: new_username.to_string(),
            new_password: new_password.to_string(),
        };
        let resp = self.backend.edit_credentials(&token, &request).await?;
        if !resp.success {
            return Err(HospitalError::Auth(
                resp.message.unwrap_or_else(|| "update failed".into()),
            ));
        }
        self.logout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeBackend {
        reply: Mutex<Option<AuthResponse>>,
        seen_token: Mutex<Option<String>>,
        calls: Mutex<usize>,
    }

    impl FakeBackend {
        fn replying(resp: AuthResponse) -> Self {
            FakeBackend {
                reply: Mutex::new(Some(resp)),
                ..Default::default()
            }
        }

        fn next(&self, token: Option<&str>) -> Result<AuthResponse> {
            *self.calls.lock().unwrap() += 1;
            *self.seen_token.lock().unwrap() = token.map(str::to_string);
            self.reply
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| HospitalError::Http { status: 500, url: "fake".into() })
        }
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn login(&self, _: &CredentialsRequest) -> Result<AuthResponse> {
            self.next(None)
        }
        async fn register(&self, _: &CredentialsRequest) -> Result<AuthResponse> {
            self.next(None)
        }
        async fn edit_profile(&self, token: &str, _: &EditPersonalProfileRequest) -> Result<AuthResponse> {
            self.next(Some(token))
        }
        async fn edit_credentials(&self, token: &str, _: &EditUsernamePasswordRequest) -> Result<AuthResponse> {
            self.next(Some(token))
        }
    }

    fn backend_user() -> BackendUser {
        BackendUser {
            user_id: 42,
            username: "dr_chen".into(),
            can_modify: true,
            gender: None,
            birth_date: None,
            age: None,
        }
    }

    fn success() -> AuthResponse {
        AuthResponse {
            success: true,
            message: Some("ok".into()),
            user: Some(backend_user()),
            token: Some("tok-123".into()),
        }
    }

    fn context(dir: &TempDir, backend: FakeBackend) -> AuthContext<FakeBackend> {
        AuthContext::open(backend, AuthStore::new(dir.path())).unwrap()
    }

    #[rstest]
    #[case("ab", false)]
    #[case("abc", true)]
    #[case("dr_chen_01", true)]
    #[case("dr chen", false)]
    #[case("医生abc", false)]
    fn username_rules(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(validate_username(name).is_ok(), ok);
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("12345", "12345").is_err());
        assert!(validate_password("123456", "123457").is_err());
        assert!(validate_password("123456", "123456").is_ok());
    }

    #[test]
    fn birth_date_format() {
        assert!(validate_birth_date("1990-02-28").is_ok());
        assert!(validate_birth_date("1990-02-30").is_err());
        assert!(validate_birth_date("28/02/1990").is_err());
    }

    #[tokio::test]
    async fn login_persists_and_survives_restart() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::replying(success()));
        let user = auth.login("dr_chen", "secret1").await.unwrap();
        assert_eq!(user.id, 42);
        assert!(user.can_modify_dialogue);

        let restored = context(&dir, FakeBackend::default());
        assert!(restored.is_authenticated());
        assert_eq!(restored.user().unwrap().username, "dr_chen");
    }

    #[tokio::test]
    async fn login_without_token_fails() {
        let dir = TempDir::new().unwrap();
        let resp = AuthResponse { token: None, ..success() };
        let mut auth = context(&dir, FakeBackend::replying(resp));
        let err = auth.login("dr_chen", "secret1").await.unwrap_err();
        assert!(matches!(err, HospitalError::Auth(ref m) if m == "ok"));
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn rejected_login_uses_server_message() {
        let dir = TempDir::new().unwrap();
        let resp = AuthResponse {
            success: false,
            message: Some("wrong password".into()),
            user: None,
            token: None,
        };
        let mut auth = context(&dir, FakeBackend::replying(resp));
        let err = auth.login("dr_chen", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "authentication failed: wrong password");
    }

    #[tokio::test]
    async fn register_validates_before_network() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::replying(success()));
        let err = auth.register("dr_chen", "secret1", "secret2").await.unwrap_err();
        assert!(matches!(err, HospitalError::Validation(_)));
        assert_eq!(*auth.backend.calls.lock().unwrap(), 0);

        auth.register("dr_chen", "secret1", "secret1").await.unwrap();
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn logout_removes_files() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::replying(success()));
        auth.login("dr_chen", "secret1").await.unwrap();
        auth.logout().unwrap();
        assert!(!auth.is_authenticated());
        assert!(!dir.path().join("user.json").exists());
        assert!(!dir.path().join("token").exists());
        // Idempotent.
        auth.logout().unwrap();
    }

    #[test]
    fn corrupt_user_file_is_cleared() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("user.json"), "{not json").unwrap();
        fs::write(dir.path().join("token"), "tok").unwrap();
        let auth = context(&dir, FakeBackend::default());
        assert!(!auth.is_authenticated());
        assert!(!dir.path().join("token").exists());
    }

    #[test]
    fn user_without_token_is_not_restored() {
        let dir = TempDir::new().unwrap();
        let user = User::from(backend_user());
        AuthStore::new(dir.path()).save_user(&user).unwrap();
        assert!(!context(&dir, FakeBackend::default()).is_authenticated());
    }

    #[tokio::test]
    async fn edit_profile_sends_token_and_updates_user() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::replying(success()));
        auth.login("dr_chen", "secret1").await.unwrap();

        let updated = BackendUser {
            can_modify: false,
            gender: Some(true),
            birth_date: Some("1980-05-01".into()),
            age: Some(44),
            ..backend_user()
        };
        *auth.backend.reply.lock().unwrap() = Some(AuthResponse {
            user: Some(updated),
            token: None,
            ..success()
        });
        let user = auth.edit_profile(true, "1980-05-01").await.unwrap().clone();
        assert_eq!(user.age, Some(44));
        assert!(user.can_modify_dialogue);
        assert_eq!(auth.backend.seen_token.lock().unwrap().as_deref(), Some("tok-123"));

        let restored = context(&dir, FakeBackend::default());
        assert_eq!(restored.user().unwrap().birth_date.as_deref(), Some("1980-05-01"));
    }

    #[tokio::test]
    async fn edit_profile_requires_sign_in() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::default());
        let err = auth.edit_profile(false, "1990-01-01").await.unwrap_err();
        assert!(matches!(err, HospitalError::Auth(_)));
    }

    #[tokio::test]
    async fn edit_credentials_signs_out() {
        let dir = TempDir::new().unwrap();
        let mut auth = context(&dir, FakeBackend::replying(success()));
        auth.login("dr_chen", "secret1").await.unwrap();
        *auth.backend.reply.lock().unwrap() = Some(AuthResponse {
            user: None,
            token: None,
            ..success()
        });
        auth.edit_credentials("dr_chen_2", "newpass", "newpass").await.unwrap();
        assert!(!auth.is_authenticated());
    }
}
