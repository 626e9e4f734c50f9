//! User directory and session restoration

mod session;

use aduana_review_realtime::DocumentStore;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReviewOptions;
use crate::error::{Error, Result};
use crate::models::{fields, User, USERS};

pub use session::*;

/// Result of restoring a session from a cookie.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRestore {
    /// The cookie names an existing user
    Restored(User),
    /// No session cookie was sent
    Anonymous,
    /// The cookie names a user that no longer exists; send `clear_header`
    Stale { clear_header: String },
}

/// Users collection with the administrator policies on top
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    options: ReviewOptions,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, options: ReviewOptions) -> Self {
        Self { store, options }
    }

    pub async fn get(&self, email: &str) -> Result<Option<User>> {
        match self.store.get(USERS, email.trim()).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// All users in registration order
    pub async fn list(&self) -> Result<Vec<User>> {
        self.store
            .list(USERS)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(Error::from))
            .collect()
    }

    /// Check credentials. Unknown users and wrong passwords fail alike.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        match self.get(email).await? {
            Some(user) if user.password == password => {
                info!(email = %user.email, "user signed in");
                Ok(user)
            }
            _ => {
                warn!(email = %email.trim(), "rejected sign in");
                Err(Error::InvalidCredentials)
            }
        }
    }

    /// Issue the cookie for a signed-in user.
    pub fn session_cookie(&self, user: &User) -> SessionCookie {
        SessionCookie::new(&user.email, self.options.session_max_age)
    }

    /// Register a reviewer with a random four digit password.
    pub async fn add_user(&self, admin: &User, name: &str, email: &str) -> Result<User> {
        require_admin(self.store.as_ref(), admin).await?;
        let name = name.trim();
        let email = email.trim();
        if !email
            .to_ascii_lowercase()
            .ends_with(&self.options.email_domain.to_ascii_lowercase())
        {
            return Err(Error::validation(format!(
                "Solo se permiten correos con dominio {}",
                self.options.email_domain
            )));
        }
        if name.chars().count() < 3 {
            return Err(Error::validation("El nombre debe tener al menos 3 caracteres"));
        }
        if self.get(email).await?.is_some() {
            return Err(Error::UserExists(email.to_string()));
        }

        let password = rand::thread_rng().gen_range(1000..=9999).to_string();
        let user = User {
            name: name.to_string(),
            email: email.to_string(),
            password,
            is_super_user: false,
        };
        self.store
            .set(USERS, email, serde_json::to_value(&user)?)
            .await?;
        info!(email = %email, by = %admin.email, "user registered");
        Ok(user)
    }

    pub async fn delete_user(&self, admin: &User, email: &str) -> Result<()> {
        require_admin(self.store.as_ref(), admin).await?;
        let email = email.trim();
        self.protect(email)?;
        if self.get(email).await?.is_none() {
            return Err(Error::UserNotFound(email.to_string()));
        }
        self.store.delete(USERS, email).await?;
        info!(email = %email, by = %admin.email, "user deleted");
        Ok(())
    }

    /// Grant or revoke administrator rights.
    pub async fn toggle_admin(&self, admin: &User, email: &str) -> Result<User> {
        require_admin(self.store.as_ref(), admin).await?;
        let email = email.trim();
        self.protect(email)?;
        let user = self
            .get(email)
            .await?
            .ok_or_else(|| Error::UserNotFound(email.to_string()))?;
        let doc = self
            .store
            .update(USERS, email, fields(json!({ "isSuperUser": !user.is_super_user })))
            .await?;
        let updated: User = doc.decode()?;
        info!(email = %email, admin = updated.is_super_user, "role changed");
        Ok(updated)
    }

    /// Create the configured seed administrator unless it exists.
    pub async fn ensure_seed_admin(&self) -> Result<User> {
        let seed = &self.options.seed_admin;
        if let Some(existing) = self.get(&seed.email).await? {
            return Ok(existing);
        }
        let user = User {
            name: seed.name.clone(),
            email: seed.email.clone(),
            password: seed.password.clone(),
            is_super_user: true,
        };
        self.store
            .set(USERS, &user.email, serde_json::to_value(&user)?)
            .await?;
        info!(email = %user.email, "seed administrator created");
        Ok(user)
    }

    /// Restore the user named by a `Cookie` header.
    pub async fn restore_session(&self, cookie_header: &str) -> Result<SessionRestore> {
        let email = match SessionCookie::parse(cookie_header) {
            Some(email) => email,
            None => return Ok(SessionRestore::Anonymous),
        };
        match self.get(&email).await? {
            Some(user) => {
                debug!(email = %email, "session restored");
                Ok(SessionRestore::Restored(user))
            }
            None => {
                warn!(email = %email, "session cookie names an unknown user");
                Ok(SessionRestore::Stale {
                    clear_header: SessionCookie::clear(),
                })
            }
        }
    }

    fn protect(&self, email: &str) -> Result<()> {
        if email.eq_ignore_ascii_case(&self.options.seed_admin.email) {
            return Err(Error::ProtectedAccount(email.to_string()));
        }
        Ok(())
    }
}

/// Check the stored record of `actor`, not the copy the caller holds:
/// a demoted or unregistered user is refused.
pub(crate) async fn require_admin(store: &dyn DocumentStore, actor: &User) -> Result<()> {
    let stored: Option<User> = match store.get(USERS, actor.email.trim()).await? {
        Some(doc) => Some(doc.decode()?),
        None => None,
    };
    match stored {
        Some(user) if user.is_super_user => Ok(()),
        Some(_) => {
            warn!(email = %actor.email, "administrator action refused");
            Err(Error::permission(format!("{} is not an administrator", actor.email)))
        }
        None => {
            warn!(email = %actor.email, "administrator action by unknown user");
            Err(Error::permission(format!("{} is not a registered user", actor.email)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aduana_review_realtime::MemoryStore;

    async fn directory() -> (UserDirectory, User) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let directory = UserDirectory::new(store, ReviewOptions::default());
        let admin = directory.ensure_seed_admin().await.unwrap();
        (directory, admin)
    }

    #[tokio::test]
    async fn seed_admin_is_created_once() {
        let (directory, admin) = directory().await;
        assert!(admin.is_super_user);
        let again = directory.ensure_seed_admin().await.unwrap();
        assert_eq!(again, admin);
        assert_eq!(directory.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_user_policies() {
        let (directory, admin) = directory().await;

        let user = directory
            .add_user(&admin, "  Ana López ", "ana@spaceaduanas.com")
            .await
            .unwrap();
        assert_eq!(user.name, "Ana López");
        assert!(!user.is_super_user);
        let pin: u32 = user.password.parse().unwrap();
        assert!((1000..=9999).contains(&pin));

        let duplicate = directory.add_user(&admin, "Ana", "ana@spaceaduanas.com").await;
        assert!(matches!(duplicate, Err(Error::UserExists(_))));

        let foreign = directory.add_user(&admin, "Beto", "beto@gmail.com").await;
        assert!(matches!(foreign, Err(Error::ValidationInput(_))));

        let short = directory.add_user(&admin, " Al ", "al@spaceaduanas.com").await;
        assert!(matches!(short, Err(Error::ValidationInput(_))));

        let denied = directory.add_user(&user, "Carla", "carla@spaceaduanas.com").await;
        assert!(matches!(denied, Err(Error::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn login_does_not_reveal_accounts() {
        let (directory, admin) = directory().await;
        assert!(directory.login(&admin.email, &admin.password).await.is_ok());
        assert!(matches!(
            directory.login(&admin.email, "0000").await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            directory.login("nadie@spaceaduanas.com", "1234").await,
            Err(Error::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn seed_admin_is_protected() {
        let (directory, admin) = directory().await;
        assert!(matches!(
            directory.delete_user(&admin, &admin.email).await,
            Err(Error::ProtectedAccount(_))
        ));
        assert!(matches!(
            directory.toggle_admin(&admin, &admin.email).await,
            Err(Error::ProtectedAccount(_))
        ));
    }

    #[tokio::test]
    async fn toggle_and_delete() {
        let (directory, admin) = directory().await;
        let user = directory
            .add_user(&admin, "Beto", "beto@spaceaduanas.com")
            .await
            .unwrap();
        let promoted = directory.toggle_admin(&admin, &user.email).await.unwrap();
        assert!(promoted.is_super_user);
        let demoted = directory.toggle_admin(&admin, &user.email).await.unwrap();
        assert!(!demoted.is_super_user);

        directory.delete_user(&admin, &user.email).await.unwrap();
        assert!(directory.get(&user.email).await.unwrap().is_none());
        assert!(matches!(
            directory.delete_user(&admin, &user.email).await,
            Err(Error::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn authority_comes_from_the_stored_record() {
        let (directory, admin) = directory().await;
        let lucia = directory
            .add_user(&admin, "Lucia", "lucia@spaceaduanas.com")
            .await
            .unwrap();
        let promoted = directory.toggle_admin(&admin, &lucia.email).await.unwrap();
        let held = promoted.clone();
        directory
            .add_user(&held, "Dario", "dario@spaceaduanas.com")
            .await
            .unwrap();

        directory.toggle_admin(&admin, &lucia.email).await.unwrap();
        assert!(held.is_super_user);
        assert!(matches!(
            directory.add_user(&held, "Eva", "eva@spaceaduanas.com").await,
            Err(Error::PermissionDenied(_))
        ));

        let forged = User {
            name: "Nadie".to_string(),
            email: "nobody@spaceaduanas.com".to_string(),
            password: "0000".to_string(),
            is_super_user: true,
        };
        assert!(matches!(
            directory.delete_user(&forged, "dario@spaceaduanas.com").await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(directory.get("dario@spaceaduanas.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn restore_session_from_cookie() {
        let (directory, admin) = directory().await;
        let cookie = directory.session_cookie(&admin);
        let header = format!("{}={}", SESSION_COOKIE_NAME, cookie.email);

        assert_eq!(
            directory.restore_session(&header).await.unwrap(),
            SessionRestore::Restored(admin.clone())
        );
        assert_eq!(
            directory.restore_session("theme=dark").await.unwrap(),
            SessionRestore::Anonymous
        );
        match directory
            .restore_session("space_session_user=borrado@spaceaduanas.com")
            .await
            .unwrap()
        {
            SessionRestore::Stale { clear_header } => assert!(clear_header.contains("Max-Age=0")),
            other => panic!("unexpected restore result: {:?}", other),
        }
    }
}
