//! The signed-in user's live view of their support requests.
//!
//! A [`UserSession`] keeps a replica of the user's notifications fed by a
//! store subscription and derives the chat transcript, the routing of chat
//! input and the audit view from it. Changes queue up until [`UserSession::sync`]
//! applies them, so the session itself needs no locking.

use aduana_review_functions::{AuditService, ExpertTurn, CHAT_FALLBACK_REPLY};
use aduana_review_realtime::{DatabaseChanges, DocumentStore, Payload, Subscription};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::SessionCookie;
use crate::desk::SupportDesk;
use crate::error::{Error, Result};
use crate::history::ReportHistory;
use crate::models::{
    AppNotification, AuditSnapshot, ChatMessage, ChatRole, NotificationStatus, User, NOTIFICATIONS,
};

pub const GREETING: &str = "Hola Soy Space Bot ¿en que puedo ayudarte el dia de hoy?";

/// Text sent by the "contact an administrator" button.
pub const DIRECT_HELP_MESSAGE: &str = "Solicitud de ayuda directa.";

/// Where chat input currently goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A support request is in progress; input goes to the administrator
    Admin { notification_id: String },
    /// Input goes to the AI assistant
    Assistant,
}

/// Outcome of [`UserSession::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    ToAdmin { notification_id: String, message: ChatMessage },
    Answered { reply: String },
}

struct Tracked {
    notification: AppNotification,
    // commit that produced this state; `None` for records loaded at start
    commit_sequence: Option<u64>,
}

pub struct UserSession {
    user: User,
    desk: SupportDesk,
    functions: Arc<dyn AuditService>,
    subscriptions: Vec<Subscription>,
    changes: mpsc::UnboundedReceiver<Payload>,
    replica: HashMap<String, Tracked>,
    messages: Vec<ChatMessage>,
    // highest admin message sequence shown, per request
    shown_admin: HashMap<String, u64>,
    announced: HashSet<String>,
    audit: Option<AuditSnapshot>,
}

impl UserSession {
    /// Subscribe to the user's requests and load their current state.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        user: User,
        functions: Arc<dyn AuditService>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = store
            .channel(&format!("support:{}", user.email))
            .on(
                DatabaseChanges::new(NOTIFICATIONS).eq("userEmail", user.email.as_str()),
                move |payload| {
                    // the receiver is gone once the session ends
                    let _ = tx.send(payload);
                },
            )
            .subscribe()?;

        let desk = SupportDesk::new(store.clone(), Arc::new(ReportHistory::new(store)));
        let mut session = Self {
            user,
            desk,
            functions,
            subscriptions,
            changes: rx,
            replica: HashMap::new(),
            messages: vec![ChatMessage::new(ChatRole::Model, GREETING)],
            shown_admin: HashMap::new(),
            announced: HashSet::new(),
            audit: None,
        };

        for notification in session.desk.for_user(&session.user.email).await? {
            let id = notification.id.clone();
            session.replica.insert(
                id,
                Tracked {
                    notification: notification.clone(),
                    commit_sequence: None,
                },
            );
            if notification.status == NotificationStatus::InProgress {
                session.absorb_active(&notification);
            }
        }
        info!(user = %session.user.email, requests = session.replica.len(), "session started");
        Ok(session)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// The local chat transcript.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The audit result currently on screen.
    pub fn audit(&self) -> Option<&AuditSnapshot> {
        self.audit.as_ref()
    }

    pub fn set_audit(&mut self, snapshot: Option<AuditSnapshot>) {
        self.audit = snapshot;
    }

    /// Requests of the user as last seen, in creation order.
    pub fn notifications(&self) -> Vec<&AppNotification> {
        let mut all: Vec<&AppNotification> =
            self.replica.values().map(|t| &t.notification).collect();
        all.sort_by_key(|n| n.timestamp);
        all
    }

    pub fn route(&self) -> Route {
        self.replica
            .values()
            .map(|t| &t.notification)
            .find(|n| n.status == NotificationStatus::InProgress)
            .map(|n| Route::Admin {
                notification_id: n.id.clone(),
            })
            .unwrap_or(Route::Assistant)
    }

    /// Apply queued changes. Returns how many changes were applied.
    pub fn sync(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Ok(payload) = self.changes.try_recv() {
            if self.apply(payload)? {
                applied += 1;
            }
        }
        if applied > 0 {
            debug!(user = %self.user.email, applied, "session synchronized");
        }
        Ok(applied)
    }

    /// Send chat input to the administrator or to the assistant.
    ///
    /// When the assistant call fails the fallback reply is shown and the
    /// error is returned.
    pub async fn send(&mut self, text: &str) -> Result<Delivery> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("El mensaje no puede estar vacío"));
        }
        self.sync()?;

        let history: Vec<ExpertTurn> = self
            .messages
            .iter()
            .map(|m| match m.role {
                ChatRole::User => ExpertTurn::user(&m.text),
                ChatRole::Model | ChatRole::Admin => ExpertTurn::model(&m.text),
            })
            .collect();

        match self.route() {
            Route::Admin { notification_id } => {
                // shown only once the request has it
                let message = self.desk.send_user_message(&self.user.email, text).await?;
                self.messages.push(message.clone());
                Ok(Delivery::ToAdmin {
                    notification_id,
                    message,
                })
            }
            Route::Assistant => {
                self.messages.push(ChatMessage::new(ChatRole::User, text));
                self.ask_assistant(&history, text).await
            }
        }
    }

    async fn ask_assistant(&mut self, history: &[ExpertTurn], text: &str) -> Result<Delivery> {
        match self.functions.chat_with_expert(history, text).await {
            Ok(reply) => {
                let reply = match reply.trim() {
                    "" => CHAT_FALLBACK_REPLY.to_string(),
                    _ => reply,
                };
                self.messages.push(ChatMessage::new(ChatRole::Model, &reply));
                Ok(Delivery::Answered { reply })
            }
            Err(err) => {
                warn!(user = %self.user.email, error = %err, "assistant unavailable");
                self.messages
                    .push(ChatMessage::new(ChatRole::Model, CHAT_FALLBACK_REPLY));
                Err(err.into())
            }
        }
    }

    /// Ask for a human. The request carries the audit on screen and the
    /// assistant pauses until an administrator resolves it.
    pub async fn request_support(&mut self, message: &str) -> Result<AppNotification> {
        let notification = self
            .desk
            .create_request(&self.user, message, self.audit.clone())
            .await?;
        let notice = format!(
            "🤖 Hola {}, he procesado tu solicitud de ayuda humana. Mientras un administrador se conecta al canal de soporte, he pausado mis respuestas automáticas para que puedas hablar directamente con el equipo técnico. Por favor, espera un momento...",
            self.user.first_name()
        );
        self.messages.push(ChatMessage::new(ChatRole::Model, &notice));
        Ok(notification)
    }

    /// End the session. Every subscription is released; the returned
    /// `Set-Cookie` value clears the session cookie.
    pub fn logout(mut self) -> String {
        let released = self.subscriptions.len();
        self.subscriptions.clear();
        info!(user = %self.user.email, released, "session closed");
        SessionCookie::clear()
    }

    fn apply(&mut self, payload: Payload) -> Result<bool> {
        let notification: AppNotification = match payload.decode_record() {
            Some(decoded) => decoded?,
            None => {
                self.replica.remove(&payload.key);
                return Ok(true);
            }
        };

        let previous = self.replica.get(&payload.key);
        if let Some(tracked) = previous {
            let stale = tracked
                .commit_sequence
                .is_some_and(|seen| payload.commit_sequence <= seen)
                || rank(notification.status) < rank(tracked.notification.status);
            if stale {
                debug!(
                    notification = %payload.key,
                    sequence = payload.commit_sequence,
                    "stale change ignored"
                );
                return Ok(false);
            }
        }
        let was = previous.map(|t| t.notification.status);

        match notification.status {
            NotificationStatus::InProgress => self.absorb_active(&notification),
            NotificationStatus::Resolved
                if was.is_some_and(|s| s != NotificationStatus::Resolved) =>
            {
                // messages sent right before the close still reach the user
                self.show_admin_messages(&notification);
                if self.announced.insert(notification.id.clone()) {
                    self.messages.push(ChatMessage::new(
                        ChatRole::Model,
                        &format!(
                            "✅ Hola {}, el administrador ha finalizado la sesión de soporte técnico. La IA de SpaceAduanas vuelve a estar disponible para tus consultas.",
                            self.user.first_name()
                        ),
                    ));
                    info!(notification = %notification.id, "support session ended");
                }
            }
            _ => {}
        }

        self.replica.insert(
            payload.key,
            Tracked {
                notification,
                commit_sequence: Some(payload.commit_sequence),
            },
        );
        Ok(true)
    }

    // Admin messages and the administrator's audit edits of the active request.
    fn absorb_active(&mut self, notification: &AppNotification) {
        self.show_admin_messages(notification);
        if let Some(snapshot) = &notification.audit_data {
            if self.audit.as_ref() != Some(snapshot) {
                debug!(
                    notification = %notification.id,
                    client_override = snapshot.client_override,
                    "audit view replaced"
                );
                self.audit = Some(snapshot.clone());
            }
        }
    }

    fn show_admin_messages(&mut self, notification: &AppNotification) {
        let shown = self.shown_admin.entry(notification.id.clone()).or_insert(0);
        for (index, message) in notification.chat_history.iter().enumerate() {
            // records written before sequences existed use their position
            let sequence = if message.sequence > 0 {
                message.sequence
            } else {
                index as u64 + 1
            };
            if message.role == ChatRole::Admin && sequence > *shown {
                self.messages.push(message.clone());
                *shown = sequence;
            }
        }
    }
}

fn rank(status: NotificationStatus) -> u8 {
    match status {
        NotificationStatus::Pending => 0,
        NotificationStatus::InProgress => 1,
        NotificationStatus::Resolved => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aduana_review_functions::{AnalysisResult, DocumentBundle, FunctionsError};
    use crate::models::USERS;
    use aduana_review_realtime::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Assistant double recording what it was asked.
    #[derive(Default)]
    struct ScriptedAssistant {
        reply: Option<String>,
        asked: Mutex<Vec<(usize, String)>>,
    }

    #[async_trait]
    impl AuditService for ScriptedAssistant {
        async fn run_audit(
            &self,
            _bundle: &DocumentBundle,
        ) -> aduana_review_functions::Result<AnalysisResult> {
            Err(FunctionsError::InvalidInput("not used".into()))
        }

        async fn chat_with_expert(
            &self,
            history: &[ExpertTurn],
            message: &str,
        ) -> aduana_review_functions::Result<String> {
            self.asked
                .lock()
                .unwrap()
                .push((history.len(), message.to_string()));
            self.reply.clone().ok_or(FunctionsError::ServiceUnavailable {
                attempts: 3,
                last_error: "timeout".into(),
            })
        }
    }

    fn ana() -> User {
        User {
            name: "Ana López".to_string(),
            email: "ana@x.com".to_string(),
            password: "1234".to_string(),
            is_super_user: false,
        }
    }

    fn admin() -> User {
        User {
            name: "Marco".to_string(),
            email: "marco@spaceaduanas.com".to_string(),
            password: "3569".to_string(),
            is_super_user: true,
        }
    }

    async fn registered_store() -> Arc<dyn DocumentStore> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        for user in [ana(), admin()] {
            store
                .set(USERS, &user.email, serde_json::to_value(&user).unwrap())
                .await
                .unwrap();
        }
        store
    }

    async fn start(reply: Option<&str>) -> (Arc<dyn DocumentStore>, SupportDesk, UserSession) {
        let store = registered_store().await;
        let desk = SupportDesk::new(store.clone(), Arc::new(ReportHistory::new(store.clone())));
        let assistant = Arc::new(ScriptedAssistant {
            reply: reply.map(str::to_string),
            ..Default::default()
        });
        let session = UserSession::start(store.clone(), ana(), assistant).await.unwrap();
        (store, desk, session)
    }

    fn count(session: &UserSession, needle: &str) -> usize {
        session.messages().iter().filter(|m| m.text.contains(needle)).count()
    }

    #[tokio::test]
    async fn greets_and_answers_with_assistant() {
        let (_store, _desk, mut session) = start(Some("Claro, revisa el COVE.")).await;
        assert_eq!(session.messages()[0].text, GREETING);
        assert_eq!(session.route(), Route::Assistant);

        let delivery = session.send("¿qué es un COVE?").await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Answered {
                reply: "Claro, revisa el COVE.".to_string()
            }
        );
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn assistant_failure_shows_fallback() {
        let (_store, _desk, mut session) = start(None).await;
        let err = session.send("hola").await.unwrap_err();
        assert!(matches!(err, Error::ServiceCommunication(_)));
        assert_eq!(session.messages().last().unwrap().text, CHAT_FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn support_session_round_trip() {
        let (_store, desk, mut session) = start(Some("IA")).await;
        let admin = admin();

        let n = session.request_support(DIRECT_HELP_MESSAGE).await.unwrap();
        assert_eq!(count(&session, "he pausado mis respuestas"), 1);
        session.sync().unwrap();
        assert_eq!(session.route(), Route::Assistant);

        desk.claim(&admin, &n.id).await.unwrap();
        desk.send_admin_message(&admin, &n.id, "¿en qué te ayudo?").await.unwrap();
        session.sync().unwrap();
        assert_eq!(
            session.route(),
            Route::Admin {
                notification_id: n.id.clone()
            }
        );
        assert_eq!(count(&session, "¿en qué te ayudo?"), 1);

        let delivery = session.send("tengo un error en la partida 3").await.unwrap();
        assert!(matches!(delivery, Delivery::ToAdmin { .. }));
        assert_eq!(desk.get(&n.id).await.unwrap().unwrap().chat_history.len(), 3);

        // same text again is a new message, not a duplicate
        desk.send_admin_message(&admin, &n.id, "¿en qué te ayudo?").await.unwrap();
        desk.resolve(&admin, &n.id).await.unwrap();
        session.sync().unwrap();
        session.sync().unwrap();
        assert_eq!(count(&session, "¿en qué te ayudo?"), 2);
        assert_eq!(count(&session, "ha finalizado la sesión"), 1);
        assert!(session
            .messages()
            .iter()
            .any(|m| m.text.starts_with("✅ Hola Ana,")));
        assert_eq!(session.route(), Route::Assistant);
    }

    #[tokio::test]
    async fn adopts_administrator_edits() {
        let (_store, desk, mut session) = start(Some("IA")).await;
        let admin = admin();
        let analysis = AnalysisResult {
            pedimento_number: "24 47 0001".to_string(),
            validations: vec![aduana_review_functions::Finding::new(
                "FRACCION",
                aduana_review_functions::FindingStatus::Error,
            )],
            is_conforme: false,
            recommendations: None,
            total_savings: None,
            total_risk: None,
        };
        session.set_audit(Some(AuditSnapshot::from_analysis(analysis, None)));
        let n = session.request_support("revisa").await.unwrap();
        desk.claim(&admin, &n.id).await.unwrap();
        desk.toggle_client_override(&admin, &n.id).await.unwrap();

        session.sync().unwrap();
        let view = session.audit().unwrap();
        assert!(view.client_override);
        assert!(view.is_conforme);
    }

    #[tokio::test]
    async fn resolved_at_start_is_not_announced() {
        let store = registered_store().await;
        let desk = SupportDesk::new(store.clone(), Arc::new(ReportHistory::new(store.clone())));
        let n = desk.create_request(&ana(), "ayuda", None).await.unwrap();
        desk.claim(&admin(), &n.id).await.unwrap();
        desk.resolve(&admin(), &n.id).await.unwrap();

        let mut session = UserSession::start(store, ana(), Arc::new(ScriptedAssistant::default()))
            .await
            .unwrap();
        session.sync().unwrap();
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.notifications().len(), 1);
    }

    #[tokio::test]
    async fn other_users_do_not_leak_in() {
        let (_store, desk, mut session) = start(Some("IA")).await;
        let beto = User {
            name: "Beto".to_string(),
            email: "beto@x.com".to_string(),
            password: "1111".to_string(),
            is_super_user: false,
        };
        let n = desk.create_request(&beto, "ayuda", None).await.unwrap();
        desk.claim(&admin(), &n.id).await.unwrap();
        assert_eq!(session.sync().unwrap(), 0);
        assert_eq!(session.route(), Route::Assistant);
    }

    #[tokio::test]
    async fn undelivered_message_stays_off_the_transcript() {
        let (_store, desk, mut session) = start(Some("IA")).await;
        let n = session.request_support("ayuda").await.unwrap();
        desk.claim(&admin(), &n.id).await.unwrap();
        session.sync().unwrap();

        // the feed stops, so the close below is never seen
        session.subscriptions.clear();
        desk.resolve(&admin(), &n.id).await.unwrap();
        let before = session.messages().len();
        let err = session.send("¿sigues ahí?").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveSupportSession { .. }));
        assert_eq!(session.messages().len(), before);
        assert_eq!(count(&session, "¿sigues ahí?"), 0);
    }

    #[tokio::test]
    async fn older_changes_do_not_rewind_the_replica() {
        let store = registered_store().await;
        let desk = SupportDesk::new(store.clone(), Arc::new(ReportHistory::new(store.clone())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let _feed = store
            .channel("recorder")
            .on(DatabaseChanges::new(NOTIFICATIONS), move |payload| {
                recorder.lock().unwrap().push(payload)
            })
            .subscribe()
            .unwrap();

        let analysis = AnalysisResult {
            pedimento_number: "24 47 0001".to_string(),
            validations: vec![aduana_review_functions::Finding::new(
                "FRACCION",
                aduana_review_functions::FindingStatus::Error,
            )],
            is_conforme: false,
            recommendations: None,
            total_savings: None,
            total_risk: None,
        };
        let snapshot = AuditSnapshot::from_analysis(analysis, None);
        let n = desk.create_request(&ana(), "revisa", Some(snapshot)).await.unwrap();
        desk.claim(&admin(), &n.id).await.unwrap();

        let assistant = Arc::new(ScriptedAssistant::default());
        let mut session = UserSession::start(store.clone(), ana(), assistant)
            .await
            .unwrap();
        let created = seen.lock().unwrap()[0].clone();
        assert_eq!(created.record.as_ref().unwrap()["status"], "pending");

        // loaded at start, so only the status order applies
        assert!(!session.apply(created).unwrap());
        assert_eq!(
            session.notifications()[0].status,
            NotificationStatus::InProgress
        );

        desk.toggle_client_override(&admin(), &n.id).await.unwrap();
        assert_eq!(session.sync().unwrap(), 1);
        assert!(session.audit().unwrap().client_override);

        let payloads = seen.lock().unwrap().clone();
        assert_eq!(payloads.len(), 3);
        assert!(payloads[1].commit_sequence < payloads[2].commit_sequence);

        // same status, older commit
        assert!(!session.apply(payloads[1].clone()).unwrap());
        let view = session.audit().unwrap();
        assert!(view.client_override);
        assert!(view.is_conforme);
        assert_eq!(
            session.route(),
            Route::Admin {
                notification_id: n.id.clone()
            }
        );
    }

    #[tokio::test]
    async fn logout_releases_subscriptions() {
        let (store, _desk, session) = start(Some("IA")).await;
        assert_eq!(store.subscriber_count(), 1);
        let header = session.logout();
        assert!(header.contains("Max-Age=0"));
        assert_eq!(store.subscriber_count(), 0);
    }
}
