//! Support desk: the lifecycle of support requests and the administrator
//! corrections carried on them.

use aduana_review_realtime::{DatabaseFilter, DocumentStore, RealtimeError};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit;
use crate::auth::require_admin;
use crate::error::{Error, Result};
use crate::history::{CorrectionTarget, ReportHistory};
use crate::models::{
    fields, AppNotification, AuditSnapshot, ChatMessage, ChatRole, NotificationStatus,
    RevisionReport, User, NOTIFICATIONS,
};

/// Message used when a request is created without text.
pub const DEFAULT_SUPPORT_MESSAGE: &str = "El usuario requiere asistencia técnica inmediata.";

/// Admin message appended after a correction reaches the history.
pub const SYNC_CONFIRMATION: &str = "✅ He actualizado tu reporte con los ajustes solicitados. Los cambios ya se reflejan en el historial y en tu pantalla de auditoría.";

pub struct SupportDesk {
    store: Arc<dyn DocumentStore>,
    history: Arc<ReportHistory>,
}

impl SupportDesk {
    pub fn new(store: Arc<dyn DocumentStore>, history: Arc<ReportHistory>) -> Self {
        Self { store, history }
    }

    /// Open a `pending` request. The message also starts the chat history.
    pub async fn create_request(
        &self,
        user: &User,
        message: &str,
        audit_data: Option<AuditSnapshot>,
    ) -> Result<AppNotification> {
        let message = match message.trim() {
            "" => DEFAULT_SUPPORT_MESSAGE,
            text => text,
        };
        let notification = AppNotification {
            id: uuid::Uuid::new_v4().to_string(),
            user_email: user.email.clone(),
            user_name: user.name.clone(),
            timestamp: Utc::now(),
            message: message.to_string(),
            status: NotificationStatus::Pending,
            chat_history: vec![ChatMessage {
                sequence: 1,
                ..ChatMessage::new(ChatRole::User, message)
            }],
            audit_data,
        };
        self.store
            .set(
                NOTIFICATIONS,
                &notification.id,
                serde_json::to_value(&notification)?,
            )
            .await?;
        info!(
            notification = %notification.id,
            user = %notification.user_email,
            with_audit = notification.audit_data.is_some(),
            "support request created"
        );
        Ok(notification)
    }

    /// Take a `pending` request. A user has at most one request in progress.
    pub async fn claim(&self, admin: &User, id: &str) -> Result<AppNotification> {
        require_admin(self.store.as_ref(), admin).await?;
        let notification = self.load(id).await?;
        if !notification.status.can_transition_to(NotificationStatus::InProgress) {
            warn!(notification = %id, status = %notification.status, "claim rejected");
            return Err(Error::InvalidStateTransition {
                id: id.to_string(),
                from: notification.status,
                to: NotificationStatus::InProgress,
            });
        }
        let busy = self
            .for_user(&notification.user_email)
            .await?
            .into_iter()
            .any(|n| n.id != id && n.status == NotificationStatus::InProgress);
        if busy {
            warn!(notification = %id, user = %notification.user_email, "user already attended");
            return Err(Error::ActiveSessionExists {
                email: notification.user_email,
            });
        }
        let claimed = self
            .transition(id, NotificationStatus::Pending, NotificationStatus::InProgress)
            .await?;
        info!(notification = %id, by = %admin.email, "support request claimed");
        Ok(claimed)
    }

    pub async fn resolve(&self, admin: &User, id: &str) -> Result<AppNotification> {
        require_admin(self.store.as_ref(), admin).await?;
        let resolved = self
            .transition(id, NotificationStatus::InProgress, NotificationStatus::Resolved)
            .await?;
        info!(notification = %id, by = %admin.email, "support request resolved");
        Ok(resolved)
    }

    /// Append a user message to the single request in progress for `email`.
    pub async fn send_user_message(&self, email: &str, text: &str) -> Result<ChatMessage> {
        let text = non_empty(text)?;
        let mut active: Vec<AppNotification> = self
            .for_user(email)
            .await?
            .into_iter()
            .filter(|n| n.status == NotificationStatus::InProgress)
            .collect();
        if active.len() != 1 {
            warn!(user = %email, active = active.len(), "user message without support session");
            return Err(Error::NoActiveSupportSession {
                email: email.to_string(),
            });
        }
        let notification = active.remove(0);
        self.append(&notification.id, ChatMessage::new(ChatRole::User, text))
            .await
    }

    pub async fn send_admin_message(
        &self,
        admin: &User,
        id: &str,
        text: &str,
    ) -> Result<ChatMessage> {
        require_admin(self.store.as_ref(), admin).await?;
        let text = non_empty(text)?;
        self.require_status(id, NotificationStatus::InProgress).await?;
        self.append(id, ChatMessage::new(ChatRole::Admin, text)).await
    }

    /// Replace the audit snapshot of an open request.
    pub async fn attach_audit_data(
        &self,
        id: &str,
        snapshot: AuditSnapshot,
    ) -> Result<AppNotification> {
        let notification = self.load(id).await?;
        if notification.status == NotificationStatus::Resolved {
            warn!(notification = %id, "audit data sent to a resolved request");
            return Err(Error::StateConflict {
                id: id.to_string(),
                status: notification.status,
            });
        }
        self.write_audit(id, &snapshot).await
    }

    /// Flip one finding of the attached audit.
    pub async fn toggle_finding(
        &self,
        admin: &User,
        id: &str,
        index: usize,
    ) -> Result<AuditSnapshot> {
        let snapshot = self.correctable(admin, id).await?;
        let next = audit::toggle_finding(&snapshot, index)?;
        self.write_audit(id, &next).await?;
        debug!(
            notification = %id,
            index,
            status = %next.validations[index].status.as_str(),
            "finding toggled"
        );
        Ok(next)
    }

    pub async fn toggle_client_override(&self, admin: &User, id: &str) -> Result<AuditSnapshot> {
        let snapshot = self.correctable(admin, id).await?;
        let next = audit::toggle_client_override(&snapshot);
        self.write_audit(id, &next).await?;
        debug!(
            notification = %id,
            client_override = next.client_override,
            "client override toggled"
        );
        Ok(next)
    }

    /// Push the corrected audit into the report history and tell the user.
    ///
    /// The report write and the confirmation message are separate writes;
    /// a concurrent correction may land between them.
    pub async fn sync_to_history(&self, admin: &User, id: &str) -> Result<RevisionReport> {
        let snapshot = self.correctable(admin, id).await?;
        let notification = self.load(id).await?;
        let report = self
            .history
            .apply_correction(
                CorrectionTarget {
                    user_name: &notification.user_name,
                },
                &snapshot,
            )
            .await?;
        self.append(id, ChatMessage::new(ChatRole::Admin, SYNC_CONFIRMATION))
            .await?;
        info!(
            notification = %id,
            report = %report.id,
            by = %admin.email,
            "correction synchronized"
        );
        Ok(report)
    }

    pub async fn delete_request(&self, admin: &User, id: &str) -> Result<()> {
        require_admin(self.store.as_ref(), admin).await?;
        self.store
            .delete(NOTIFICATIONS, id)
            .await
            .map_err(|e| not_found_as(e, id))?;
        info!(notification = %id, by = %admin.email, "support request deleted");
        Ok(())
    }

    /// All requests, newest first.
    pub async fn list(&self) -> Result<Vec<AppNotification>> {
        let mut notifications = self
            .store
            .list(NOTIFICATIONS)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(Error::from))
            .collect::<Result<Vec<AppNotification>>>()?;
        notifications.reverse();
        Ok(notifications)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AppNotification>> {
        match self.store.get(NOTIFICATIONS, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Requests opened by one user, in creation order.
    pub async fn for_user(&self, email: &str) -> Result<Vec<AppNotification>> {
        let mut notifications = self.list().await?;
        notifications.retain(|n| n.user_email == email);
        notifications.reverse();
        Ok(notifications)
    }

    async fn load(&self, id: &str) -> Result<AppNotification> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotificationNotFound(id.to_string()))
    }

    async fn require_status(
        &self,
        id: &str,
        status: NotificationStatus,
    ) -> Result<AppNotification> {
        let notification = self.load(id).await?;
        if notification.status != status {
            warn!(
                notification = %id,
                status = %notification.status,
                expected = %status,
                "request in wrong status"
            );
            return Err(Error::StateConflict {
                id: id.to_string(),
                status: notification.status,
            });
        }
        Ok(notification)
    }

    // Guards shared by every correction: admin, in progress, audit attached.
    async fn correctable(&self, admin: &User, id: &str) -> Result<AuditSnapshot> {
        require_admin(self.store.as_ref(), admin).await?;
        self.require_status(id, NotificationStatus::InProgress)
            .await?
            .audit_data
            .ok_or_else(|| Error::MissingAuditData(id.to_string()))
    }

    async fn transition(
        &self,
        id: &str,
        from: NotificationStatus,
        to: NotificationStatus,
    ) -> Result<AppNotification> {
        let guard = DatabaseFilter::eq("status", from.as_str());
        match self
            .store
            .update_where(NOTIFICATIONS, id, &guard, fields(json!({ "status": to })))
            .await
        {
            Ok(doc) => Ok(doc.decode()?),
            Err(RealtimeError::PreconditionFailed { .. }) => {
                let current = self.load(id).await?;
                warn!(
                    notification = %id,
                    status = %current.status,
                    to = %to,
                    "transition rejected"
                );
                Err(Error::InvalidStateTransition {
                    id: id.to_string(),
                    from: current.status,
                    to,
                })
            }
            Err(e) => Err(not_found_as(e, id)),
        }
    }

    async fn append(&self, id: &str, message: ChatMessage) -> Result<ChatMessage> {
        let doc = self
            .store
            .array_append(
                NOTIFICATIONS,
                id,
                "chatHistory",
                serde_json::to_value(&message)?,
                Some("sequence"),
            )
            .await
            .map_err(|e| not_found_as(e, id))?;
        let notification: AppNotification = doc.decode()?;
        let appended = notification
            .chat_history
            .last()
            .cloned()
            .unwrap_or(message);
        debug!(
            notification = %id,
            role = ?appended.role,
            sequence = appended.sequence,
            "chat message appended"
        );
        Ok(appended)
    }

    async fn write_audit(&self, id: &str, snapshot: &AuditSnapshot) -> Result<AppNotification> {
        let doc = self
            .store
            .update(NOTIFICATIONS, id, fields(json!({ "auditData": snapshot })))
            .await
            .map_err(|e| not_found_as(e, id))?;
        Ok(doc.decode()?)
    }
}

fn non_empty(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("El mensaje no puede estar vacío"));
    }
    Ok(trimmed)
}

fn not_found_as(err: RealtimeError, id: &str) -> Error {
    if err.is_not_found() {
        Error::NotificationNotFound(id.to_string())
    } else {
        Error::Store(err)
    }
}
