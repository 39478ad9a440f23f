//! Webhook provisioning for the configured spaces
//!
//! Safe to run repeatedly: registration tolerates `AlreadyExists`, so a
//! re-run after a new grant only fills in what is missing.

use tracing::{info, warn};
use webex_api::{NewWebhook, Session, WEBHOOK_NAME, Webhook, WebhookCreation};

use crate::config::Spaces;

/// One registered webhook as shown on the status page.
#[derive(Debug, Clone)]
pub struct WebhookStatus {
    pub id: String,
    /// Title of the room the webhook is scoped to, when it could be resolved
    pub space: Option<String>,
    pub target_url: String,
    pub status: String,
    pub recipients: Vec<String>,
}

/// What a provisioning run did, by space title.
#[derive(Debug, Default)]
pub struct Provisioning {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// No room with this title is visible to the authorizing user
    pub missing: Vec<String>,
    /// Lookup or registration failed with a provider error
    pub failed: Vec<String>,
    pub webhooks: Vec<WebhookStatus>,
}

/// Register a `messages/created` webhook for every configured space, then
/// list this integration's webhooks with their room titles.
///
/// Provider errors for a single space are recorded and skipped. Errors that
/// need a new grant abort the run.
pub async fn provision(
    session: &Session,
    spaces: &Spaces,
    target_url: &str,
    secret: &str,
) -> webex_api::Result<Provisioning> {
    let mut provisioning = Provisioning::default();

    for title in spaces.titles() {
        let room_id = match session.get_room_id(title).await {
            Ok(Some(room_id)) => room_id,
            Ok(None) => {
                warn!(space = title, "no room with this title, skipping");
                provisioning.missing.push(title.to_owned());
                continue;
            }
            Err(e) if e.needs_grant() => return Err(e),
            Err(e) => {
                warn!(space = title, error = %e, "room lookup failed, skipping");
                provisioning.failed.push(title.to_owned());
                continue;
            }
        };

        let webhook = NewWebhook::messages_created(&room_id, target_url, secret);
        match session.configure_webhook(&webhook).await {
            Ok(WebhookCreation::Created(_)) => provisioning.created.push(title.to_owned()),
            Ok(WebhookCreation::AlreadyExists) => provisioning.existing.push(title.to_owned()),
            Err(e) if e.needs_grant() => return Err(e),
            Err(e) => {
                warn!(space = title, room_id = %room_id, error = %e, "webhook registration failed");
                provisioning.failed.push(title.to_owned());
            }
        }
    }

    provisioning.webhooks = list_status(session, spaces).await?;
    info!(
        created = provisioning.created.len(),
        existing = provisioning.existing.len(),
        missing = provisioning.missing.len(),
        failed = provisioning.failed.len(),
        listed = provisioning.webhooks.len(),
        "webhook provisioning finished"
    );
    Ok(provisioning)
}

/// This integration's webhooks, each enriched with its room title.
async fn list_status(session: &Session, spaces: &Spaces) -> webex_api::Result<Vec<WebhookStatus>> {
    let hooks: Vec<Webhook> = session
        .list_webhooks()
        .await?
        .into_iter()
        .filter(|hook| hook.name == WEBHOOK_NAME)
        .collect();

    let mut statuses = Vec::with_capacity(hooks.len());
    for hook in hooks {
        let space = match hook.room_id() {
            Some(room_id) => match session.room_details(room_id).await {
                Ok(room) => room.map(|room| room.title),
                Err(e) if e.needs_grant() => return Err(e),
                Err(e) => {
                    warn!(webhook_id = %hook.id, room_id, error = %e, "could not resolve webhook room");
                    None
                }
            },
            None => None,
        };
        let recipients = space
            .as_deref()
            .and_then(|title| spaces.recipients(title))
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        statuses.push(WebhookStatus {
            id: hook.id,
            space,
            target_url: hook.target_url,
            status: hook.status.unwrap_or_else(|| "unknown".into()),
            recipients,
        });
    }
    Ok(statuses)
}
