//! Renders configured templates into queued emails.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::error::{AppError, AppResult};
use crate::models::Email;
use crate::repositories::{ChangeSet, EmailStore};
use crate::utils::Clock;

/// Template placeholder values, keyed without the `${}` wrapper
pub type Substitutions = BTreeMap<String, String>;

/// Queues `New` emails for the sender sweep to deliver.
#[derive(Clone)]
pub struct EmailQueueService {
    config: EmailConfig,
    emails: Arc<dyn EmailStore>,
    clock: Arc<dyn Clock>,
}

impl EmailQueueService {
    /// Creates a new EmailQueueService
    ///
    /// # Arguments
    /// * `config` - Sender address and templates
    /// * `emails` - Store used by [`queue`](Self::queue)
    /// * `clock` - Source of `created_at`
    pub fn new(config: EmailConfig, emails: Arc<dyn EmailStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            emails,
            clock,
        }
    }

    /// Whether `template` is configured
    pub fn has_template(&self, template: &str) -> bool {
        self.config.template(template).is_some()
    }

    /// Renders `template` for `to` without storing it.
    ///
    /// # Errors
    /// `AppError::Configuration` when no template of that name is configured
    pub fn compose(&self, to: &str, template: &str, substitutions: &Substitutions) -> AppResult<Email> {
        let config = self.config.template(template).ok_or_else(|| {
            AppError::configuration(
                format!("email.templates.{template}"),
                format!("email template '{template}' is not configured"),
            )
        })?;

        let personalization: Map<String, JsonValue> = substitutions
            .iter()
            .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
            .collect();

        Ok(Email::new(
            &self.config.from,
            to,
            render(&config.subject, substitutions),
            render(&config.body, substitutions),
            self.clock.now(),
        )
        .with_format(config.format)
        .with_priority(config.priority)
        .with_template(template, JsonValue::Object(personalization)))
    }

    /// An untemplated email from the configured sender address.
    pub fn message(&self, to: &str, subject: &str, body: &str) -> Email {
        Email::new(&self.config.from, to, subject, body, self.clock.now())
    }

    /// Stages the email into `changes` so it commits with the rest of the page.
    pub fn stage(
        &self,
        changes: &mut ChangeSet,
        to: &str,
        template: &str,
        substitutions: &Substitutions,
    ) -> AppResult<Uuid> {
        let email = self.compose(to, template, substitutions)?;
        let id = email.id;
        changes.queue_email(email);
        Ok(id)
    }

    /// Inserts the email immediately.
    pub async fn queue(&self, to: &str, template: &str, substitutions: &Substitutions) -> AppResult<Uuid> {
        let email = self.compose(to, template, substitutions)?;
        self.emails.insert(&email).await?;
        tracing::debug!(email_id = %email.id, template, "Email queued");
        Ok(email.id)
    }
}

/// Replaces every `${Key}` with its value in one left-to-right pass, so
/// substituted values are never expanded again. Unknown placeholders stay
/// as-is.
fn render(text: &str, substitutions: &Substitutions) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            rest = tail;
            break;
        };
        match substitutions.get(&tail[2..end]) {
            Some(value) => out.push_str(value),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailTemplateConfig;
    use crate::models::{EmailFormat, EmailPriority, EmailStatus};
    use crate::repositories::MemoryStore;
    use crate::utils::FakeClock;
    use std::collections::HashMap;

    fn service(store: Arc<MemoryStore>) -> EmailQueueService {
        let mut templates = HashMap::new();
        templates.insert(
            "AccountRemoved".to_string(),
            EmailTemplateConfig {
                subject: "Account closed".to_string(),
                body: "Contact ${contactInfo} or ${contactInfo}. ${unknown}".to_string(),
                format: EmailFormat::Html,
                priority: EmailPriority::Low,
            },
        );
        let config = EmailConfig {
            from: "noreply@gov".to_string(),
            templates,
        };
        EmailQueueService::new(config, store, Arc::new(FakeClock::default()))
    }

    fn subs() -> Substitutions {
        [("contactInfo".to_string(), "help@gov".to_string())].into()
    }

    #[test]
    fn test_compose_substitutes_placeholders() {
        let service = service(Arc::new(MemoryStore::new()));

        let email = service.compose("user@example.com", "AccountRemoved", &subs()).unwrap();

        assert_eq!(email.body, "Contact help@gov or help@gov. ${unknown}");
        assert_eq!(email.from_address, "noreply@gov");
        assert_eq!(email.format, EmailFormat::Html);
        assert_eq!(email.priority, EmailPriority::Low);
        assert_eq!(email.status, EmailStatus::New);
        assert_eq!(email.template.as_deref(), Some("AccountRemoved"));
        assert_eq!(email.personalization.unwrap()["contactInfo"], "help@gov");
    }

    #[test]
    fn test_render_does_not_expand_substituted_values() {
        let substitutions: Substitutions = [
            ("name".to_string(), "${contactInfo}".to_string()),
            ("contactInfo".to_string(), "help@gov".to_string()),
        ]
        .into();

        assert_eq!(
            render("Hi ${name}, mail ${contactInfo}", &substitutions),
            "Hi ${contactInfo}, mail help@gov"
        );
        assert_eq!(render("cost ${ and ${name", &substitutions), "cost ${ and ${name");
        assert_eq!(render("${}${missing}", &substitutions), "${}${missing}");
    }

    #[test]
    fn test_template_lookup_ignores_case() {
        let service = service(Arc::new(MemoryStore::new()));
        assert!(service.has_template("accountremoved"));
    }

    #[test]
    fn test_missing_template_is_configuration_error() {
        let service = service(Arc::new(MemoryStore::new()));

        let err = service.compose("user@example.com", "Nope", &subs()).unwrap_err();

        assert!(matches!(err, AppError::Configuration { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_stage_and_queue() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());

        let mut changes = ChangeSet::default();
        service
            .stage(&mut changes, "a@example.com", "AccountRemoved", &subs())
            .unwrap();
        assert_eq!(changes.emails.len(), 1);
        assert!(store.emails().unwrap().is_empty());

        let id = service.queue("b@example.com", "AccountRemoved", &subs()).await.unwrap();
        let stored = store.emails().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
    }
}
