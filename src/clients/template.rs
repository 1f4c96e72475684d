use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use tracing::debug;

use crate::{
    clients::store::TemplateRepository,
    models::{event::TriggerType, provider::Channel, template::MessageTemplate},
};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitutes `{{key}}` placeholders in a single left-to-right pass.
///
/// Keys missing from `variables` stay in the output verbatim, as does any
/// unterminated `{{`. Substituted values are copied literally and never
/// scanned again.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];

        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &after_open[..end];

        // `{{ a {{b}}`: the first opener is literal text, rescan from the inner one.
        if let Some(nested) = inner.find(OPEN) {
            out.push_str(&rest[start..start + OPEN.len() + nested]);
            rest = &after_open[nested..];
            continue;
        }

        match variables.get(inner.trim()) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Keys referenced by well-formed placeholders, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        let inner = &after_open[..end];
        if let Some(nested) = inner.find(OPEN) {
            rest = &after_open[nested..];
            continue;
        }

        let key = inner.trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    keys
}

/// Best template among `candidates` (newest first) for a language and,
/// when given, a channel.
///
/// Templates bound to another channel are never picked. The requested
/// language wins, then a template written for the channel beats a
/// channel-less one, then the newest.
pub fn select_template<'a>(
    candidates: &'a [MessageTemplate],
    language: &str,
    channel: Option<Channel>,
) -> Option<&'a MessageTemplate> {
    candidates
        .iter()
        .filter(|t| channel.is_none_or(|c| t.serves(c)))
        .min_by_key(|t| {
            let other_language = t.language != language;
            let generic = channel.is_some() && t.channel.is_none();
            (other_language, generic)
        })
}

/// Picks the template a tenant has configured for a trigger.
pub struct TemplateResolver {
    repository: Arc<dyn TemplateRepository>,
}

impl TemplateResolver {
    pub fn new(repository: Arc<dyn TemplateRepository>) -> Self {
        Self { repository }
    }

    /// Active templates for the trigger, newest first.
    pub async fn candidates(
        &self,
        tenant_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Vec<MessageTemplate>, Error> {
        let mut candidates: Vec<MessageTemplate> = self
            .repository
            .active_templates(tenant_id, trigger_type)
            .await?
            .into_iter()
            .filter(|t| t.is_active)
            .collect();

        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(candidates)
    }

    /// Active template for the trigger, ranked by [`select_template`].
    pub async fn resolve(
        &self,
        tenant_id: &str,
        trigger_type: TriggerType,
        language: &str,
        channel: Option<Channel>,
    ) -> Result<Option<MessageTemplate>, Error> {
        let candidates = self.candidates(tenant_id, trigger_type).await?;
        let chosen = select_template(&candidates, language, channel).cloned();

        if let Some(template) = &chosen {
            debug!(
                tenant_id,
                trigger_type = trigger_type.as_str(),
                requested_language = language,
                template_language = %template.language,
                template_id = %template.id,
                "Template resolved"
            );
        }

        Ok(chosen)
    }
}
