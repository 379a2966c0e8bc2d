use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::StepConfig;
use crate::traits::ensure_not_cancelled;
use crate::{ActionId, Activity, ActivityError, ActivityResult, Clock, ContactId, ExecutionContext};

const TOKEN_PLACEHOLDER: &str = "{token}";

/// Opaque token appended to redirect targets so the landing page can
/// correlate the visit with this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectToken {
    #[serde(rename = "a")]
    pub action_id: ActionId,
    #[serde(rename = "c")]
    pub contact_id: Option<ContactId>,
    #[serde(rename = "u")]
    pub correlation_uri: Option<String>,
}

impl RedirectToken {
    pub fn encode(&self) -> String {
        // Serializing a struct of plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Builds the absolute URL the caller should redirect the visitor to.
///
/// The configured target is not checked against an allow-list of project
/// domains.
pub struct RedirectActivity {
    clock: Arc<dyn Clock>,
}

impl RedirectActivity {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn build_url(&self, ctx: &ExecutionContext, template: &str) -> Option<Url> {
        let token = RedirectToken {
            action_id: ctx.root_action,
            contact_id: ctx.contact_id(),
            correlation_uri: ctx.event.correlation_uri.clone(),
        }
        .encode();

        let has_placeholder = template.contains(TOKEN_PLACEHOLDER);
        let target = template.replace(TOKEN_PLACEHOLDER, &token);
        let mut url = match Url::parse(&target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(ctx.project.base_url.as_deref()?).ok()?;
                base.join(&target).ok()?
            }
            Err(e) => {
                debug!("invalid redirect target '{}': {}", target, e);
                return None;
            }
        };

        if !has_placeholder {
            url.query_pairs_mut().append_pair("token", &token);
        }
        if ctx.is_authenticated_at(self.clock.now()) {
            if let Some(ticket) = &ctx.auth_ticket {
                let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(ticket).ok()?);
                url.query_pairs_mut().append_pair("ticket", &encoded);
            }
        }
        Some(url)
    }
}

#[async_trait]
impl Activity for RedirectActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let config = match ctx.current_action.config() {
            Ok(StepConfig::Redirect(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        Ok(match self.build_url(ctx, &config.url) {
            Some(url) => ActivityResult::redirect(url.to_string()),
            None => ActivityResult::failed_with(format!("cannot resolve redirect target '{}'", config.url)),
        })
    }
}
