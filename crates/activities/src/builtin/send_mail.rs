use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::StepConfig;
use crate::model::{Contact, Invitation, MailAddress, MailHeader, INVITATION_PROPERTY};
use crate::traits::ensure_not_cancelled;
use crate::{ActionCatalog, Activity, ActivityError, ActivityResult, ExecutionContext, MailSender};

/// Sends a project mail template to the run's contact.
pub struct SendMailActivity {
    catalog: Arc<dyn ActionCatalog>,
    mail: Arc<dyn MailSender>,
}

impl SendMailActivity {
    pub fn new(catalog: Arc<dyn ActionCatalog>, mail: Arc<dyn MailSender>) -> Self {
        Self { catalog, mail }
    }
}

/// Recipient is the contact; sender and extra merge fields come from an
/// invitation when one is attached to the run.
fn build_header(contact: &Contact, invitation: Option<Invitation>) -> MailHeader {
    let mut header = MailHeader {
        to: MailAddress { email: contact.email.clone(), name: contact.name.clone() },
        from: None,
        reply_to: None,
        placeholders: Default::default(),
    };
    header.placeholders.insert("contact.email".into(), contact.email.clone());
    if let Some(name) = &contact.name {
        header.placeholders.insert("contact.name".into(), name.clone());
    }

    if let Some(invitation) = invitation {
        if let Some(email) = invitation.sender_email {
            let sender = MailAddress { email, name: invitation.sender_name.clone() };
            header.reply_to = Some(sender.clone());
            header.from = Some(sender);
        }
        if let Some(name) = invitation.sender_name {
            header.placeholders.insert("sender.name".into(), name);
        }
        header.placeholders.extend(invitation.placeholders);
    }
    header
}

#[async_trait]
impl Activity for SendMailActivity {
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ActivityResult, ActivityError> {
        ensure_not_cancelled(cancel)?;

        let contact = match &ctx.contact {
            Some(contact) if ctx.has_live_contact() => contact,
            _ => return Ok(ActivityResult::failed()),
        };
        let config = match ctx.current_action.config() {
            Ok(StepConfig::SendMail(config)) => config,
            Ok(_) => return Ok(ActivityResult::failed()),
            Err(e) => return Ok(ActivityResult::failed_with(e.to_string())),
        };

        let template = match self.catalog.get_mail_template(config.template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                debug!(template_id = config.template_id, "mail template not found");
                return Ok(ActivityResult::failed());
            }
            Err(e) => return super::rejected(e),
        };
        let project = match self.catalog.get_project(ctx.project.id).await {
            Ok(Some(project)) => project,
            Ok(None) => return Ok(ActivityResult::failed()),
            Err(e) => return super::rejected(e),
        };

        let header = build_header(contact, ctx.property::<Invitation>(INVITATION_PROPERTY));
        if let Err(e) = self.mail.send(&project, &header, &template).await {
            return super::rejected(e);
        }

        info!(template_id = template.id, to = %header.to.email, "mail sent");
        Ok(ActivityResult::success())
    }
}
