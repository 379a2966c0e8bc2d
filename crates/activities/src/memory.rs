//! In-memory `ActionCatalog` and a mail sender that only logs.
//!
//! Used by the CLI to run trees from a JSON fixture and by tests across the
//! workspace. Locks are held only for the duration of a map operation,
//! never across an await.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::{
    ActionCatalog, ActionId, ActionNode, CollaboratorError, Contact, ContactId, MailHeader,
    MailSender, MailTemplate, Project, ProjectId, TagId, TemplateId,
};

/// Serialized catalog content, e.g. loaded from a file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogFixture {
    pub projects: Vec<Project>,
    /// Root nodes; nested children are reachable by id too.
    pub actions: Vec<ActionNode>,
    pub contacts: Vec<Contact>,
    pub templates: Vec<MailTemplate>,
}

#[derive(Default)]
struct CatalogState {
    projects: BTreeMap<ProjectId, Project>,
    actions: BTreeMap<ActionId, ActionNode>,
    contacts: BTreeMap<ContactId, Contact>,
    templates: BTreeMap<TemplateId, MailTemplate>,
    last_contact_id: ContactId,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
    tag_queries: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: CatalogFixture) -> Self {
        let catalog = Self::new();
        for project in fixture.projects {
            catalog.add_project(project);
        }
        for action in fixture.actions {
            catalog.put_action(action);
        }
        for contact in fixture.contacts {
            catalog.add_contact(contact);
        }
        for template in fixture.templates {
            catalog.add_template(template);
        }
        catalog
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_project(&self, project: Project) {
        self.state().projects.insert(project.id, project);
    }

    /// Insert a tree, or replace the node with the same id wherever it sits.
    pub fn put_action(&self, node: ActionNode) {
        let mut state = self.state();
        for root in state.actions.values_mut() {
            if replace_node(root, &node) {
                return;
            }
        }
        state.actions.insert(node.id, node);
    }

    pub fn remove_action(&self, id: ActionId) {
        let mut state = self.state();
        if state.actions.remove(&id).is_some() {
            return;
        }
        for root in state.actions.values_mut() {
            if remove_node(root, id) {
                return;
            }
        }
    }

    /// Store a contact, assigning an id if it has none. Returns the stored
    /// record.
    pub fn add_contact(&self, mut contact: Contact) -> Contact {
        let mut state = self.state();
        let id = match contact.id {
            Some(id) => id,
            None => state.last_contact_id + 1,
        };
        state.last_contact_id = state.last_contact_id.max(id);
        contact.id = Some(id);
        state.contacts.insert(id, contact.clone());
        contact
    }

    pub fn contact(&self, id: ContactId) -> Option<Contact> {
        self.state().contacts.get(&id).cloned()
    }

    pub fn contact_count(&self) -> usize {
        self.state().contacts.len()
    }

    pub fn add_template(&self, template: MailTemplate) {
        self.state().templates.insert(template.id, template);
    }

    /// Number of `has_business_tags` calls served so far.
    pub fn tag_queries(&self) -> usize {
        self.tag_queries.load(Ordering::SeqCst)
    }
}

fn replace_node(node: &mut ActionNode, new: &ActionNode) -> bool {
    if node.id == new.id {
        *node = new.clone();
        return true;
    }
    node.children.iter_mut().any(|c| replace_node(c, new))
}

fn remove_node(node: &mut ActionNode, id: ActionId) -> bool {
    let before = node.children.len();
    node.children.retain(|c| c.id != id);
    if node.children.len() != before {
        return true;
    }
    node.children.iter_mut().any(|c| remove_node(c, id))
}

fn validate_contact(contact: &Contact) -> Result<(), CollaboratorError> {
    let email = contact.email.trim();
    let mut errors = Vec::new();
    if email.is_empty() {
        errors.push("email is required".to_string());
    } else if !email.contains('@') {
        errors.push(format!("email '{email}' is invalid"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CollaboratorError::Validation(errors))
    }
}

fn contact_not_found(id: ContactId) -> CollaboratorError {
    CollaboratorError::NotFound { entity: "contact", id: id.to_string() }
}

#[async_trait]
impl ActionCatalog for InMemoryCatalog {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, CollaboratorError> {
        Ok(self.state().projects.get(&id).cloned())
    }

    async fn get_action(&self, id: ActionId) -> Result<Option<ActionNode>, CollaboratorError> {
        let state = self.state();
        Ok(state.actions.values().find_map(|root| root.find(id)).cloned())
    }

    async fn has_business_tags(
        &self,
        contact_id: ContactId,
        include: &BTreeSet<TagId>,
        exclude: &BTreeSet<TagId>,
    ) -> Result<bool, CollaboratorError> {
        self.tag_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        let contact = state.contacts.get(&contact_id).ok_or_else(|| contact_not_found(contact_id))?;
        Ok(include.is_subset(&contact.tags) && exclude.is_disjoint(&contact.tags))
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<Contact, CollaboratorError> {
        validate_contact(contact)?;
        if let Some(id) = contact.id {
            let mut state = self.state();
            let stored = state.contacts.get_mut(&id).ok_or_else(|| contact_not_found(id))?;
            *stored = contact.clone();
            return Ok(contact.clone());
        }
        Ok(self.add_contact(contact.clone()))
    }

    async fn remove_contact(
        &self,
        project_id: ProjectId,
        contact_id: ContactId,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.state();
        match state.contacts.get(&contact_id) {
            Some(c) if c.project_id == project_id => {
                state.contacts.remove(&contact_id);
                Ok(())
            }
            _ => Err(contact_not_found(contact_id)),
        }
    }

    async fn set_contact_tags(
        &self,
        contact_id: ContactId,
        include: &[TagId],
        exclude: &[TagId],
    ) -> Result<Contact, CollaboratorError> {
        let mut state = self.state();
        let contact = state.contacts.get_mut(&contact_id).ok_or_else(|| contact_not_found(contact_id))?;
        contact.tags.extend(include.iter().copied());
        for tag in exclude {
            contact.tags.remove(tag);
        }
        Ok(contact.clone())
    }

    async fn get_mail_template(
        &self,
        id: TemplateId,
    ) -> Result<Option<MailTemplate>, CollaboratorError> {
        Ok(self.state().templates.get(&id).cloned())
    }
}

/// Mail sender for local runs: logs the message instead of delivering it.
pub struct TracingMailSender;

#[async_trait]
impl MailSender for TracingMailSender {
    async fn send(
        &self,
        project: &Project,
        header: &MailHeader,
        template: &MailTemplate,
    ) -> Result<(), CollaboratorError> {
        info!(
            project_id = project.id,
            template_id = template.id,
            to = %header.to.email,
            subject = %template.subject,
            "mail delivery skipped (logging sender)"
        );
        Ok(())
    }
}
