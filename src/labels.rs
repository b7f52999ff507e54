use crate::error::FilterError;
use crate::models::{self, Label};
use crate::service::GmailService;
use anyhow::Result;
use tracing::{debug, info};

/// What to do when a label name cannot be resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelPolicy {
    /// Create missing labels on the remote side instead of failing.
    pub auto_create: bool,
    /// Never touch the remote side; missing labels get a local placeholder.
    pub dry_run: bool,
}

/// Cached view of the account's labels, looked up by id or by name.
///
/// Lookups are only valid until the next [`LabelDirectory::reload`].
#[derive(Debug, Clone, Default)]
pub struct LabelDirectory {
    labels: Vec<Label>,
    policy: LabelPolicy,
}

impl LabelDirectory {
    pub fn new(labels: Vec<Label>, policy: LabelPolicy) -> Self {
        Self { labels, policy }
    }

    pub async fn load(service: &dyn GmailService, policy: LabelPolicy) -> Result<Self> {
        let mut directory = Self::new(Vec::new(), policy);
        directory.reload(service).await?;
        Ok(directory)
    }

    pub async fn reload(&mut self, service: &dyn GmailService) -> Result<()> {
        self.labels = service.list_labels().await?;
        debug!("Loaded {} labels", self.len());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Finds a label whose id or name equals `key`.
    pub fn resolve(&self, key: &str) -> Result<&Label, FilterError> {
        self.iter()
            .find(|l| l.id == key || l.name == key)
            .ok_or_else(|| FilterError::NotFound(key.to_string()))
    }

    /// Display name for a label reference. System labels are their own name.
    pub fn name_of(&self, key: &str) -> Result<String, FilterError> {
        match self.resolve(key) {
            Ok(label) => Ok(label.name.clone()),
            Err(_) if models::is_system_label(key) => Ok(key.to_string()),
            Err(e) => Err(e),
        }
    }

    /// Resolves a label reference to its id without creating anything.
    pub fn id_of(&self, key: &str) -> Result<String, FilterError> {
        if models::is_system_label(key) {
            return Ok(key.to_string());
        }
        self.resolve(key).map(|l| l.id.clone())
    }

    /// Resolves a label reference to its id, creating the label first when
    /// the policy allows it. Created labels are appended to the cache.
    pub async fn id_or_create(&mut self, service: &dyn GmailService, key: &str) -> Result<String> {
        match self.id_of(key) {
            Ok(id) => return Ok(id),
            Err(FilterError::NotFound(_)) if self.policy.auto_create => {}
            Err(e) => return Err(e.into()),
        }

        let label = if self.policy.dry_run {
            info!("Would create Gmail label: {}", key);
            placeholder_label(key)
        } else {
            info!("Creating Gmail label: {}", key);
            service.create_label(key).await?
        };
        let id = label.id.clone();
        self.labels.push(label);
        Ok(id)
    }
}

fn placeholder_label(name: &str) -> Label {
    Label {
        id: format!("FakeLabel_{}", name.replace(' ', "-")),
        name: name.to_string(),
        label_type: "user".to_string(),
        message_list_visibility: Some("show".to_string()),
        label_list_visibility: Some("labelShowIfUnread".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{Call, MemoryService, system_label, user_label};

    fn service() -> MemoryService {
        MemoryService::new(
            vec![system_label("INBOX"), user_label("Label_1", "Work")],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_resolve_by_id_or_name() {
        let svc = service();
        let labels = LabelDirectory::load(&svc, LabelPolicy::default()).await.unwrap();
        assert_eq!(labels.resolve("Work").unwrap().id, "Label_1");
        assert_eq!(labels.resolve("Label_1").unwrap().name, "Work");
        assert!(matches!(labels.resolve("Play"), Err(FilterError::NotFound(_))));
    }

    #[test]
    fn test_system_labels_resolve_to_themselves() {
        let labels = LabelDirectory::new(Vec::new(), LabelPolicy::default());
        assert_eq!(labels.id_of("TRASH").unwrap(), "TRASH");
        assert_eq!(labels.name_of("IMPORTANT").unwrap(), "IMPORTANT");
    }

    #[tokio::test]
    async fn test_missing_label_without_auto_create_fails() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, LabelPolicy::default()).await.unwrap();
        let err = labels.id_or_create(&svc, "Play").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilterError>(),
            Some(FilterError::NotFound(name)) if name == "Play"
        ));
        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_create_appends_to_cache() {
        let svc = service();
        let policy = LabelPolicy {
            auto_create: true,
            dry_run: false,
        };
        let mut labels = LabelDirectory::load(&svc, policy).await.unwrap();
        let id = labels.id_or_create(&svc, "Play").await.unwrap();
        assert_eq!(id, "Label_3");
        assert_eq!(labels.resolve("Play").unwrap().id, "Label_3");
        assert_eq!(svc.calls(), vec![Call::CreateLabel("Play".to_string())]);

        // Second lookup hits the cache.
        labels.id_or_create(&svc, "Play").await.unwrap();
        assert_eq!(svc.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_uses_placeholder() {
        let svc = service();
        let policy = LabelPolicy {
            auto_create: true,
            dry_run: true,
        };
        let mut labels = LabelDirectory::load(&svc, policy).await.unwrap();
        let id = labels.id_or_create(&svc, "Side Projects").await.unwrap();
        assert_eq!(id, "FakeLabel_Side-Projects");
        assert!(svc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reload_drops_local_additions() {
        let svc = service();
        let policy = LabelPolicy {
            auto_create: true,
            dry_run: true,
        };
        let mut labels = LabelDirectory::load(&svc, policy).await.unwrap();
        labels.id_or_create(&svc, "Play").await.unwrap();
        assert_eq!(labels.len(), 3);
        labels.reload(&svc).await.unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|l| l.name != "Play"));
    }
}
