use crate::filters::{Rule, RuleSet};
use crate::labels::LabelDirectory;
use crate::models::NativeFilter;
use crate::service::GmailService;
use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

/// What a reconcile run removed and created, in call order.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub deleted: Vec<NativeFilter>,
    pub created: Vec<NativeFilter>,
    pub dry_run: bool,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        format!(
            "{} {} managed filter(s), {} {} filter(s)",
            verb,
            self.deleted.len(),
            if self.dry_run { "would create" } else { "created" },
            self.created.len()
        )
    }
}

/// Replaces every managed filter in `current` with the rules of `desired`.
///
/// Label references are resolved first, so an unknown label aborts before
/// anything is deleted. After that the run is two sequential phases, delete
/// all managed filters then create all desired ones, and is not
/// transactional: a failure in either phase leaves Gmail partially updated.
/// `current` drops each managed rule only once its delete succeeded, so it
/// still matches Gmail after a failure. Custom filters are never touched.
///
/// With `dry_run` no filter is deleted or created; the intended calls are
/// printed instead and `current` ends up as a real run would leave it.
pub async fn reconcile(
    current: &mut RuleSet,
    desired: RuleSet,
    labels: &mut LabelDirectory,
    service: &dyn GmailService,
    dry_run: bool,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport {
        dry_run,
        ..Default::default()
    };

    let mut pending = Vec::with_capacity(desired.len());
    for mut rule in desired.into_rules() {
        if rule.is_custom() {
            warn!("Skipping filter without the managed marker: {}", rule);
            continue;
        }
        rule.normalize_labels(labels, service).await?;
        pending.push(rule);
    }

    loop {
        let Some(rule) = current.managed().next() else {
            break;
        };
        if dry_run {
            println!("Remove from Gmail filters: {}", rule);
        } else {
            let id = rule
                .id()
                .ok_or_else(|| anyhow!("Managed filter has no id: {}", rule))?
                .to_string();
            service
                .delete_filter(&id)
                .await
                .with_context(|| format!("Failed to delete filter {}", id))?;
            info!("Deleted Gmail filter {}", id);
        }
        if let Some(removed) = current.take_first_managed() {
            report.deleted.push(removed.native().clone());
        }
    }

    for rule in pending {
        let created = if dry_run {
            println!("Create Gmail filter: {}", rule);
            rule
        } else {
            let created = service
                .create_filter(rule.native())
                .await
                .with_context(|| format!("Failed to create filter {}", rule))?;
            info!("Created Gmail filter {}", created.id.as_deref().unwrap_or("?"));
            Rule::from_native(created)
        };
        report.created.push(created.native().clone());
        current.push(created);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelPolicy;
    use crate::models::{Criteria, FilterAction};
    use crate::service::testing::{Call, MemoryService, system_label, user_label};

    fn native(id: &str, from: &str, managed: bool, add: &[&str]) -> NativeFilter {
        let mut criteria = Criteria {
            from: Some(from.to_string()),
            ..Default::default()
        };
        if managed {
            criteria.set_marker();
        }
        NativeFilter {
            id: Some(id.to_string()),
            criteria,
            action: FilterAction {
                add_label_ids: add.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    fn service() -> MemoryService {
        MemoryService::new(
            vec![system_label("INBOX"), user_label("Label_1", "Work")],
            vec![
                native("M1", "m1@example.com", true, &["Label_1"]),
                native("C1", "c1@example.com", false, &["STARRED"]),
                native("M2", "m2@example.com", true, &["TRASH"]),
            ],
        )
    }

    const DESIRED: &str = "
- filter: {from: m1@example.com}
  action: {move_to: Work}
- filter: {from: m3@example.com}
  action: {label: [Play]}
";

    fn policy(dry_run: bool) -> LabelPolicy {
        LabelPolicy {
            auto_create: true,
            dry_run,
        }
    }

    #[tokio::test]
    async fn test_reconcile_deletes_managed_then_creates() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, policy(false)).await.unwrap();
        let mut current = RuleSet::load_remote(&svc).await.unwrap();
        let desired = RuleSet::from_yaml(DESIRED).unwrap();

        let report = reconcile(&mut current, desired, &mut labels, &svc, false)
            .await
            .unwrap();

        let calls = svc.calls();
        assert_eq!(calls[0], Call::CreateLabel("Play".to_string()));
        assert_eq!(calls[1], Call::DeleteFilter("M1".to_string()));
        assert_eq!(calls[2], Call::DeleteFilter("M2".to_string()));
        assert!(matches!(&calls[3], Call::CreateFilter(f) if f.action.add_label_ids == vec!["Label_1"]));
        assert!(matches!(&calls[4], Call::CreateFilter(f) if f.action.add_label_ids == vec!["Label_3"]));
        assert_eq!(calls.len(), 5);

        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.created.len(), 2);

        let remote = svc.filters();
        assert!(remote.iter().any(|f| f.id.as_deref() == Some("C1")));
        assert_eq!(remote.len(), 3);

        assert_eq!(current.custom().count(), 1);
        assert_eq!(current.managed().count(), 2);
        assert!(current.managed().all(|r| r.id().is_some()));
    }

    #[tokio::test]
    async fn test_custom_filter_is_untouched() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, policy(false)).await.unwrap();
        let mut current = RuleSet::load_remote(&svc).await.unwrap();
        let before = current.custom().cloned().collect::<Vec<_>>();

        reconcile(&mut current, RuleSet::default(), &mut labels, &svc, false)
            .await
            .unwrap();

        assert_eq!(current.custom().cloned().collect::<Vec<_>>(), before);
        assert_eq!(svc.filters(), vec![native("C1", "c1@example.com", false, &["STARRED"])]);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_remote_calls() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, policy(true)).await.unwrap();
        let mut current = RuleSet::load_remote(&svc).await.unwrap();
        let desired = RuleSet::from_yaml(DESIRED).unwrap();

        let report = reconcile(&mut current, desired, &mut labels, &svc, true)
            .await
            .unwrap();

        assert!(svc.calls().is_empty());
        assert_eq!(svc.filters().len(), 3);
        assert!(report.dry_run);
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.created[1].action.add_label_ids, vec!["FakeLabel_Play"]);
        assert_eq!(current.managed().count(), 2);
        assert_eq!(current.custom().count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_label_aborts_before_deleting() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, LabelPolicy::default()).await.unwrap();
        let mut current = RuleSet::load_remote(&svc).await.unwrap();
        let desired = RuleSet::from_yaml(DESIRED).unwrap();

        let result = reconcile(&mut current, desired, &mut labels, &svc, false).await;

        assert!(result.is_err());
        assert!(svc.calls().is_empty());
        assert_eq!(current.managed().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_undeleted_rules() {
        let svc = service();
        let mut labels = LabelDirectory::load(&svc, policy(false)).await.unwrap();
        let mut current = RuleSet::load_remote(&svc).await.unwrap();
        // Gone from Gmail behind our back, so deleting it fails.
        svc.delete_filter("M2").await.unwrap();

        let result = reconcile(&mut current, RuleSet::default(), &mut labels, &svc, false).await;

        assert!(result.is_err());
        assert!(svc.filters().iter().all(|f| f.id.as_deref() == Some("C1")));
        let left: Vec<_> = current.managed().filter_map(Rule::id).collect();
        assert_eq!(left, vec!["M2"]);
        assert_eq!(current.custom().count(), 1);
    }

    #[test]
    fn test_summary() {
        let report = ReconcileReport {
            dry_run: true,
            ..Default::default()
        };
        assert_eq!(report.summary(), "Would remove 0 managed filter(s), would create 0 filter(s)");
    }
}
