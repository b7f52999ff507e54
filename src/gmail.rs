use crate::auth::SCOPES;
use crate::models;
use crate::service::GmailService;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::client::GetToken;
use google_gmail1::{Gmail, api};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use tracing::debug;

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    user_id: String,
}

impl GmailClient {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>, user_id: impl Into<String>) -> Self {
        Self {
            hub,
            user_id: user_id.into(),
        }
    }

    /// Builds the HTTPS hub around any token source.
    pub fn connect<A: GetToken + 'static>(auth: A, user_id: impl Into<String>) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .context("Failed to load native roots")?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);
        Ok(Self::new(hub, user_id))
    }
}

#[async_trait]
impl GmailService for GmailClient {
    async fn list_filters(&self) -> Result<Vec<models::NativeFilter>> {
        let (_, filter_list) = self
            .hub
            .users()
            .settings_filters_list(&self.user_id)
            .add_scopes(SCOPES)
            .doit()
            .await
            .context("Failed to list filters")?;

        let filters: Vec<_> = filter_list
            .filter
            .unwrap_or_default()
            .into_iter()
            .map(filter_from_api)
            .collect();
        debug!("Gmail returned {} filters", filters.len());

        Ok(filters)
    }

    async fn create_filter(&self, filter: &models::NativeFilter) -> Result<models::NativeFilter> {
        let (_, created) = self
            .hub
            .users()
            .settings_filters_create(filter_to_api(filter), &self.user_id)
            .add_scopes(SCOPES)
            .doit()
            .await
            .context("Failed to create filter")?;

        Ok(filter_from_api(created))
    }

    async fn delete_filter(&self, id: &str) -> Result<()> {
        self.hub
            .users()
            .settings_filters_delete(&self.user_id, id)
            .add_scopes(SCOPES)
            .doit()
            .await
            .context(format!("Failed to delete filter {}", id))?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<models::Label>> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list(&self.user_id)
            .add_scopes(SCOPES)
            .doit()
            .await
            .context("Failed to list labels")?;

        let labels = label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(label_from_api)
            .collect();

        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<models::Label> {
        let req = api::Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };
        let (_, label) = self
            .hub
            .users()
            .labels_create(req, &self.user_id)
            .add_scopes(SCOPES)
            .doit()
            .await
            .context(format!("Failed to create label {}", name))?;

        Ok(label_from_api(label))
    }
}

fn label_from_api(l: api::Label) -> models::Label {
    models::Label {
        id: l.id.unwrap_or_default(),
        name: l.name.unwrap_or_default(),
        label_type: l.type_.unwrap_or_default(),
        message_list_visibility: l.message_list_visibility,
        label_list_visibility: l.label_list_visibility,
    }
}

fn filter_from_api(f: api::Filter) -> models::NativeFilter {
    let criteria = f.criteria.unwrap_or_default();
    let action = f.action.unwrap_or_default();
    models::NativeFilter {
        id: f.id,
        criteria: models::Criteria {
            from: criteria.from,
            to: criteria.to,
            subject: criteria.subject,
            query: criteria.query,
            negated_query: criteria.negated_query,
            has_attachment: criteria.has_attachment,
            exclude_chats: criteria.exclude_chats,
            size: criteria.size,
            size_comparison: criteria.size_comparison,
        },
        action: models::FilterAction {
            add_label_ids: action.add_label_ids.unwrap_or_default(),
            remove_label_ids: action.remove_label_ids.unwrap_or_default(),
            forward: action.forward,
        },
    }
}

fn filter_to_api(f: &models::NativeFilter) -> api::Filter {
    let criteria = f.criteria.clone();
    let non_empty = |ids: &Vec<String>| (!ids.is_empty()).then(|| ids.clone());
    api::Filter {
        id: None,
        criteria: Some(api::FilterCriteria {
            from: criteria.from,
            to: criteria.to,
            subject: criteria.subject,
            query: criteria.query,
            negated_query: criteria.negated_query,
            has_attachment: criteria.has_attachment,
            exclude_chats: criteria.exclude_chats,
            size: criteria.size,
            size_comparison: criteria.size_comparison,
        }),
        action: (!f.action.is_empty()).then(|| api::FilterAction {
            add_label_ids: non_empty(&f.action.add_label_ids),
            remove_label_ids: non_empty(&f.action.remove_label_ids),
            forward: f.action.forward.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    type TokenFuture<'a> = Pin<
        Box<
            dyn Future<Output = Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>>
                + Send
                + 'a,
        >,
    >;

    /// Records the scopes each call asks for, then refuses to hand out a
    /// token so no request leaves the process.
    #[derive(Clone, Default)]
    struct ScopeRecorder(Arc<Mutex<Vec<BTreeSet<String>>>>);

    impl GetToken for ScopeRecorder {
        fn get_token<'a>(&'a self, scopes: &'a [&str]) -> TokenFuture<'a> {
            let requested = scopes.iter().map(|s| s.to_string()).collect();
            self.0.lock().unwrap().push(requested);
            Box::pin(async { Err("no token in tests".into()) })
        }
    }

    #[tokio::test]
    async fn test_every_call_requests_the_tool_scopes() {
        let recorder = ScopeRecorder::default();
        let client = GmailClient::connect(recorder.clone(), "me").unwrap();

        assert!(client.list_filters().await.is_err());
        assert!(client.create_filter(&models::NativeFilter::default()).await.is_err());
        assert!(client.delete_filter("f1").await.is_err());
        assert!(client.list_labels().await.is_err());
        assert!(client.create_label("Work").await.is_err());

        let expected: BTreeSet<String> = SCOPES.iter().map(|s| s.to_string()).collect();
        let requested = recorder.0.lock().unwrap().clone();
        assert_eq!(requested.len(), 5);
        assert!(requested.iter().all(|scopes| *scopes == expected));
    }

    #[test]
    fn test_filter_conversion_keeps_every_field() {
        let native = models::NativeFilter {
            id: Some("ignored".to_string()),
            criteria: models::Criteria {
                from: Some("a@b.com".to_string()),
                negated_query: Some("unsubscribe".to_string()),
                has_attachment: Some(true),
                size: Some(1),
                size_comparison: Some("larger".to_string()),
                ..Default::default()
            },
            action: models::FilterAction {
                add_label_ids: vec!["Label_1".to_string()],
                remove_label_ids: Vec::new(),
                forward: Some("c@d.com".to_string()),
            },
        };

        let api_filter = filter_to_api(&native);
        assert_eq!(api_filter.id, None);
        let action = api_filter.action.clone().unwrap();
        assert_eq!(action.remove_label_ids, None);

        let back = filter_from_api(api::Filter {
            id: Some("ignored".to_string()),
            ..api_filter
        });
        assert_eq!(back, native);
    }

    #[test]
    fn test_empty_action_is_not_sent() {
        let native = models::NativeFilter::default();
        assert!(filter_to_api(&native).action.is_none());
    }
}
