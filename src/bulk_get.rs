//! Batched multi-document fetches with bounded concurrency.
//!
//! A bulk-get groups its requests by document id, issues one store fetch per
//! distinct id (all requested revisions together), keeps at most
//! [`MAX_CONCURRENT_REQUESTS`] fetches in flight, and explodes the per-id
//! results back into one entry per original request.

use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::{validate_id, BulkGetOptions, DocOutcome, GetOptions, GetResponse, Request};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Default cap on concurrent per-document fetches, matching common
/// per-host connection limits.
pub const MAX_CONCURRENT_REQUESTS: usize = 6;

/// Bulk-get configuration.
#[derive(Clone, Debug)]
pub struct BulkGetConfig {
    /// Max per-document fetches in flight for one bulk-get.
    /// Default: 6. Zero is treated as 1.
    pub max_concurrent: usize,
}

impl Default for BulkGetConfig {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// Results for one request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BulkGetResult {
    pub id: String,
    pub docs: Vec<DocOutcome>,
}

/// Combined bulk-get output, one entry per input request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BulkGetResponse {
    pub results: Vec<BulkGetResult>,
}

/// All requests targeting one document id.
#[derive(Debug)]
struct RequestGroup<'a> {
    id: &'a str,
    requests: Vec<&'a Request>,
}

impl RequestGroup<'_> {
    /// Requested revisions in caller order, empty entries dropped.
    fn open_revs(&self) -> Vec<String> {
        self.requests
            .iter()
            .filter_map(|r| r.requested_rev())
            .map(str::to_string)
            .collect()
    }

    fn get_options(&self, opts: &BulkGetOptions) -> GetOptions {
        let first = self.requests[0];
        let open_revs = self.open_revs();

        let mut get = GetOptions {
            open_revs: (!open_revs.is_empty()).then_some(open_revs),
            atts_since: first.atts_since.clone(),
            attachments: first.attachments,
            ..Default::default()
        };
        get.apply(opts);
        get
    }

    /// Split one id's docs into one result per request.
    ///
    /// When revisions were requested and the store answered each one,
    /// revision-bearing requests take their answers positionally. Rev-less
    /// requests in such a group receive the open-revs answers, not the
    /// winning revision. Any other answer is shared by every request.
    fn explode(&self, docs: Vec<DocOutcome>, out: &mut Vec<BulkGetResult>) {
        let with_rev = self
            .requests
            .iter()
            .filter(|r| r.requested_rev().is_some())
            .count();
        let paired = with_rev > 0 && with_rev == docs.len();
        let mut next = docs.iter();

        for request in &self.requests {
            let docs = if paired && request.requested_rev().is_some() {
                next.next().cloned().into_iter().collect()
            } else {
                docs.clone()
            };
            out.push(BulkGetResult {
                id: self.id.to_string(),
                docs,
            });
        }
    }
}

/// Group requests by id, keeping first-seen id order.
fn group_requests(requests: &[Request]) -> Vec<RequestGroup<'_>> {
    let mut groups: Vec<RequestGroup<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for request in requests {
        match index.get(request.id.as_str()) {
            Some(&i) => groups[i].requests.push(request),
            None => {
                index.insert(&request.id, groups.len());
                groups.push(RequestGroup {
                    id: &request.id,
                    requests: vec![request],
                });
            }
        }
    }

    groups
}

/// Runs bulk-gets against a store.
#[derive(Clone, Debug, Default)]
pub struct BulkGetCoordinator {
    config: BulkGetConfig,
}

impl BulkGetCoordinator {
    pub fn new(config: BulkGetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BulkGetConfig {
        &self.config
    }

    /// Check every request id. Call before scheduling any fetch.
    pub fn validate(requests: &[Request]) -> Result<()> {
        requests.iter().try_for_each(|r| validate_id(&r.id))
    }

    /// Fetch every request, at most `max_concurrent` ids at a time.
    ///
    /// Never fails as a whole: a failed fetch becomes an inline error for the
    /// requests of that id. Resolves once every distinct id has resolved.
    pub async fn bulk_get(
        &self,
        store: &dyn DocumentStore,
        requests: &[Request],
        opts: &BulkGetOptions,
    ) -> BulkGetResponse {
        let groups = group_requests(requests);
        let limit = self.config.max_concurrent.max(1);
        debug!(
            requests = requests.len(),
            ids = groups.len(),
            limit,
            "bulk get"
        );

        let mut slots: Vec<Option<Vec<DocOutcome>>> = vec![None; groups.len()];
        let mut fetches = stream::iter(groups.iter().enumerate())
            .map(|(i, group)| async move { (i, fetch_group(store, group, opts).await) })
            .buffer_unordered(limit);

        while let Some((i, docs)) = fetches.next().await {
            slots[i] = Some(docs);
        }
        drop(fetches);

        let mut results = Vec::with_capacity(requests.len());
        for (group, docs) in groups.iter().zip(slots) {
            group.explode(docs.unwrap_or_default(), &mut results);
        }
        BulkGetResponse { results }
    }
}

async fn fetch_group(
    store: &dyn DocumentStore,
    group: &RequestGroup<'_>,
    opts: &BulkGetOptions,
) -> Vec<DocOutcome> {
    match store.get(group.id, group.get_options(opts)).await {
        Ok(GetResponse::Doc(doc)) => vec![DocOutcome::Ok(doc)],
        Ok(GetResponse::Revisions(docs)) => docs,
        Err(err) => {
            debug!(id = group.id, error = %err, "bulk get fetch failed");
            vec![DocOutcome::Error(err)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use serde_json::json;

    #[test]
    fn test_group_preserves_first_seen_order() {
        let requests = vec![
            Request::new("b"),
            Request::new("a").with_rev("1-x"),
            Request::new("b").with_rev("2-y"),
            Request::new("c"),
            Request::new("a").with_rev("2-z"),
        ];
        let groups = group_requests(&requests);

        let ids: Vec<_> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(groups[1].open_revs(), vec!["1-x", "2-z"]);
        assert_eq!(groups[0].open_revs(), vec!["2-y"]);
        assert!(groups[2].open_revs().is_empty());
    }

    #[test]
    fn test_get_options_winning_revision() {
        let requests = vec![Request::new("a").with_rev("")];
        let groups = group_requests(&requests);
        let get = groups[0].get_options(&BulkGetOptions::default());
        assert_eq!(get.open_revs, None);
    }

    #[test]
    fn test_get_options_uses_first_request_and_global_opts() {
        let requests = vec![
            Request::new("a")
                .with_rev("1-x")
                .with_attachments(true)
                .with_atts_since(vec!["1-a".into()]),
            Request::new("a").with_rev("2-y").with_attachments(false),
        ];
        let groups = group_requests(&requests);
        let get = groups[0].get_options(&BulkGetOptions {
            revs: Some(true),
            latest: Some(true),
            ..Default::default()
        });

        assert_eq!(get.open_revs, Some(vec!["1-x".into(), "2-y".into()]));
        assert_eq!(get.attachments, Some(true));
        assert_eq!(get.atts_since, Some(vec!["1-a".into()]));
        assert_eq!(get.revs, Some(true));
        assert_eq!(get.latest, Some(true));
        assert_eq!(get.binary, None);
    }

    #[test]
    fn test_explode_pairs_revisions() {
        let requests = vec![
            Request::new("a").with_rev("1-x"),
            Request::new("a").with_rev("2-y"),
        ];
        let groups = group_requests(&requests);
        let docs = vec![
            DocOutcome::Ok(json!({"_id": "a", "_rev": "1-x"})),
            DocOutcome::Missing("2-y".into()),
        ];

        let mut out = Vec::new();
        groups[0].explode(docs, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].docs, vec![DocOutcome::Ok(json!({"_id": "a", "_rev": "1-x"}))]);
        assert_eq!(out[1].docs, vec![DocOutcome::Missing("2-y".into())]);
    }

    #[test]
    fn test_explode_shares_single_outcome() {
        let requests = vec![
            Request::new("a").with_rev("1-x"),
            Request::new("a").with_rev("2-y"),
        ];
        let groups = group_requests(&requests);

        let mut out = Vec::new();
        groups[0].explode(vec![RelayError::missing("a").into()], &mut out);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.id == "a" && r.docs[0].error().is_some()));
    }

    #[test]
    fn test_explode_mixed_group() {
        let requests = vec![
            Request::new("a").with_rev("1-x"),
            Request::new("a"),
            Request::new("a").with_rev("2-y"),
        ];
        let groups = group_requests(&requests);
        let docs = vec![
            DocOutcome::Ok(json!({"_rev": "1-x"})),
            DocOutcome::Ok(json!({"_rev": "2-y"})),
        ];

        let mut out = Vec::new();
        groups[0].explode(docs, &mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].docs.len(), 1);
        assert_eq!(out[1].docs.len(), 2);
        assert_eq!(out[2].docs, vec![DocOutcome::Ok(json!({"_rev": "2-y"}))]);
    }

    #[test]
    fn test_explode_mixed_group_single_revision() {
        let requests = vec![Request::new("a"), Request::new("a").with_rev("1-a")];
        let groups = group_requests(&requests);
        let get = groups[0].get_options(&BulkGetOptions::default());
        assert_eq!(get.open_revs, Some(vec!["1-a".into()]));

        let mut out = Vec::new();
        groups[0].explode(vec![DocOutcome::Ok(json!({"_rev": "1-a"}))], &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].docs, vec![DocOutcome::Ok(json!({"_rev": "1-a"}))]);
        // No separate winner fetch; the rev-less entry carries the open-revs answer.
        assert_eq!(out[0].docs, out[1].docs);
    }

    #[test]
    fn test_validate() {
        assert!(BulkGetCoordinator::validate(&[Request::new("a"), Request::new("_design/x")]).is_ok());
        assert_eq!(
            BulkGetCoordinator::validate(&[Request::new("a"), Request::new("_bad")]),
            Err(RelayError::ReservedId("_bad".into()))
        );
    }

    #[test]
    fn test_response_shape() {
        let response = BulkGetResponse {
            results: vec![BulkGetResult {
                id: "a".into(),
                docs: vec![DocOutcome::Ok(json!({"_id": "a"}))],
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"results": [{"id": "a", "docs": [{"ok": {"_id": "a"}}]}]})
        );
    }
}
