//! Core types for the relay.

use crate::error::{RelayError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A JSON document as stored by the backend.
pub type Document = serde_json::Value;

/// Position in a change feed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Seq(pub u64);

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check a document id before any I/O is scheduled.
///
/// Ids starting with `_` are reserved unless they name a design or local
/// document.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RelayError::MissingId);
    }
    if id.starts_with('_') && !(id.starts_with("_design/") || id.starts_with("_local/")) {
        return Err(RelayError::ReservedId(id.to_string()));
    }
    Ok(())
}

/// Replace attachment bodies with stub markers, keeping their metadata.
pub fn stub_attachments(doc: &mut Document) {
    let Some(attachments) = doc
        .get_mut("_attachments")
        .and_then(|atts| atts.as_object_mut())
    else {
        return;
    };
    for att in attachments.values_mut() {
        if let Some(att) = att.as_object_mut() {
            att.remove("data");
            att.insert("stub".to_string(), serde_json::Value::Bool(true));
        }
    }
}

// --- Bulk Get ---

/// One document-revision fetch request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,

    /// Revision to fetch (None or empty = current winning revision).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atts_since: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<bool>,
}

impl Request {
    /// Request the current winning revision of a document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Request a specific revision.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    pub fn with_atts_since(mut self, revs: Vec<String>) -> Self {
        self.atts_since = Some(revs);
        self
    }

    pub fn with_attachments(mut self, attachments: bool) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// The requested revision, if it is non-empty.
    pub fn requested_rev(&self) -> Option<&str> {
        self.rev.as_deref().filter(|rev| !rev.is_empty())
    }
}

/// Options applied to every per-document fetch of a bulk-get.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkGetOptions {
    pub revs: Option<bool>,
    pub attachments: Option<bool>,
    pub binary: Option<bool>,
    pub latest: Option<bool>,
    pub atts_since: Option<Vec<String>>,
    /// Transport options passed through untouched.
    pub ajax: Option<serde_json::Value>,
}

/// Options for a single document fetch against the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetOptions {
    /// Explicit revisions to fetch (None = winning revision only).
    pub open_revs: Option<Vec<String>>,
    pub revs: Option<bool>,
    pub attachments: Option<bool>,
    pub binary: Option<bool>,
    pub latest: Option<bool>,
    pub atts_since: Option<Vec<String>>,
    pub ajax: Option<serde_json::Value>,
}

impl GetOptions {
    /// Overlay the recognized bulk-get options onto these fetch options.
    pub(crate) fn apply(&mut self, opts: &BulkGetOptions) {
        if opts.revs.is_some() {
            self.revs = opts.revs;
        }
        if opts.attachments.is_some() {
            self.attachments = opts.attachments;
        }
        if opts.binary.is_some() {
            self.binary = opts.binary;
        }
        if opts.latest.is_some() {
            self.latest = opts.latest;
        }
        if opts.atts_since.is_some() {
            self.atts_since = opts.atts_since.clone();
        }
        if opts.ajax.is_some() {
            self.ajax = opts.ajax.clone();
        }
    }
}

/// What the store returns from a document fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum GetResponse {
    /// The winning revision (no `open_revs` requested).
    Doc(Document),
    /// One entry per requested open revision.
    Revisions(Vec<DocOutcome>),
}

/// Outcome for one revision of one document.
#[derive(Clone, Debug, PartialEq)]
pub enum DocOutcome {
    Ok(Document),
    /// The requested revision does not exist.
    Missing(String),
    Error(RelayError),
}

impl DocOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DocOutcome::Ok(_))
    }

    pub fn doc(&self) -> Option<&Document> {
        match self {
            DocOutcome::Ok(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RelayError> {
        match self {
            DocOutcome::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RelayError> for DocOutcome {
    fn from(err: RelayError) -> Self {
        DocOutcome::Error(err)
    }
}

impl Serialize for DocOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            DocOutcome::Ok(doc) => map.serialize_entry("ok", doc)?,
            DocOutcome::Missing(rev) => map.serialize_entry("missing", rev)?,
            DocOutcome::Error(err) => map.serialize_entry(
                "error",
                &serde_json::json!({
                    "status": err.status(),
                    "message": err.to_string(),
                }),
            )?,
        }
        map.end()
    }
}

// --- Change Feed ---

/// A revision listed in a change event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

/// A single mutation event from the store's change feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    pub seq: Seq,

    #[serde(default)]
    pub changes: Vec<ChangeRev>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,

    #[serde(default)]
    pub deleted: bool,

    /// Set when the subscription's filter failed on this event.
    #[serde(skip)]
    pub error: Option<RelayError>,
}

impl ChangeEvent {
    pub fn new(id: impl Into<String>, seq: u64) -> Self {
        Self {
            id: id.into(),
            seq: Seq(seq),
            changes: Vec::new(),
            doc: None,
            deleted: false,
            error: None,
        }
    }

    pub fn with_doc(mut self, doc: Document) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.changes.push(ChangeRev { rev: rev.into() });
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Change-feed options forwarded verbatim to the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangesOptions {
    pub style: Option<String>,
    pub include_docs: bool,
    pub attachments: bool,
    pub conflicts: bool,
    /// Named store-side filter (e.g. `"app/by_type"`).
    pub filter: Option<String>,
    pub doc_ids: Option<Vec<String>>,
    pub view: Option<String>,
    /// Resume point; events at or below it are not requested.
    pub since: Seq,
    pub query_params: Option<serde_json::Map<String, serde_json::Value>>,
    pub binary: bool,
    pub return_docs: Option<bool>,
}

impl ChangesOptions {
    pub fn include_docs(mut self, include: bool) -> Self {
        self.include_docs = include;
        self
    }

    pub fn attachments(mut self, attachments: bool) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn since(mut self, since: Seq) -> Self {
        self.since = since;
        self
    }

    pub fn doc_ids(mut self, ids: Vec<String>) -> Self {
        self.doc_ids = Some(ids);
        self
    }
}
