//! The document store contract the relay coordinates.
//!
//! The relay never touches storage itself. Everything it issues goes through
//! this trait: single-document fetches for bulk-get and change-feed requests
//! for subscriptions.

use crate::error::Result;
use crate::types::{ChangeEvent, ChangesOptions, GetOptions, GetResponse};
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// A document-oriented storage backend.
///
/// Methods return boxed futures and streams so the trait stays object-safe;
/// the relay holds stores as `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    ///
    /// With `opts.open_revs` set the store answers with
    /// [`GetResponse::Revisions`], one entry per requested revision in the
    /// requested order. Otherwise it answers with the winning revision as
    /// [`GetResponse::Doc`]. Failures carry a status code
    /// (see [`RelayError::status`](crate::RelayError::status)).
    fn get<'a>(&'a self, id: &'a str, opts: GetOptions) -> BoxFuture<'a, Result<GetResponse>>;

    /// Request one batch of changes.
    ///
    /// Each item is one change event; an `Err` item aborts the request and
    /// the end of the stream marks completion. Events must be ordered by seq.
    fn changes(&self, opts: ChangesOptions) -> BoxStream<'_, Result<ChangeEvent>>;
}
