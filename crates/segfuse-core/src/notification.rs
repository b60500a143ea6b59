//! Storage notification routing.
//!
//! Storage-change events arrive as JSON objects carrying an `eventType`
//! string and a `data` object. They are decoded into
//! [`StorageNotification`] and dispatched through a fixed handler table
//! keyed by [`NotificationKind`]:
//!
//! | kind                     | action                                          |
//! |--------------------------|-------------------------------------------------|
//! | `SubscriptionValidation` | echo the validation code, stop the batch        |
//! | `DocumentAdded`          | fetch the document, provision, index its records |
//! | `DocumentRemoved`        | log; prune known points when configured         |
//! | `Unrecognized`           | ignore                                          |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::collection::CollectionManager;
use crate::config::{CollectionConfig, Config};
use crate::corpus::parse_corpus;
use crate::embedding::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::indexer::{IndexReport, Indexer};
use crate::retry::RetryPolicy;
use crate::store::VectorStore;

const VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
const CREATED_EVENT: &str = "Microsoft.Storage.BlobCreated";
const DELETED_EVENT: &str = "Microsoft.Storage.BlobDeleted";

/// Discriminant used to pick a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SubscriptionValidation,
    DocumentAdded,
    DocumentRemoved,
    Unrecognized,
}

/// A decoded storage notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageNotification {
    /// Webhook handshake; the code must be echoed back.
    SubscriptionValidation { validation_code: String },
    /// A document was written to storage.
    DocumentAdded { url: String },
    /// A document was deleted from storage.
    DocumentRemoved { url: String },
    /// Any other event type.
    Unrecognized { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ValidationData {
    #[serde(rename = "validationCode")]
    validation_code: String,
}

#[derive(Deserialize)]
struct DocumentData {
    url: String,
}

impl StorageNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::SubscriptionValidation { .. } => NotificationKind::SubscriptionValidation,
            Self::DocumentAdded { .. } => NotificationKind::DocumentAdded,
            Self::DocumentRemoved { .. } => NotificationKind::DocumentRemoved,
            Self::Unrecognized { .. } => NotificationKind::Unrecognized,
        }
    }

    /// Decode one event object.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawEvent = serde_json::from_value(value)?;
        Ok(match raw.event_type.as_str() {
            VALIDATION_EVENT => {
                let data: ValidationData = serde_json::from_value(raw.data)?;
                Self::SubscriptionValidation {
                    validation_code: data.validation_code,
                }
            }
            CREATED_EVENT => Self::DocumentAdded {
                url: serde_json::from_value::<DocumentData>(raw.data)?.url,
            },
            DELETED_EVENT => Self::DocumentRemoved {
                url: serde_json::from_value::<DocumentData>(raw.data)?.url,
            },
            _ => Self::Unrecognized {
                event_type: raw.event_type,
            },
        })
    }
}

/// Decode a notification body: a JSON array of events or a single event.
pub fn parse_notifications(raw: &str) -> Result<Vec<StorageNotification>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(events) => events
            .into_iter()
            .map(StorageNotification::from_value)
            .collect(),
        single => Ok(vec![StorageNotification::from_value(single)?]),
    }
}

/// Document name from a storage URL: the text after the last `/`, without
/// query string or fragment.
pub fn document_name(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rfind('/').map_or(path, |i| &path[i + 1..])
}

/// Where the contents of an added document come from.
pub trait DocumentSource {
    /// Return the document's contents, a JSON array of records.
    fn fetch(&self, name: &str) -> Result<String>;
}

/// Reads documents from a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentSource for DirectorySource {
    fn fetch(&self, name: &str) -> Result<String> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid document name {name:?}"),
            )
            .into());
        }
        Ok(std::fs::read_to_string(self.root.join(name))?)
    }
}

/// What handling a notification produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    ValidationResponse {
        #[serde(rename = "validationResponse")]
        validation_response: String,
    },
    Indexed {
        document: String,
        report: IndexReport,
    },
    RemovalObserved {
        document: String,
        pruned: usize,
    },
    Ignored {
        event_type: String,
        reason: String,
    },
}

impl NotificationOutcome {
    /// The handshake body expected by the sender, for validation outcomes.
    pub fn validation_body(&self) -> Option<Value> {
        match self {
            Self::ValidationResponse {
                validation_response,
            } => Some(serde_json::json!({ "validationResponse": validation_response })),
            _ => None,
        }
    }
}

type Handler =
    fn(&mut NotificationRouter<'_>, &StorageNotification) -> Result<NotificationOutcome>;

const HANDLERS: [(NotificationKind, Handler); 4] = [
    (NotificationKind::SubscriptionValidation, handle_validation),
    (NotificationKind::DocumentAdded, handle_added),
    (NotificationKind::DocumentRemoved, handle_removed),
    (NotificationKind::Unrecognized, handle_unrecognized),
];

pub struct NotificationRouter<'a> {
    generator: &'a EmbeddingGenerator,
    source: &'a dyn DocumentSource,
    manager: CollectionManager<'a>,
    indexer: Indexer<'a>,
    collection: CollectionConfig,
    prune_on_remove: bool,
    indexed_ids: HashMap<String, Vec<u64>>,
}

impl<'a> NotificationRouter<'a> {
    pub fn new(
        generator: &'a EmbeddingGenerator,
        store: &'a dyn VectorStore,
        source: &'a dyn DocumentSource,
        config: &Config,
    ) -> Self {
        let retry: RetryPolicy = config.retry.to_policy();
        Self {
            generator,
            source,
            manager: CollectionManager::new(store).with_retry_policy(retry),
            indexer: Indexer::new(generator, store, config),
            collection: config.collection.clone(),
            prune_on_remove: config.notifications.prune_on_remove,
            indexed_ids: HashMap::new(),
        }
    }

    /// Ids this router indexed for `document`.
    pub fn indexed_ids(&self, document: &str) -> Option<&[u64]> {
        self.indexed_ids.get(document).map(Vec::as_slice)
    }

    /// Add `ids` to the points known for `document`. Ids from earlier
    /// versions of the document are kept so a removal prunes them too.
    fn remember(&mut self, document: &str, ids: impl IntoIterator<Item = u64>) {
        let known = self.indexed_ids.entry(document.to_string()).or_default();
        known.extend(ids);
        known.sort_unstable();
        known.dedup();
    }

    /// Handle one notification.
    pub fn dispatch(&mut self, notification: &StorageNotification) -> Result<NotificationOutcome> {
        let kind = notification.kind();
        let handler = HANDLERS
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(handle_unrecognized as Handler, |(_, h)| *h);
        debug!(?kind, "Dispatching notification");
        handler(self, notification)
    }

    /// Handle events in order. A validation event answers the whole batch
    /// and stops processing; any error stops processing.
    pub fn handle_batch(
        &mut self,
        notifications: &[StorageNotification],
    ) -> Result<Vec<NotificationOutcome>> {
        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in notifications {
            let outcome = self.dispatch(notification)?;
            let stop = matches!(outcome, NotificationOutcome::ValidationResponse { .. });
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        Ok(outcomes)
    }
}

fn handle_validation(
    router: &mut NotificationRouter<'_>,
    notification: &StorageNotification,
) -> Result<NotificationOutcome> {
    let StorageNotification::SubscriptionValidation { validation_code } = notification else {
        return handle_unrecognized(router, notification);
    };
    info!(event_type = VALIDATION_EVENT, "Answering subscription validation");
    Ok(NotificationOutcome::ValidationResponse {
        validation_response: validation_code.clone(),
    })
}

fn handle_added(
    router: &mut NotificationRouter<'_>,
    notification: &StorageNotification,
) -> Result<NotificationOutcome> {
    let StorageNotification::DocumentAdded { url } = notification else {
        return handle_unrecognized(router, notification);
    };
    let name = document_name(url);
    if name.is_empty() {
        warn!(url = %url, "Added document URL has no name");
        return Ok(NotificationOutcome::Ignored {
            event_type: CREATED_EVENT.to_string(),
            reason: format!("no document name in {url}"),
        });
    }
    info!(event_type = CREATED_EVENT, document = name, "Document added");

    let corpus = parse_corpus(&router.source.fetch(name)?)?;
    let Some(sample) = corpus.sample() else {
        debug!(document = name, "Document has no indexable records");
        return Ok(NotificationOutcome::Indexed {
            document: name.to_string(),
            report: IndexReport {
                rejected: corpus.rejected,
                ..IndexReport::default()
            },
        });
    };
    router
        .manager
        .provision(router.generator, &router.collection, sample)?;

    let mut report = match router.indexer.index(&corpus.records) {
        Ok(report) => report,
        Err(e) => {
            if let Error::BatchAborted { written, .. } = &e {
                router.remember(name, written.iter().copied());
            }
            return Err(e);
        }
    };
    router.remember(name, report.written_ids());
    let mut rejected = corpus.rejected;
    rejected.append(&mut report.rejected);
    report.rejected = rejected;

    Ok(NotificationOutcome::Indexed {
        document: name.to_string(),
        report,
    })
}

fn handle_removed(
    router: &mut NotificationRouter<'_>,
    notification: &StorageNotification,
) -> Result<NotificationOutcome> {
    let StorageNotification::DocumentRemoved { url } = notification else {
        return handle_unrecognized(router, notification);
    };
    let name = document_name(url);
    info!(event_type = DELETED_EVENT, document = name, "Document removed");

    let mut pruned = 0;
    if router.prune_on_remove {
        if let Some(ids) = router.indexed_ids.get(name) {
            router.indexer.remove(ids)?;
            pruned = ids.len();
            router.indexed_ids.remove(name);
        } else {
            debug!(document = name, "No points known for removed document");
        }
    }
    Ok(NotificationOutcome::RemovalObserved {
        document: name.to_string(),
        pruned,
    })
}

fn handle_unrecognized(
    _router: &mut NotificationRouter<'_>,
    notification: &StorageNotification,
) -> Result<NotificationOutcome> {
    let event_type = match notification {
        StorageNotification::Unrecognized { event_type } => event_type.clone(),
        other => format!("{:?}", other.kind()),
    };
    debug!(event_type = %event_type, "Ignoring notification");
    Ok(NotificationOutcome::Ignored {
        event_type,
        reason: "unhandled event type".to_string(),
    })
}
