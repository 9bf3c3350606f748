//! Document directory use-case service.
//!
//! # Responsibility
//! - Drive the full ingestion pipeline: identity registration, sentence
//!   segmentation, content interning, occurrence allocation.
//! - Surface document lifecycle and lookup operations to callers.
//!
//! # Invariants
//! - A document is indexed completely or not at all; a failed ingestion
//!   leaves ledger, identity table, and registry unchanged.
//! - Deletion and re-ingestion regenerate occurrences, never patch them.

use crate::model::address::Address;
use crate::model::content::{content_id_for, ContentId, ContentUnit, NormalizationPolicy};
use crate::model::document::{Document, DocumentId};
use crate::registry::{RegistryError, ShortIdRegistry};
use crate::repo::content_repo::{ContentRepoError, ContentRepository};
use crate::repo::ledger_repo::{LedgerError, LedgerRepository};
use crate::segment::SentenceSplitter;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors from directory use-case operations.
#[derive(Debug)]
pub enum DirectoryError {
    Registry(RegistryError),
    Ledger(LedgerError),
    Content(ContentRepoError),
    /// Text produced no sentence units; nothing was indexed.
    EmptyDocument(DocumentId),
    /// The whole-document transaction failed and was rolled back.
    TransactionAborted {
        stage: &'static str,
        source: LedgerError,
    },
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Content(err) => write!(f, "{err}"),
            Self::EmptyDocument(id) => {
                write!(f, "document {id} produced no sentence units")
            }
            Self::TransactionAborted { stage, source } => {
                write!(f, "document transaction aborted at {stage}: {source}")
            }
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::Content(err) => Some(err),
            Self::EmptyDocument(_) => None,
            Self::TransactionAborted { source, .. } => Some(source),
        }
    }
}

impl From<RegistryError> for DirectoryError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<LedgerError> for DirectoryError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ContentRepoError> for DirectoryError {
    fn from(value: ContentRepoError) -> Self {
        Self::Content(value)
    }
}

/// Result of a successful (re-)ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub document_id: DocumentId,
    /// Allocated occurrence addresses, position order.
    pub addresses: Vec<Address>,
}

impl IngestReceipt {
    pub fn unit_count(&self) -> u32 {
        self.addresses.len() as u32
    }
}

/// Use-case facade over the directory core.
pub struct DirectoryService<L, C, R, S>
where
    L: LedgerRepository,
    C: ContentRepository,
    R: ShortIdRegistry,
    S: SentenceSplitter,
{
    ledger: L,
    content: C,
    registry: R,
    splitter: S,
    policy: NormalizationPolicy,
}

impl<L, C, R, S> DirectoryService<L, C, R, S>
where
    L: LedgerRepository,
    C: ContentRepository,
    R: ShortIdRegistry,
    S: SentenceSplitter,
{
    pub fn new(ledger: L, content: C, registry: R, splitter: S, policy: NormalizationPolicy) -> Self {
        Self {
            ledger,
            content,
            registry,
            splitter,
            policy,
        }
    }

    /// Active normalization policy; the same instance is used for every
    /// identity derivation in this service.
    pub fn policy(&self) -> &NormalizationPolicy {
        &self.policy
    }

    /// Derives the content id the given text would intern under.
    pub fn identify(&self, raw_text: &str) -> ContentId {
        content_id_for(&self.policy.normalize(raw_text))
    }

    /// Registers a document id and indexes the text as one transaction.
    ///
    /// When `dbid_s` is `None` a fresh short id is generated. On any failure
    /// the registry reservation is released and no state is retained.
    pub fn ingest_document(
        &mut self,
        dbid_l: &str,
        dbid_s: Option<&str>,
        text: &str,
    ) -> DirectoryResult<IngestReceipt> {
        let id = self.registry.register(dbid_l, dbid_s)?;

        let units = self.splitter.split(text);
        if units.is_empty() {
            self.registry.unregister(&id.dbid_l, &id.dbid_s);
            return Err(DirectoryError::EmptyDocument(id));
        }

        match self.ledger.ingest_document(&id, text, &units, &self.policy) {
            Ok(addresses) => {
                info!(
                    "event=document_ingest module=service status=ok dbid_l={} dbid_s={} units={}",
                    id.dbid_l,
                    id.dbid_s,
                    addresses.len()
                );
                Ok(IngestReceipt {
                    document_id: id,
                    addresses,
                })
            }
            Err(source) => {
                self.registry.unregister(&id.dbid_l, &id.dbid_s);
                error!(
                    "event=document_ingest module=service status=error dbid_l={} dbid_s={} error={source}",
                    id.dbid_l, id.dbid_s
                );
                Err(DirectoryError::TransactionAborted {
                    stage: "index",
                    source,
                })
            }
        }
    }

    /// Replaces a document's indexed occurrences wholesale.
    pub fn reingest_document(
        &mut self,
        id: &DocumentId,
        text: &str,
    ) -> DirectoryResult<IngestReceipt> {
        let units = self.splitter.split(text);
        if units.is_empty() {
            return Err(DirectoryError::EmptyDocument(id.clone()));
        }

        match self.ledger.reingest_document(id, text, &units, &self.policy) {
            Ok(addresses) => {
                info!(
                    "event=document_reingest module=service status=ok dbid_l={} dbid_s={} units={}",
                    id.dbid_l,
                    id.dbid_s,
                    addresses.len()
                );
                Ok(IngestReceipt {
                    document_id: id.clone(),
                    addresses,
                })
            }
            Err(source) => {
                error!(
                    "event=document_reingest module=service status=error dbid_l={} dbid_s={} error={source}",
                    id.dbid_l, id.dbid_s
                );
                Err(DirectoryError::TransactionAborted {
                    stage: "reindex",
                    source,
                })
            }
        }
    }

    /// Removes a document, its occurrences, and its registry reservation.
    /// Returns the number of occurrences removed.
    pub fn delete_document(&mut self, id: &DocumentId) -> DirectoryResult<u32> {
        let removed = self.ledger.delete_document(id)?;
        self.registry.unregister(&id.dbid_l, &id.dbid_s);
        info!(
            "event=document_delete module=service status=ok dbid_l={} dbid_s={} occurrences={removed}",
            id.dbid_l, id.dbid_s
        );
        Ok(removed)
    }

    /// Appends one sentence to an existing document, allocating the next
    /// zero-based position.
    pub fn append_sentence(&self, id: &DocumentId, raw_text: &str) -> DirectoryResult<Address> {
        Ok(self.ledger.append_sentence(id, raw_text, &self.policy)?)
    }

    /// Loads one document read model.
    pub fn get_document(&self, id: &DocumentId) -> DirectoryResult<Option<Document>> {
        Ok(self.ledger.get_document(id)?)
    }

    /// Lists documents in creation order.
    pub fn list_documents(&self) -> DirectoryResult<Vec<Document>> {
        Ok(self.ledger.list_documents()?)
    }

    /// Confirms an address is allocated.
    pub fn resolve(&self, address: &Address) -> DirectoryResult<(DocumentId, u32)> {
        Ok(self.ledger.resolve(address)?)
    }

    /// Content unit recorded at one address.
    pub fn sentence_at(&self, address: &Address) -> DirectoryResult<ContentUnit> {
        let content_id = self.ledger.content_at(address)?;
        match self.content.get_unit(content_id)? {
            Some(unit) => Ok(unit),
            None => Err(DirectoryError::Content(ContentRepoError::NotFound(
                content_id,
            ))),
        }
    }

    /// Every address where the content id appears.
    pub fn occurrences_of(&self, content_id: ContentId) -> DirectoryResult<Vec<Address>> {
        Ok(self.ledger.occurrences_of(content_id)?)
    }

    /// Every address where equivalent text appears.
    pub fn occurrences_of_text(&self, raw_text: &str) -> DirectoryResult<Vec<Address>> {
        self.occurrences_of(self.identify(raw_text))
    }

    /// Distinct documents containing equivalent text, first-seen order.
    pub fn find_documents_with_sentence(
        &self,
        raw_text: &str,
    ) -> DirectoryResult<Vec<DocumentId>> {
        let mut documents: Vec<DocumentId> = Vec::new();
        for address in self.occurrences_of_text(raw_text)? {
            if !documents.contains(&address.document) {
                documents.push(address.document);
            }
        }
        Ok(documents)
    }

    /// Position-ordered sentence listing of one document.
    pub fn document_sentences(
        &self,
        id: &DocumentId,
    ) -> DirectoryResult<Vec<(Address, ContentId)>> {
        Ok(self.ledger.document_sentences(id)?)
    }
}
