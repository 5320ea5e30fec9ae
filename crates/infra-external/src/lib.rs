// NFS-e Infrastructure - External Adapters
// Implements: ObjectStore (filesystem), DocumentSource (fiscal API over HTTP)

mod fs_object_store;
mod http_document_source;

pub use fs_object_store::FilesystemObjectStore;
pub use http_document_source::{HttpDocumentSource, DEFAULT_TIMEOUT};
