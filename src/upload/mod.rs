//! Network side: session, request envelopes, bulk upload and its reporting

pub mod annotate;
pub mod classify;
pub mod envelope;
pub mod report;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod uploader;

pub use annotate::{annotate_workbook, AnnotateError};
pub use classify::{Classifier, DuplicateVocabulary, Failure, Outcome};
pub use report::{FailureReport, ReportError};
pub use session::{ClientError, Credentials, DigitClient, Session};
pub use telemetry::{Event, Telemetry};
pub use transport::{HttpResponse, Transport, TransportError, UreqTransport};
pub use uploader::{
    BoundaryVerification, BulkUploader, Endpoint, FailedRecord, Language, LanguageUpdate,
    NoProgress, ProgressSink, RecordStatus, RollbackResult, UploadOptions, UploadResult,
};
