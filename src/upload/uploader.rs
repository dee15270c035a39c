//! Bulk upload with created / exists / failed accounting

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::record::{LocalizationMessage, MasterRecord, RecordKind};
use crate::hierarchy::count_tree_nodes;
use crate::reader::boundary::HierarchyDefinition;
use crate::upload::classify::{Classifier, DuplicateVocabulary, Failure, Outcome};
use crate::upload::envelope;
use crate::upload::session::{ClientError, DigitClient};
use crate::upload::transport::Transport;

pub const LOCALIZATION_PATH: &str = "/localization/messages/v1/_upsert";
pub const EMPLOYEE_PATH: &str = "/egov-hrms/employees/_create";
pub const BOUNDARY_PATH: &str = "/boundary-service/boundary/_create";
pub const RELATIONSHIP_PATH: &str = "/boundary-service/boundary-relationships/_create";
pub const RELATIONSHIP_SEARCH_PATH: &str = "/boundary-service/boundary-relationships/_search";
pub const HIERARCHY_PATH: &str = "/boundary-service/boundary-hierarchy-definition/_create";
pub const BUSINESS_SERVICE_PATH: &str = "/egov-workflow-v2/egov-wf/businessservice/_create";
pub const MDMS_SEARCH_PATH: &str = "/mdms-v2/v2/_search";

/// State-level record that carries the language picker
pub const STATE_INFO_SCHEMA: &str = "common-masters.StateInfo";

/// Tenant records, also carrying a language picker each
pub const TENANT_SCHEMA: &str = "tenant.tenants";

/// Where a record goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// MDMS v2 create for a schema code
    Mdms(String),
    Employee,
    BoundaryEntity,
    BoundaryRelationship,
}

impl Endpoint {
    /// Default endpoint for a record kind
    pub fn for_kind(kind: RecordKind) -> Option<Self> {
        match kind {
            RecordKind::Employee => Some(Endpoint::Employee),
            RecordKind::BoundaryEntity => Some(Endpoint::BoundaryEntity),
            RecordKind::BoundaryRelationship => Some(Endpoint::BoundaryRelationship),
            other => other.schema_code().map(|s| Endpoint::Mdms(s.to_string())),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::Mdms(schema) => format!("/mdms-v2/v2/_create/{}", schema),
            Endpoint::Employee => EMPLOYEE_PATH.to_string(),
            Endpoint::BoundaryEntity => BOUNDARY_PATH.to_string(),
            Endpoint::BoundaryRelationship => RELATIONSHIP_PATH.to_string(),
        }
    }
}

/// Pacing for the upload loops
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub throttle: Duration,
    pub locale_throttle: Duration,
    pub relationship_settle: Duration,
    /// Records requested per MDMS search page
    pub search_page: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(100),
            locale_throttle: Duration::from_millis(200),
            relationship_settle: Duration::from_secs(2),
            search_page: 1000,
        }
    }
}

impl UploadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            throttle: config.throttle(),
            locale_throttle: config.locale_throttle(),
            relationship_settle: config.relationship_settle(),
            ..Self::default()
        }
    }

    /// No waits at all
    pub fn immediate() -> Self {
        Self {
            throttle: Duration::ZERO,
            locale_throttle: Duration::ZERO,
            relationship_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A failure kept for reporting
#[derive(Debug, Clone, Serialize)]
pub struct UploadError {
    pub id: String,
    pub message: String,
}

/// Outcome of one record, tied back to its source row
#[derive(Debug, Clone)]
pub struct RecordStatus {
    pub id: String,
    pub source_row: Option<usize>,
    pub outcome: Outcome,
}

/// A failed record with its payload, for the error workbook
#[derive(Debug, Clone)]
pub struct FailedRecord {
    pub kind: Option<RecordKind>,
    pub data: Value,
    pub failure: Failure,
}

/// Counts for one batch
#[derive(Debug, Clone, Default)]
pub struct UploadResult {
    pub created: usize,
    pub exists: usize,
    pub failed: usize,
    pub errors: Vec<UploadError>,
    pub statuses: Vec<RecordStatus>,
    pub failed_records: Vec<FailedRecord>,
}

impl UploadResult {
    pub fn total(&self) -> usize {
        self.created + self.exists + self.failed
    }

    /// Exists counts as success
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Count `n` items against one outcome
    fn tally(&mut self, outcome: &Outcome, n: usize) {
        match outcome {
            Outcome::Created => self.created += n,
            Outcome::AlreadyExists => self.exists += n,
            Outcome::Failed(_) => self.failed += n,
        }
    }

    pub fn merge(&mut self, other: UploadResult) {
        self.created += other.created;
        self.exists += other.exists;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self.statuses.extend(other.statuses);
        self.failed_records.extend(other.failed_records);
    }
}

/// Per-call progress notifications
pub trait ProgressSink {
    /// `position` is 1-based within `total`
    fn on_result(&self, position: usize, total: usize, id: &str, outcome: &Outcome);
}

/// Discards progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_result(&self, _: usize, _: usize, _: &str, _: &Outcome) {}
}

/// Result of comparing a boundary tree against an expected size
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundaryVerification {
    pub found: usize,
    pub expected: usize,
    pub passed: bool,
}

/// Deactivation counts for one schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    pub schema_code: String,
    pub deactivated: usize,
    pub failed: usize,
}

/// Entry of a language picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Language {
    pub label: String,
    pub value: String,
}

impl Language {
    pub fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
        }
    }
}

/// Counts for one language-picker pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct LanguageUpdate {
    pub schema_code: String,
    pub updated: usize,
    /// Already listed the language, or not found
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<UploadError>,
}

impl LanguageUpdate {
    fn new(schema_code: &str) -> Self {
        Self {
            schema_code: schema_code.to_string(),
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: LanguageUpdate) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Append `language` to the record's `data.languages`
///
/// Returns false when an entry with the same value is already listed.
pub fn with_language(record: &mut Value, language: &Language) -> bool {
    let Some(data) = record.get_mut("data").and_then(Value::as_object_mut) else {
        return false;
    };
    let languages = data.entry("languages").or_insert_with(|| json!([]));
    if !languages.is_array() {
        *languages = json!([]);
    }
    let Some(list) = languages.as_array_mut() else {
        return false;
    };
    if list
        .iter()
        .any(|l| l.get("value").and_then(Value::as_str) == Some(language.value.as_str()))
    {
        return false;
    }
    list.push(json!({ "label": language.label, "value": language.value }));
    true
}

/// Sequential uploader over an authenticated client
pub struct BulkUploader<'c, T: Transport> {
    client: &'c DigitClient<T>,
    records: DuplicateVocabulary,
    localization: DuplicateVocabulary,
    options: UploadOptions,
    progress: &'c dyn ProgressSink,
}

impl<'c, T: Transport> BulkUploader<'c, T> {
    pub fn new(client: &'c DigitClient<T>) -> Self {
        Self {
            client,
            records: DuplicateVocabulary::records(),
            localization: DuplicateVocabulary::localization(),
            options: UploadOptions::default(),
            progress: &NoProgress,
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Extra duplicate phrases, applied to both vocabularies
    pub fn with_duplicate_markers(mut self, markers: &[String]) -> Self {
        self.records = self.records.extend(markers);
        self.localization = self.localization.extend(markers);
        self
    }

    pub fn with_progress(mut self, progress: &'c dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// One call per record, in order; no failure stops the batch
    ///
    /// Only a missing session is an error. Everything else is counted.
    pub fn upload(
        &self,
        records: &[MasterRecord],
        endpoint: &Endpoint,
        tenant_id: &str,
    ) -> Result<UploadResult, ClientError> {
        let info = self.client.request_info()?;
        let path = endpoint.path();
        let total = records.len();
        let mut result = UploadResult::default();

        tracing::debug!(path = %path, tenant = tenant_id, total, "uploading batch");

        for (i, record) in records.iter().enumerate() {
            let position = i + 1;
            let id = record.unique_identifier(position);
            let body = self.record_body(info.clone(), endpoint, tenant_id, &id, record);

            let response = self.client.post(&path, &[], &body);
            let outcome = self.records.classify(&response);
            tracing::debug!(id = %id, outcome = outcome.status_label(), "classified");

            if outcome.is_ok() && *endpoint == Endpoint::BoundaryRelationship {
                // Relationships are persisted asynchronously; children need
                // their parent committed first
                pause(self.options.relationship_settle);
            }

            self.progress.on_result(position, total, &id, &outcome);
            self.record_outcome(&mut result, record, id, outcome);

            if position < total {
                pause(self.options.throttle);
            }
        }

        Ok(result)
    }

    fn record_body(
        &self,
        info: Value,
        endpoint: &Endpoint,
        tenant_id: &str,
        id: &str,
        record: &MasterRecord,
    ) -> Value {
        let data = Value::Object(record.data.clone());
        match endpoint {
            Endpoint::Mdms(schema) => envelope::mdms_record(info, tenant_id, schema, id, &data, true),
            Endpoint::Employee => envelope::keyed(info, "Employees", json!([data])),
            Endpoint::BoundaryEntity => envelope::keyed(info, "Boundary", json!([data])),
            Endpoint::BoundaryRelationship => envelope::keyed(info, "BoundaryRelationship", data),
        }
    }

    fn record_outcome(&self, result: &mut UploadResult, record: &MasterRecord, id: String, outcome: Outcome) {
        result.tally(&outcome, 1);
        if let Outcome::Failed(failure) = &outcome {
            result.errors.push(UploadError {
                id: id.clone(),
                message: failure.message.clone(),
            });
            result.failed_records.push(FailedRecord {
                kind: Some(record.kind),
                data: Value::Object(record.data.clone()),
                failure: failure.clone(),
            });
        }
        result.statuses.push(RecordStatus {
            id,
            source_row: record.source_row,
            outcome,
        });
    }

    /// One call per locale, all messages of that locale together
    ///
    /// Counts are per message: a failed call fails every message it carried.
    pub fn upload_localizations(
        &self,
        messages: &[LocalizationMessage],
        tenant_id: &str,
    ) -> Result<UploadResult, ClientError> {
        let info = self.client.request_info()?;
        let groups = group_by_locale(messages);
        let total = groups.len();
        let mut result = UploadResult::default();

        for (i, (locale, batch)) in groups.iter().enumerate() {
            let position = i + 1;
            let owned: Vec<LocalizationMessage> = batch.iter().map(|m| (*m).clone()).collect();
            let body = envelope::localization_batch(info.clone(), tenant_id, locale, &owned);

            let response = self.client.post(LOCALIZATION_PATH, &[], &body);
            let outcome = self.localization.classify(&response);
            tracing::debug!(locale = %locale, count = batch.len(), outcome = outcome.status_label(), "locale batch");

            self.progress
                .on_result(position, total, &format!("{} ({} messages)", locale, batch.len()), &outcome);
            result.tally(&outcome, batch.len());

            if let Outcome::Failed(failure) = &outcome {
                result.errors.push(UploadError {
                    id: locale.clone(),
                    message: failure.message.clone(),
                });
                for message in batch {
                    result.failed_records.push(FailedRecord {
                        kind: None,
                        data: serde_json::to_value(message).unwrap_or(Value::Null),
                        failure: failure.clone(),
                    });
                }
            }
            for message in batch {
                result.statuses.push(RecordStatus {
                    id: message.code.clone(),
                    source_row: None,
                    outcome: outcome.clone(),
                });
            }

            if position < total {
                pause(self.options.locale_throttle);
            }
        }

        Ok(result)
    }

    /// Create the hierarchy definition with a single call
    pub fn create_hierarchy(&self, definition: &HierarchyDefinition) -> Result<Outcome, ClientError> {
        let info = self.client.request_info()?;
        let payload = serde_json::to_value(definition).unwrap_or(Value::Null);
        let body = envelope::keyed(info, "BoundaryHierarchy", payload);
        let response = self.client.post(HIERARCHY_PATH, &[], &body);
        Ok(self.records.classify(&response))
    }

    /// Create a workflow business service with a single call
    pub fn create_business_service(&self, service: &Value) -> Result<Outcome, ClientError> {
        let info = self.client.request_info()?;
        let body = envelope::keyed(info, "BusinessServices", json!([service]));
        let response = self.client.post(BUSINESS_SERVICE_PATH, &[], &body);
        Ok(self.records.classify(&response))
    }

    /// Count persisted boundaries; passes when at least `expected` exist
    pub fn verify_boundaries(
        &self,
        tenant_id: &str,
        hierarchy_type: &str,
        expected: usize,
    ) -> Result<BoundaryVerification, ClientError> {
        let info = self.client.request_info()?;
        let body = json!({ "RequestInfo": info });
        let query = [
            ("tenantId", tenant_id),
            ("hierarchyType", hierarchy_type),
            ("includeChildren", "true"),
        ];
        let resp = self.client.post(RELATIONSHIP_SEARCH_PATH, &query, &body)?;
        if !resp.is_success() {
            return Err(ClientError::UnexpectedResponse {
                path: RELATIONSHIP_SEARCH_PATH.to_string(),
                message: format!("HTTP {}: {}", resp.status, resp.body.chars().take(300).collect::<String>()),
            });
        }

        let found = resp
            .json()
            .and_then(|v| {
                v.get("TenantBoundary")
                    .and_then(|tb| tb.get(0))
                    .and_then(|tb| tb.get("boundary"))
                    .and_then(Value::as_array)
                    .map(|b| count_tree_nodes(b))
            })
            .unwrap_or(0);

        Ok(BoundaryVerification {
            found,
            expected,
            passed: found >= expected,
        })
    }

    /// Every active record of a schema, one page at a time
    ///
    /// Stops at the first page shorter than the page size.
    fn search_active(&self, info: &Value, tenant_id: &str, schema: &str) -> Result<Vec<Value>, String> {
        let limit = self.options.search_page.max(1);
        let mut found = Vec::new();
        let mut offset = 0;
        loop {
            let body = envelope::mdms_search(info.clone(), tenant_id, schema, limit, offset);
            let page = self.search(&body)?;
            let len = page.len();
            found.extend(page);
            if len < limit {
                return Ok(found);
            }
            offset += limit;
        }
    }

    fn search(&self, body: &Value) -> Result<Vec<Value>, String> {
        match self.client.post(MDMS_SEARCH_PATH, &[], body) {
            Ok(resp) if resp.is_success() => Ok(resp
                .json()
                .and_then(|v| v.get("mdms").and_then(Value::as_array).cloned())
                .unwrap_or_default()),
            Ok(resp) => Err(format!(
                "HTTP {}: {}",
                resp.status,
                resp.body.chars().take(300).collect::<String>()
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Deactivate every active record of each schema
    ///
    /// All pages are read before anything is deactivated, since the search
    /// only returns active records.
    pub fn rollback(&self, schema_codes: &[&str], tenant_id: &str) -> Result<Vec<RollbackResult>, ClientError> {
        let info = self.client.request_info()?;
        let mut results = Vec::new();

        for schema in schema_codes {
            let mut outcome = RollbackResult {
                schema_code: schema.to_string(),
                ..Default::default()
            };

            let found = match self.search_active(&info, tenant_id, schema) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(schema, error = %e, "MDMS search failed");
                    outcome.failed += 1;
                    results.push(outcome);
                    continue;
                }
            };
            tracing::debug!(schema, found = found.len(), "rolling back");

            let path = format!("/mdms-v2/v2/_update/{}", schema);
            for (i, mut entry) in found.into_iter().enumerate() {
                if entry.get("isActive") == Some(&Value::Bool(false)) {
                    continue;
                }
                entry["isActive"] = Value::Bool(false);
                let body = json!({ "RequestInfo": info.clone(), "Mdms": entry });
                match self.records.classify(&self.client.post(&path, &[], &body)) {
                    Outcome::Failed(f) => {
                        tracing::warn!(schema, error = %f, "deactivate failed");
                        outcome.failed += 1;
                    }
                    _ => outcome.deactivated += 1,
                }
                if i > 0 {
                    pause(self.options.throttle);
                }
            }
            results.push(outcome);
        }

        Ok(results)
    }

    /// Add a language to the picker of each listed tenant
    ///
    /// Tenant records live in `state_tenant`. A tenant that cannot be found
    /// is skipped and reported.
    pub fn add_tenant_language(
        &self,
        tenant_ids: &[String],
        state_tenant: &str,
        language: &Language,
    ) -> Result<LanguageUpdate, ClientError> {
        let info = self.client.request_info()?;
        let mut update = LanguageUpdate::new(TENANT_SCHEMA);

        for (i, tenant_id) in tenant_ids.iter().enumerate() {
            if i > 0 {
                pause(self.options.locale_throttle);
            }
            let body = envelope::mdms_lookup(info.clone(), state_tenant, TENANT_SCHEMA, &[tenant_id.as_str()]);
            let record = match self.search(&body) {
                Ok(found) => found.into_iter().next(),
                Err(e) => {
                    tracing::warn!(tenant = %tenant_id, error = %e, "tenant search failed");
                    update.failed += 1;
                    update.errors.push(UploadError {
                        id: tenant_id.clone(),
                        message: e,
                    });
                    continue;
                }
            };
            match record {
                Some(record) => self.apply_language(&info, record, tenant_id, language, &mut update),
                None => {
                    update.skipped += 1;
                    update.errors.push(UploadError {
                        id: tenant_id.clone(),
                        message: "Tenant not found".to_string(),
                    });
                }
            }
        }

        Ok(update)
    }

    /// Add a language to the state-level picker
    pub fn add_stateinfo_language(&self, state_tenant: &str, language: &Language) -> Result<LanguageUpdate, ClientError> {
        let info = self.client.request_info()?;
        let mut update = LanguageUpdate::new(STATE_INFO_SCHEMA);

        let found = match self.search_active(&info, state_tenant, STATE_INFO_SCHEMA) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(tenant = state_tenant, error = %e, "StateInfo search failed");
                update.failed += 1;
                update.errors.push(UploadError {
                    id: state_tenant.to_string(),
                    message: e,
                });
                return Ok(update);
            }
        };
        if found.is_empty() {
            tracing::warn!(tenant = state_tenant, "no StateInfo record");
        }

        for record in found {
            let id = record
                .get("uniqueIdentifier")
                .and_then(Value::as_str)
                .unwrap_or(state_tenant)
                .to_string();
            self.apply_language(&info, record, &id, language, &mut update);
        }

        Ok(update)
    }

    fn apply_language(&self, info: &Value, mut record: Value, id: &str, language: &Language, update: &mut LanguageUpdate) {
        if !with_language(&mut record, language) {
            tracing::debug!(id, language = %language.value, "language already listed");
            update.skipped += 1;
            return;
        }
        let path = format!("/mdms-v2/v2/_update/{}", update.schema_code);
        let body = envelope::keyed(info.clone(), "Mdms", record);
        match self.records.classify(&self.client.post(&path, &[], &body)) {
            Outcome::Failed(f) => {
                tracing::warn!(id, error = %f, "language update failed");
                update.failed += 1;
                update.errors.push(UploadError {
                    id: id.to_string(),
                    message: f.message,
                });
            }
            _ => update.updated += 1,
        }
    }
}

/// Messages grouped by locale, locales in first-seen order
pub fn group_by_locale(messages: &[LocalizationMessage]) -> Vec<(String, Vec<&LocalizationMessage>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&LocalizationMessage>> = HashMap::new();
    for m in messages {
        if !groups.contains_key(&m.locale) {
            order.push(m.locale.clone());
        }
        groups.entry(m.locale.clone()).or_default().push(m);
    }
    order
        .into_iter()
        .map(|locale| {
            let batch = groups.remove(&locale).unwrap_or_default();
            (locale, batch)
        })
        .collect()
}

fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
