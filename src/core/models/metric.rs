use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well known call-metric field names
pub mod fields {
    pub const CDB_CALL_START_TIMESTAMP: &str = "cdbCallStartTimestamp";
    pub const CDB_CALL_END_TIMESTAMP: &str = "cdbCallEndTimestamp";
    pub const CDB_CALL_TIMEOUT: &str = "cdbCallTimeout";
    pub const ELAPSED_TIMESTAMP: &str = "elapsedTimestamp";
    pub const REQUEST_GROUP_ID: &str = "requestGroupId";
    pub const READY_TO_SEND: &str = "readyToSend";
}

/// Diagnostic record of a single impression, built up field by field
/// as the impression progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    impression_id: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl MetricRecord {
    pub fn new(impression_id: impl Into<String>) -> Self {
        Self {
            impression_id: impression_id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn impression_id(&self) -> &str {
        &self.impression_id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn is_ready_to_send(&self) -> bool {
        self.get(fields::READY_TO_SEND)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_builder(&self) -> MetricBuilder {
        MetricBuilder {
            record: self.clone(),
        }
    }
}

/// Mutable view handed to metric updaters. Changes only land in the
/// store once the updater returns.
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    record: MetricRecord,
}

impl MetricBuilder {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.record.fields.insert(name.into(), value.into());
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.record.fields.remove(name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record.fields.get(name)
    }

    pub fn cdb_call_start(&mut self, epoch_millis: i64) -> &mut Self {
        self.set(fields::CDB_CALL_START_TIMESTAMP, epoch_millis)
    }

    pub fn cdb_call_end(&mut self, epoch_millis: i64) -> &mut Self {
        self.set(fields::CDB_CALL_END_TIMESTAMP, epoch_millis)
    }

    pub fn cdb_call_timeout(&mut self, timed_out: bool) -> &mut Self {
        self.set(fields::CDB_CALL_TIMEOUT, timed_out)
    }

    pub fn elapsed(&mut self, epoch_millis: i64) -> &mut Self {
        self.set(fields::ELAPSED_TIMESTAMP, epoch_millis)
    }

    pub fn request_group_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set(fields::REQUEST_GROUP_ID, id.into())
    }

    pub fn ready_to_send(&mut self, ready: bool) -> &mut Self {
        self.set(fields::READY_TO_SEND, ready)
    }

    pub fn build(self) -> MetricRecord {
        self.record
    }
}
