//! Recorded outcomes of experiment jobs.
//!
//! Two resource kinds exist for the same concept: `Result`, which keeps its
//! values under `status.values`, and `Run`, which keeps them under
//! `status.results` and carries its parameters in `spec`. Both are served by
//! [`Record`], parameterized by a [`RecordKind`].

use crate::api::{
    error::Error,
    resource::{api_version, optional_map, Document, Fields, OwnerReference, Resource},
};
use serde_json::{json, Value};
use std::marker::PhantomData;

pub trait RecordKind {
    const KIND: &'static str;
    const PLURAL: &'static str;
    /// Status entry holding the recorded values.
    const STATUS_KEY: &'static str;
    /// Whether the parameters are sent as `spec.parameters`.
    const WITH_SPEC: bool;
    const BLOCK_OWNER_DELETION: bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultKind;

impl RecordKind for ResultKind {
    const KIND: &'static str = "Result";
    const PLURAL: &'static str = "results";
    const STATUS_KEY: &'static str = "values";
    const WITH_SPEC: bool = false;
    const BLOCK_OWNER_DELETION: bool = true;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunKind;

impl RecordKind for RunKind {
    const KIND: &'static str = "Run";
    const PLURAL: &'static str = "runs";
    const STATUS_KEY: &'static str = "results";
    const WITH_SPEC: bool = true;
    const BLOCK_OWNER_DELETION: bool = false;
}

pub type ExperimentResult = Record<ResultKind>;
pub type Run = Record<RunKind>;

/// One parameterized execution of an experiment, owned by exactly one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<K> {
    name: String,
    owner: OwnerReference,
    parameters: Fields,
    status: Fields,
    meta: Fields,
    kind: PhantomData<K>,
}

impl<K: RecordKind> Record<K> {
    pub fn new(name: impl Into<String>, owner: OwnerReference) -> Self {
        let mut record = Record {
            name: name.into(),
            owner,
            parameters: Fields::new(),
            status: Fields::new(),
            meta: Fields::new(),
            kind: PhantomData,
        };
        record.stamp_meta();
        record
    }

    pub fn with_parameters(mut self, parameters: Fields) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_status(mut self, status: Fields) -> Self {
        self.status = status;
        self
    }

    /// Replace the metadata, keeping name, owner reference and experiment label.
    pub fn with_meta(mut self, meta: Fields) -> Self {
        self.meta = meta;
        self.stamp_meta();
        self
    }

    fn stamp_meta(&mut self) {
        self.meta.insert("name".into(), Value::String(self.name.clone()));
        self.meta.insert(
            "ownerReferences".into(),
            json!([self.owner.to_value(K::BLOCK_OWNER_DELETION)]),
        );
        let mut labels = match self.meta.remove("labels") {
            Some(Value::Object(labels)) => labels,
            _ => Fields::new(),
        };
        labels.insert("experiment".into(), Value::String(self.owner.name.clone()));
        self.meta.insert("labels".into(), Value::Object(labels));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &OwnerReference {
        &self.owner
    }

    pub fn parameters(&self) -> &Fields {
        &self.parameters
    }

    pub fn status(&self) -> &Fields {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Fields {
        &mut self.status
    }

    pub fn meta(&self) -> &Fields {
        &self.meta
    }

    fn status_map(&self, key: &str) -> Result<Fields, Error> {
        optional_map(K::KIND, &format!("status.{}", key), self.status.get(key).cloned())
    }

    /// The recorded values, empty when nothing was recorded yet.
    pub fn values(&self) -> Result<Fields, Error> {
        self.status_map(K::STATUS_KEY)
    }

    /// Parameters of the job this record was derived from.
    pub fn job_parameters(&self) -> Result<Fields, Error> {
        self.status_map("job_parameters")
    }

    /// Merge `new_values` into the recorded values. Existing keys are
    /// overwritten, all other keys are kept.
    pub fn record_values(&mut self, new_values: Fields) -> Result<(), Error> {
        let mut values = self.values()?;
        values.extend(new_values);
        self.status.insert(K::STATUS_KEY.into(), Value::Object(values));
        Ok(())
    }
}

impl Record<RunKind> {
    pub fn results(&self) -> Result<Fields, Error> {
        self.values()
    }

    pub fn record_results(&mut self, new_results: Fields) -> Result<(), Error> {
        self.record_values(new_results)
    }
}

impl<K: RecordKind> Resource for Record<K> {
    const API_PATH: &'static str = "apis/ml.intel.com/v1";
    const KIND: &'static str = K::KIND;
    const PLURAL: &'static str = K::PLURAL;

    fn name(&self) -> &str {
        &self.name
    }

    fn to_body(&self) -> Value {
        let mut body = json!({
            "apiVersion": api_version(),
            "kind": K::KIND,
            "metadata": self.meta,
            "status": self.status,
        });
        if K::WITH_SPEC {
            body["spec"] = json!({ "parameters": self.parameters });
        }
        body
    }

    fn from_body(body: Value) -> Result<Self, Error> {
        let Document {
            name,
            meta,
            mut spec,
            status,
        } = Document::parse(K::KIND, body)?;
        let owner = OwnerReference::from_meta(K::KIND, &meta)?;
        let parameters = optional_map(K::KIND, "spec.parameters", spec.remove("parameters"))?;
        Ok(Record::new(name, owner)
            .with_parameters(parameters)
            .with_status(status)
            .with_meta(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn owner() -> OwnerReference {
        OwnerReference::new("mnist", "u-1")
    }

    #[test]
    fn construction_stamps_metadata() {
        let result = ExperimentResult::new("mnist-1", owner())
            .with_meta(fields(json!({"labels": {"team": "a"}})));
        let meta = result.meta();
        assert_eq!(meta["name"], "mnist-1");
        assert_eq!(meta["labels"]["experiment"], "mnist");
        assert_eq!(meta["labels"]["team"], "a");
        let references = meta["ownerReferences"].as_array().unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0]["uid"], "u-1");
        assert_eq!(references[0]["controller"], true);
        assert_eq!(references[0]["blockOwnerDeletion"], true);
    }

    #[test]
    fn record_values_merges() {
        let mut result = ExperimentResult::new("mnist-1", owner());
        assert!(result.values().unwrap().is_empty());
        result
            .record_values(fields(json!({"loss": 0.3, "accuracy": 0.8})))
            .unwrap();
        result
            .record_values(fields(json!({"accuracy": 0.9, "epoch": 2})))
            .unwrap();
        assert_eq!(
            Value::Object(result.values().unwrap()),
            json!({"loss": 0.3, "accuracy": 0.9, "epoch": 2})
        );
        assert!(result.status().contains_key("values"));
    }

    #[test]
    fn run_records_results() {
        let mut run = Run::new("mnist-1", owner());
        run.record_results(fields(json!({"loss": 0.3}))).unwrap();
        assert_eq!(run.status()["results"]["loss"], 0.3);
        assert_eq!(run.results().unwrap()["loss"], 0.3);
    }

    #[test]
    fn values_must_be_a_map() {
        let mut result = ExperimentResult::new("mnist-1", owner())
            .with_status(fields(json!({"values": [1, 2]})));
        assert!(result.values().is_err());
        assert!(result.record_values(Fields::new()).is_err());
    }

    #[test]
    fn result_body_round_trip() {
        let result = ExperimentResult::new("mnist-1", owner())
            .with_status(fields(json!({"values": {"loss": 0.1}, "job_parameters": {"rate": 1}})));
        let body = result.to_body();
        assert_eq!(body["kind"], "Result");
        assert!(body.get("spec").is_none());
        assert_eq!(ExperimentResult::from_body(body).unwrap(), result);
    }

    #[test]
    fn run_body_round_trip() {
        let run = Run::new("mnist-1", owner()).with_parameters(fields(json!({"rate": 0.5})));
        let body = run.to_body();
        assert_eq!(body["kind"], "Run");
        assert_eq!(body["spec"]["parameters"]["rate"], 0.5);
        assert!(body["metadata"]["ownerReferences"][0]
            .get("blockOwnerDeletion")
            .is_none());
        assert_eq!(Run::from_body(body).unwrap(), run);
    }

    #[test]
    fn from_body_requires_owner() {
        let body = json!({"metadata": {"name": "orphan", "ownerReferences": []}});
        let error = ExperimentResult::from_body(body).unwrap_err();
        assert!(matches!(error, Error::MalformedDocument { kind: "Result", .. }));

        let body = json!({"metadata": {"name": "orphan"}});
        assert!(Run::from_body(body).is_err());
    }
}
