use crate::api::{
    error::Error,
    job::Job,
    record::{ExperimentResult, Record, RecordKind, Run},
    resource::{api_version, optional_map, Document, Fields, OwnerReference, Resource},
};
use serde_json::{json, Value};

/// A reusable job template with default parameters.
///
/// `meta.name` always equals the experiment name. The `uid` is assigned by the
/// API server and only present once the experiment has been created.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    name: String,
    job_template: Value,
    parameters: Fields,
    status: Fields,
    meta: Fields,
}

impl Experiment {
    pub fn new(name: impl Into<String>, job_template: Value) -> Self {
        let name = name.into();
        let mut meta = Fields::new();
        meta.insert("name".into(), Value::String(name.clone()));
        Experiment {
            name,
            job_template,
            parameters: Fields::new(),
            status: Fields::new(),
            meta,
        }
    }

    pub fn with_parameters(mut self, parameters: Fields) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_status(mut self, status: Fields) -> Self {
        self.status = status;
        self
    }

    /// Replace the metadata. The `name` entry is reset to the experiment name.
    pub fn with_meta(mut self, mut meta: Fields) -> Self {
        meta.insert("name".into(), Value::String(self.name.clone()));
        self.meta = meta;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> Option<&str> {
        self.meta.get("uid").and_then(Value::as_str)
    }

    pub fn job_template(&self) -> &Value {
        &self.job_template
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

    pub(crate) fn owner_reference(&self) -> Result<OwnerReference, Error> {
        let uid = self.uid().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "experiment {} has not been created remotely and has no uid",
                self.name
            ))
        })?;
        Ok(OwnerReference::new(self.name.as_str(), uid))
    }

    /// A result for `job`, carrying the parameters the job was launched with.
    pub fn result(&self, job: &Job) -> Result<ExperimentResult, Error> {
        self.record(job)
    }

    /// A run for `job`. The job parameters become the run's parameters.
    pub fn run(&self, job: &Job) -> Result<Run, Error> {
        self.record(job)
    }

    pub(crate) fn record<K: RecordKind>(&self, job: &Job) -> Result<Record<K>, Error> {
        let owner = self.owner_reference()?;
        let mut status = Fields::new();
        let mut record = Record::new(job.name(), owner);
        if let Some(parameters) = job.parameters()? {
            status.insert("job_parameters".into(), Value::Object(parameters.clone()));
            if K::WITH_SPEC {
                record = record.with_parameters(parameters);
            }
        }
        Ok(record.with_status(status))
    }
}

impl Resource for Experiment {
    const API_PATH: &'static str = "apis/ml.intel.com/v1";
    const KIND: &'static str = "Experiment";
    const PLURAL: &'static str = "experiments";

    fn name(&self) -> &str {
        &self.name
    }

    fn to_body(&self) -> Value {
        json!({
            "apiVersion": api_version(),
            "kind": Self::KIND,
            "metadata": self.meta,
            "spec": {
                "jobSpec": self.job_template,
                "parameters": self.parameters,
            },
            "status": self.status,
        })
    }

    fn from_body(body: Value) -> Result<Self, Error> {
        let Document {
            name,
            meta,
            mut spec,
            status,
        } = Document::parse(Self::KIND, body)?;
        let job_template = spec.remove("jobSpec").unwrap_or(Value::Null);
        let parameters = optional_map(Self::KIND, "spec.parameters", spec.remove("parameters"))?;
        Ok(Experiment::new(name, job_template)
            .with_parameters(parameters)
            .with_status(status)
            .with_meta(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Value {
        json!({"template": {"spec": {"containers": [{"name": "main", "image": "busybox"}]}}})
    }

    fn parameters(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_experiment_has_no_uid() {
        let experiment = Experiment::new("mnist", template());
        assert_eq!(experiment.uid(), None);
        assert_eq!(experiment.meta()["name"], "mnist");
    }

    #[test]
    fn meta_name_follows_experiment_name() {
        let meta = parameters(json!({"name": "other", "uid": "u-1"}));
        let experiment = Experiment::new("mnist", template()).with_meta(meta);
        assert_eq!(experiment.meta()["name"], "mnist");
        assert_eq!(experiment.uid(), Some("u-1"));
    }

    #[test]
    fn instances_do_not_share_status() {
        let mut a = Experiment::new("a", template());
        let b = Experiment::new("b", template());
        a.status_mut().insert("phase".into(), json!("Running"));
        assert!(b.status().is_empty());
    }

    #[test]
    fn body_round_trip() {
        let experiment = Experiment::new("mnist", template())
            .with_parameters(parameters(json!({"rate": 0.5, "epochs": 3})))
            .with_status(parameters(json!({"best": 0.91})))
            .with_meta(parameters(json!({"uid": "u-1", "labels": {"team": "a"}})));
        let body = experiment.to_body();
        assert_eq!(body["apiVersion"], "ml.intel.com/v1");
        assert_eq!(body["kind"], "Experiment");
        assert_eq!(body["spec"]["jobSpec"], template());
        assert_eq!(Experiment::from_body(body).unwrap(), experiment);
    }

    #[test]
    fn from_body_defaults_missing_sections() {
        let experiment = Experiment::from_body(json!({"metadata": {"name": "bare"}})).unwrap();
        assert_eq!(experiment.name(), "bare");
        assert_eq!(experiment.job_template(), &Value::Null);
        assert!(experiment.parameters().is_empty());
        assert!(experiment.status().is_empty());
    }

    #[test]
    fn result_from_job_copies_parameters() {
        let experiment = Experiment::new("mnist", template())
            .with_meta(parameters(json!({"uid": "u-1"})));
        let job = Job::from_body(json!({
            "kind": "Job",
            "metadata": {
                "name": "mnist-1a2b3c4d",
                "annotations": {"job_parameters": "{\"rate\": 0.5}"}
            }
        }))
        .unwrap();

        let result = experiment.result(&job).unwrap();
        assert_eq!(result.name(), "mnist-1a2b3c4d");
        assert_eq!(result.owner(), &OwnerReference::new("mnist", "u-1"));
        assert_eq!(result.job_parameters().unwrap()["rate"], 0.5);

        let run = experiment.run(&job).unwrap();
        assert_eq!(run.parameters()["rate"], 0.5);
    }

    #[test]
    fn result_requires_created_experiment() {
        let job = Job::from_body(json!({"metadata": {"name": "j"}})).unwrap();
        let error = Experiment::new("mnist", template()).result(&job).unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
    }
}
