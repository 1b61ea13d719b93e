//! Batch jobs executing experiment runs, and their materialization from an
//! experiment template.

use crate::api::{
    error::Error,
    experiment::Experiment,
    resource::{Document, Fields, Resource},
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const PARAMETERS_ANNOTATION: &str = "job_parameters";

/// A batch job as known to the API server.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    name: String,
    meta: Fields,
    spec: Fields,
    status: Fields,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &Fields {
        &self.meta
    }

    pub fn spec(&self) -> &Fields {
        &self.spec
    }

    pub fn status(&self) -> &Fields {
        &self.status
    }

    fn meta_entry(&self, section: &str, key: &str) -> Option<&str> {
        self.meta
            .get(section)
            .and_then(|entries| entries.get(key))
            .and_then(Value::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.meta_entry("labels", key)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta_entry("annotations", key)
    }

    /// Decode the parameters the job was launched with, if it carries them.
    pub fn parameters(&self) -> Result<Option<Fields>, Error> {
        match self.annotation(PARAMETERS_ANNOTATION) {
            None => Ok(None),
            Some(encoded) => serde_json::from_str::<Fields>(encoded)
                .map(Some)
                .map_err(|err| {
                    Error::malformed(
                        Self::KIND,
                        format!("annotation {} is not a JSON map: {}", PARAMETERS_ANNOTATION, err),
                    )
                }),
        }
    }
}

impl Resource for Job {
    const API_PATH: &'static str = "apis/batch/v1";
    const KIND: &'static str = "Job";
    const PLURAL: &'static str = "jobs";

    fn name(&self) -> &str {
        &self.name
    }

    fn to_body(&self) -> Value {
        let mut body = json!({
            "apiVersion": "batch/v1",
            "kind": Self::KIND,
            "metadata": self.meta,
            "spec": self.spec,
        });
        if !self.status.is_empty() {
            body["status"] = Value::Object(self.status.clone());
        }
        body
    }

    fn from_body(body: Value) -> Result<Self, Error> {
        let Document {
            name,
            meta,
            spec,
            status,
        } = Document::parse(Self::KIND, body)?;
        Ok(Job {
            name,
            meta,
            spec,
            status,
        })
    }
}

/// First eight characters of a random UUID.
pub(crate) fn short_id() -> String {
    let mut id = Uuid::new_v4().to_string();
    id.truncate(8);
    id
}

/// Name of a parameter's runtime type as it appears in environment variables.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(string) => string.clone(),
        other => other.to_string(),
    }
}

/// `PARAMETER_<NAME>_<TYPE>` environment entry for one parameter.
pub fn parameter_env(name: &str, value: &Value) -> Value {
    let key = format!("PARAMETER_{}_{}", name, type_name(value)).to_uppercase();
    json!({ "name": key, "value": env_value(value) })
}

fn template_error() -> Error {
    Error::Configuration("container templates are not available in experiment job".into())
}

/// Build the job that runs `experiment` with `parameters` in `namespace`.
///
/// The experiment template is copied; every container gets the experiment
/// environment appended to its own.
pub fn materialize(
    experiment: &Experiment,
    namespace: &str,
    parameters: &Fields,
) -> Result<Job, Error> {
    let owner = experiment.owner_reference()?;
    let name = format!("{}-{}", experiment.name(), short_id());

    let encoded_parameters = serde_json::to_string(parameters)
        .map_err(|err| Error::InvalidArgument(format!("unencodable parameters: {}", err)))?;
    let meta = json!({
        "name": name,
        "labels": {
            "experiment_uid": owner.uid,
            "experiment_name": owner.name,
        },
        "annotations": {
            "job_parameters": encoded_parameters,
        },
        "ownerReferences": [owner.to_value(true)],
    });

    let mut environment = vec![
        json!({"name": "JOB_NAME", "value": name}),
        json!({"name": "EXPERIMENT_NAMESPACE", "value": namespace}),
        json!({"name": "EXPERIMENT_NAME", "value": owner.name}),
        json!({"name": "EXPERIMENT_UID", "value": owner.uid}),
    ];
    environment.extend(
        parameters
            .iter()
            .map(|(key, value)| parameter_env(key, value)),
    );

    let mut template = match experiment.job_template().clone() {
        Value::Object(template) => template,
        _ => return Err(template_error()),
    };
    let containers = template
        .get_mut("template")
        .and_then(|pod| pod.get_mut("spec"))
        .and_then(|spec| spec.get_mut("containers"))
        .and_then(Value::as_array_mut)
        .filter(|containers| !containers.is_empty())
        .ok_or_else(template_error)?;

    for container in containers.iter_mut() {
        let container = container.as_object_mut().ok_or_else(template_error)?;
        let env = container
            .entry("env")
            .or_insert_with(|| Value::Array(Vec::new()));
        if env.is_null() {
            *env = Value::Array(Vec::new());
        }
        let env = env.as_array_mut().ok_or_else(|| {
            Error::Configuration("container env in experiment job must be a list".into())
        })?;
        env.extend(environment.iter().cloned());
    }

    Job::from_body(json!({
        "apiVersion": "batch/v1",
        "kind": Job::KIND,
        "metadata": meta,
        "spec": template,
    }))
}

/// Owner of a job, as given by its labels.
pub(crate) fn owned_by(job: &Job, experiment_uid: &str) -> bool {
    job.label("experiment_uid") == Some(experiment_uid)
}
