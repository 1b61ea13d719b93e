use crate::api::{error::Error, resource::Fields};
use serde_json::Value;
use std::env;

/// What a running experiment job knows about itself, from the environment
/// injected when the job was created.
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    pub job_name: String,
    pub namespace: String,
    pub experiment_name: String,
    pub experiment_uid: String,
    pub parameters: Fields,
}

impl JobContext {
    pub fn from_env() -> Result<Self, Error> {
        JobContext::from_vars(env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, Error> {
        let mut job_name = None;
        let mut namespace = None;
        let mut experiment_name = None;
        let mut experiment_uid = None;
        let mut parameters = Fields::new();

        for (key, value) in vars {
            match key.as_str() {
                "JOB_NAME" => job_name = Some(value),
                "EXPERIMENT_NAMESPACE" => namespace = Some(value),
                "EXPERIMENT_NAME" => experiment_name = Some(value),
                "EXPERIMENT_UID" => experiment_uid = Some(value),
                _ => {
                    if let Some((name, value)) = decode_parameter(&key, value) {
                        parameters.insert(name, value);
                    }
                }
            }
        }

        let required = |value: Option<String>, key: &str| {
            value.filter(|value| !value.is_empty()).ok_or_else(|| {
                Error::Configuration(format!("environment variable {} not set", key))
            })
        };
        Ok(JobContext {
            job_name: required(job_name, "JOB_NAME")?,
            namespace: required(namespace, "EXPERIMENT_NAMESPACE")?,
            experiment_name: required(experiment_name, "EXPERIMENT_NAME")?,
            experiment_uid: required(experiment_uid, "EXPERIMENT_UID")?,
            parameters,
        })
    }
}

/// Reverse of the `PARAMETER_<NAME>_<TYPE>` encoding. The name comes back in
/// lower case.
fn decode_parameter(key: &str, raw: String) -> Option<(String, Value)> {
    let rest = key.strip_prefix("PARAMETER_")?;
    let (name, kind) = rest.rsplit_once('_')?;
    if name.is_empty() {
        return None;
    }
    let value = match kind {
        "STR" => Value::String(raw),
        "BOOL" => Value::Bool(raw == "true"),
        "INT" => raw.parse::<i64>().map(Value::from).unwrap_or(Value::String(raw)),
        "FLOAT" => raw.parse::<f64>().map(Value::from).unwrap_or(Value::String(raw)),
        _ => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    };
    Some((name.to_lowercase(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn read_job_context() {
        let context = JobContext::from_vars(vars(&[
            ("JOB_NAME", "mnist-1a2b3c4d"),
            ("EXPERIMENT_NAMESPACE", "research"),
            ("EXPERIMENT_NAME", "mnist"),
            ("EXPERIMENT_UID", "u-1"),
            ("PARAMETER_RATE_FLOAT", "0.5"),
            ("PARAMETER_ENABLED_BOOL", "true"),
            ("PARAMETER_BATCH_SIZE_INT", "32"),
            ("PARAMETER_OPTIMIZER_STR", "adam"),
            ("PARAMETER_LAYERS_LIST", "[1,2]"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();
        assert_eq!(context.job_name, "mnist-1a2b3c4d");
        assert_eq!(context.experiment_uid, "u-1");
        assert_eq!(
            Value::Object(context.parameters),
            json!({
                "rate": 0.5,
                "enabled": true,
                "batch_size": 32,
                "optimizer": "adam",
                "layers": [1, 2]
            })
        );
    }

    #[test]
    fn missing_job_name() {
        let error = JobContext::from_vars(vars(&[("EXPERIMENT_NAME", "mnist")])).unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
    }
}
