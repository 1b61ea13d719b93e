use crate::{
    api::{
        error::{Error, RestError},
        experiment::Experiment,
        job::{self, Job},
        record::{ExperimentResult, Record, RecordKind, ResultKind, Run, RunKind},
        resource::{Fields, Resource},
        retry::RetryPolicy,
    },
    backend::rest::Server,
    config::Config,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A single call against the API server.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the server root, including the query string.
    pub path: String,
    pub body: Option<Value>,
}

/// Anything able to deliver a [`Request`] and return the decoded response body.
pub trait Transport {
    fn send(&mut self, request: &Request) -> Result<Value, RestError>;
}

#[derive(Serialize)]
struct ListQuery<'a> {
    #[serde(rename = "labelSelector")]
    label_selector: &'a str,
}

/// Experiment client for one namespace.
///
/// Every remote call is repeated according to the [`RetryPolicy`] and blocks
/// until it succeeds or the policy gives up. Updates replace the whole object
/// without a `resourceVersion` precondition, so concurrent writers to the same
/// object may overwrite each other.
pub struct Client<T = Server> {
    transport: T,
    namespace: String,
    retry: RetryPolicy,
}

impl Client<Server> {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut server = Server::new(config.api_url.as_str()).with_timeout(config.timeout);
        if let Some(token) = &config.token {
            server = server.with_token(token.as_str());
        }
        if let Some(path) = &config.ca_file {
            let pem = std::fs::read(path).map_err(|err| {
                Error::Configuration(format!("cannot read CA file {}: {}", path.display(), err))
            })?;
            server = server.with_ca_pem(&pem)?;
        }
        Ok(Client::new(server, config.namespace.as_str()).with_retry(config.retry.clone()))
    }

    pub fn from_env() -> Result<Self, Error> {
        Client::from_config(&Config::from_env()?)
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, namespace: impl Into<String>) -> Self {
        Client {
            transport,
            namespace: namespace.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn collection<R: Resource>(&self) -> String {
        format!("{}/namespaces/{}/{}", R::API_PATH, self.namespace, R::PLURAL)
    }

    fn object<R: Resource>(&self, name: &str) -> String {
        format!("{}/{}", self.collection::<R>(), name)
    }

    fn execute(&mut self, context: String, request: Request) -> Result<Value, Error> {
        let Client {
            transport, retry, ..
        } = self;
        retry.call(&context, || transport.send(&request))
    }

    fn items<R: Resource>(response: Value) -> Result<Vec<R>, Error> {
        match response {
            Value::Object(mut list) => match list.remove("items") {
                Some(Value::Array(items)) => items.into_iter().map(R::from_body).collect(),
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(_) => Err(Error::malformed(R::KIND, "list items must be an array")),
            },
            _ => Err(Error::malformed(R::KIND, "list response must be an object")),
        }
    }

    pub(crate) fn list<R: Resource>(&mut self, query: Option<&str>) -> Result<Vec<R>, Error> {
        let mut path = self.collection::<R>();
        if let Some(query) = query {
            path = format!("{}?{}", path, query);
        }
        let context = format!("listing {} in namespace {}", R::PLURAL, self.namespace);
        let response = self.execute(
            context,
            Request {
                method: Method::Get,
                path,
                body: None,
            },
        )?;
        Self::items(response)
    }

    pub(crate) fn get<R: Resource>(&mut self, name: &str) -> Result<R, Error> {
        let context = format!(
            "getting {} {} in namespace {}",
            R::KIND.to_lowercase(),
            name,
            self.namespace
        );
        let request = Request {
            method: Method::Get,
            path: self.object::<R>(name),
            body: None,
        };
        R::from_body(self.execute(context, request)?)
    }

    pub(crate) fn create<R: Resource>(&mut self, resource: &R) -> Result<R, Error> {
        let context = format!(
            "creating {} {} in namespace {}",
            R::KIND.to_lowercase(),
            resource.name(),
            self.namespace
        );
        let request = Request {
            method: Method::Post,
            path: self.collection::<R>(),
            body: Some(resource.to_body()),
        };
        R::from_body(self.execute(context, request)?)
    }

    pub(crate) fn replace<R: Resource>(&mut self, resource: &R) -> Result<R, Error> {
        let context = format!(
            "updating {} {} in namespace {}",
            R::KIND.to_lowercase(),
            resource.name(),
            self.namespace
        );
        let request = Request {
            method: Method::Put,
            path: self.object::<R>(resource.name()),
            body: Some(resource.to_body()),
        };
        R::from_body(self.execute(context, request)?)
    }

    /// Returns the `Status` document of the deletion.
    pub(crate) fn delete<R: Resource>(&mut self, name: &str) -> Result<Value, Error> {
        let context = format!(
            "deleting {} {} in namespace {}",
            R::KIND.to_lowercase(),
            name,
            self.namespace
        );
        let request = Request {
            method: Method::Delete,
            path: self.object::<R>(name),
            body: Some(json!({"apiVersion": "v1", "kind": "DeleteOptions"})),
        };
        self.execute(context, request)
    }

    // Experiments

    /// The experiment named by `EXPERIMENT_NAME`, as set inside experiment jobs.
    pub fn current_experiment(&mut self) -> Result<Experiment, Error> {
        self.current_experiment_from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`current_experiment`](Self::current_experiment), reading the name
    /// from an arbitrary variable source.
    pub fn current_experiment_from_lookup(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Experiment, Error> {
        match lookup("EXPERIMENT_NAME") {
            Some(name) if !name.is_empty() => self.get_experiment(&name),
            _ => Err(Error::Configuration(
                "environment variable EXPERIMENT_NAME not set".into(),
            )),
        }
    }

    pub fn list_experiments(&mut self) -> Result<Vec<Experiment>, Error> {
        self.list(None)
    }

    pub fn get_experiment(&mut self, name: &str) -> Result<Experiment, Error> {
        self.get(name)
    }

    pub fn create_experiment(&mut self, experiment: &Experiment) -> Result<Experiment, Error> {
        self.create(experiment)
    }

    pub fn update_experiment(&mut self, experiment: &Experiment) -> Result<Experiment, Error> {
        self.replace(experiment)
    }

    /// Owned results, runs and jobs are removed by the cluster's garbage collector.
    pub fn delete_experiment(&mut self, name: &str) -> Result<Value, Error> {
        self.delete::<Experiment>(name)
    }

    // Results

    pub fn list_results(&mut self) -> Result<Vec<ExperimentResult>, Error> {
        self.list(None)
    }

    pub fn get_result(&mut self, name: &str) -> Result<ExperimentResult, Error> {
        self.get(name)
    }

    pub fn create_result(
        &mut self,
        result: &ExperimentResult,
    ) -> Result<ExperimentResult, Error> {
        self.create(result)
    }

    pub fn update_result(
        &mut self,
        result: &ExperimentResult,
    ) -> Result<ExperimentResult, Error> {
        self.replace(result)
    }

    pub fn delete_result(&mut self, name: &str) -> Result<Value, Error> {
        self.delete::<Record<ResultKind>>(name)
    }

    // Runs

    pub fn list_runs(&mut self) -> Result<Vec<Run>, Error> {
        self.list(None)
    }

    pub fn get_run(&mut self, name: &str) -> Result<Run, Error> {
        self.get(name)
    }

    pub fn create_run(&mut self, run: &Run) -> Result<Run, Error> {
        self.create(run)
    }

    pub fn update_run(&mut self, run: &Run) -> Result<Run, Error> {
        self.replace(run)
    }

    pub fn delete_run(&mut self, name: &str) -> Result<Value, Error> {
        self.delete::<Record<RunKind>>(name)
    }

    pub(crate) fn get_record<K: RecordKind>(&mut self, name: &str) -> Result<Record<K>, Error> {
        self.get(name)
    }

    pub(crate) fn create_record<K: RecordKind>(
        &mut self,
        record: &Record<K>,
    ) -> Result<Record<K>, Error> {
        self.create(record)
    }

    pub(crate) fn update_record<K: RecordKind>(
        &mut self,
        record: &Record<K>,
    ) -> Result<Record<K>, Error> {
        self.replace(record)
    }

    // Jobs

    /// Jobs labelled with the uid of `experiment`.
    pub fn list_jobs(&mut self, experiment: &Experiment) -> Result<Vec<Job>, Error> {
        let uid = experiment.owner_reference()?.uid;
        let selector = format!("experiment_uid={}", uid);
        let query = serde_qs::to_string(&ListQuery {
            label_selector: &selector,
        })
        .map_err(|err| Error::InvalidArgument(format!("unencodable label selector: {}", err)))?;
        let jobs: Vec<Job> = self.list(Some(&query))?;
        Ok(jobs
            .into_iter()
            .filter(|job| job::owned_by(job, &uid))
            .collect())
    }

    pub fn get_job(&mut self, name: &str) -> Result<Job, Error> {
        self.get(name)
    }

    /// Start a job running `experiment` with `parameters`.
    pub fn create_job(
        &mut self,
        experiment: &Experiment,
        parameters: &Fields,
    ) -> Result<Job, Error> {
        let job = job::materialize(experiment, &self.namespace, parameters)?;
        let created = self.create(&job)?;
        tracing::info!(
            "Created job {} for experiment {} in namespace {}",
            created.name(),
            experiment.name(),
            self.namespace
        );
        Ok(created)
    }

    // Definitions

    /// Register custom resource definitions. Definitions that already exist
    /// are left alone. Other failures are returned without retrying.
    pub fn ensure_definitions(&mut self, definitions: &[Value]) -> Result<(), Error> {
        let once = RetryPolicy::never();
        for definition in definitions {
            let name = definition
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::malformed("CustomResourceDefinition", "metadata.name is missing")
                })?;
            let request = Request {
                method: Method::Post,
                path: "apis/apiextensions.k8s.io/v1/customresourcedefinitions".into(),
                body: Some(definition.clone()),
            };
            let transport = &mut self.transport;
            let context = format!("registering definition {}", name);
            match once.call(&context, || transport.send(&request)) {
                Ok(_) => tracing::info!("Registered definition {}", name),
                Err(err) if err.is_already_exists() => {
                    tracing::debug!("Definition {} already exists", name)
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
