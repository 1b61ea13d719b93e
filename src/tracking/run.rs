use crate::{
    api::{
        client::{Client, Transport},
        error::Error,
        record::{Record, RecordKind, ResultKind},
        resource::Fields,
    },
    tracking::JobContext,
};
use serde_json::Value;
use std::marker::PhantomData;

/// Values observed by an experiment job, recorded in one go.
///
/// By default values end up in the job's `Result`; use `TrackingRun<RunKind>`
/// for `Run` records.
pub struct TrackingRun<K = ResultKind> {
    values: Fields,
    kind: PhantomData<K>,
}

impl<K: RecordKind> Default for TrackingRun<K> {
    fn default() -> Self {
        TrackingRun::new()
    }
}

impl<K: RecordKind> TrackingRun<K> {
    pub fn new() -> Self {
        TrackingRun {
            values: Fields::new(),
            kind: PhantomData,
        }
    }

    /// Later values for the same key replace earlier ones.
    pub fn log_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn values(&self) -> &Fields {
        &self.values
    }

    /// Merge the buffered values into the record named after the job,
    /// creating the record from the job first if needed.
    pub fn submit<T: Transport>(
        self,
        client: &mut Client<T>,
        context: &JobContext,
    ) -> Result<Record<K>, Error> {
        let mut record = match client.get_record::<K>(&context.job_name) {
            Ok(record) => record,
            Err(err) if err.is_not_found() => {
                let job = client.get_job(&context.job_name)?;
                let experiment = client.get_experiment(&context.experiment_name)?;
                client.create_record(&experiment.record::<K>(&job)?)?
            }
            Err(err) => return Err(err),
        };
        record.record_values(self.values)?;
        client.update_record(&record)
    }
}
