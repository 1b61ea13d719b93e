use anyhow::{anyhow, Result};
use experiments::{Client, Fields};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

struct Args {
    experiment: String,
    parameters: Vec<String>,
    list: bool,
}

impl Args {
    pub fn from_env() -> Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        Ok(Args {
            experiment: args.value_from_str(["-e", "--experiment"])?,
            parameters: args.values_from_str(["-p", "--param"])?,
            list: args.contains(["-l", "--list"]),
        })
    }
}

/// `key=value`, where the value is read as JSON when possible.
fn parse_parameter(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("parameter {} is not of the form key=value", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::from_env()?;
    let mut client = Client::from_env()?;
    let experiment = client.get_experiment(&args.experiment)?;

    if args.list {
        for job in client.list_jobs(&experiment)? {
            println!("{}", job.name());
        }
        return Ok(());
    }

    let mut parameters: Fields = experiment.parameters().clone();
    for raw in &args.parameters {
        let (key, value) = parse_parameter(raw)?;
        parameters.insert(key, value);
    }

    let job = client.create_job(&experiment, &parameters)?;
    println!("Job {} was created for experiment {}", job.name(), experiment.name());
    Ok(())
}
