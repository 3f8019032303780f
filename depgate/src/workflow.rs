use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// One step of a job, as far as publishing detection cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `uses: owner/action@ref` with its `with:` parameters.
    Action {
        reference: String,
        with: BTreeMap<String, String>,
    },
    /// `run: <script>`.
    Run { command: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub steps: Vec<Step>,
}

/// A workflow file's jobs, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workflow {
    pub jobs: Vec<Job>,
}

// ─── YAML schema ───

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    #[serde(default)]
    jobs: Option<Mapping>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    steps: Option<Vec<RawStep>>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    uses: Option<String>,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    with: Option<Mapping>,
}

impl RawStep {
    fn into_step(self) -> Option<Step> {
        if let Some(reference) = self.uses {
            let with = self
                .with
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(k, v)| Some((scalar_string(k)?, scalar_string(v)?)))
                .collect();
            return Some(Step::Action { reference, with });
        }
        self.run.map(|command| Step::Run { command })
    }
}

/// Workflow inputs are stringly typed; `true` and `"true"` are the same value.
fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FromStr for Workflow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw: RawWorkflow = serde_yaml::from_str(s).context("invalid workflow YAML")?;
        let mut jobs = Vec::new();
        for (key, value) in raw.jobs.unwrap_or_default() {
            let Some(name) = key.as_str().map(str::to_string) else {
                bail!("job key {key:?} is not a string");
            };
            let job: RawJob = serde_yaml::from_value(value)
                .with_context(|| format!("invalid definition for job {name:?}"))?;
            let steps = job
                .steps
                .unwrap_or_default()
                .into_iter()
                .filter_map(RawStep::into_step)
                .collect();
            jobs.push(Job { name, steps });
        }
        Ok(Self { jobs })
    }
}

/// Parse workflow file content into ordered jobs and steps.
pub fn parse_workflow(content: &[u8]) -> Result<Workflow> {
    let text = std::str::from_utf8(content).context("workflow file is not valid UTF-8")?;
    text.parse()
}
