//! Declarative publishing signatures matched against workflow jobs.
//!
//! A [`JobMatchSpec`] lists the action references and run commands a job
//! must contain to count as one publishing mechanism. Each requirement is
//! consumed by the first step that satisfies it, so one step can never
//! satisfy the same requirement twice. Every spec keeps its own consumption
//! state: the same step may count towards several different specs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::workflow::{Job, Step, Workflow};

pub const NPM_PUBLIC_REGISTRY: &str = "https://registry.npmjs.org";

/// An action reference requirement: `uses: <prefix>@<ref>`, optionally with
/// an exact `with:` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPattern {
    pub prefix: &'static str,
    pub required_param: Option<(&'static str, &'static str)>,
}

impl ActionPattern {
    pub const fn uses(prefix: &'static str) -> Self {
        Self {
            prefix,
            required_param: None,
        }
    }

    pub const fn with_param(mut self, key: &'static str, value: &'static str) -> Self {
        self.required_param = Some((key, value));
        self
    }

    fn matches_reference(&self, reference: &str) -> bool {
        reference
            .strip_prefix(self.prefix)
            .is_some_and(|rest| rest.starts_with('@'))
    }

    /// A prefix match with a missing or different parameter is rejected.
    pub fn accepts(&self, reference: &str, with: &BTreeMap<String, String>) -> bool {
        if !self.matches_reference(reference) {
            return false;
        }
        match self.required_param {
            Some((key, value)) => with.get(key).is_some_and(|v| v == value),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobMatchSpec {
    pub label: &'static str,
    pub description: &'static str,
    pub actions: Vec<ActionPattern>,
    pub commands: Vec<Regex>,
}

/// Requirements of one spec not yet matched while scanning one job.
#[derive(Debug)]
pub struct Outstanding<'a> {
    actions: Vec<&'a ActionPattern>,
    commands: Vec<&'a Regex>,
}

impl<'a> Outstanding<'a> {
    pub fn new(spec: &'a JobMatchSpec) -> Self {
        Self {
            actions: spec.actions.iter().collect(),
            commands: spec.commands.iter().collect(),
        }
    }

    /// Offer one step; it consumes at most one outstanding requirement.
    /// Returns whether it did.
    pub fn consume(&mut self, step: &Step) -> bool {
        match step {
            Step::Action { reference, with } => {
                match self.actions.iter().position(|p| p.accepts(reference, with)) {
                    Some(i) => {
                        self.actions.remove(i);
                        true
                    }
                    None => false,
                }
            }
            Step::Run { command } => match self.commands.iter().position(|r| r.is_match(command)) {
                Some(i) => {
                    self.commands.remove(i);
                    true
                }
                None => false,
            },
        }
    }

    pub fn remaining(&self) -> (usize, usize) {
        (self.actions.len(), self.commands.len())
    }

    pub fn is_satisfied(&self) -> bool {
        self.actions.is_empty() && self.commands.is_empty()
    }
}

impl JobMatchSpec {
    fn new(label: &'static str, description: &'static str) -> Self {
        Self {
            label,
            description,
            actions: vec![],
            commands: vec![],
        }
    }

    fn action(mut self, pattern: ActionPattern) -> Self {
        self.actions.push(pattern);
        self
    }

    fn command(mut self, pattern: &str) -> Self {
        self.commands
            .push(Regex::new(pattern).expect("catalog command patterns are valid regexes"));
        self
    }

    /// Whether `job` satisfies every requirement of this spec. Scanning
    /// stops at the step that completes it.
    pub fn matches(&self, job: &Job) -> bool {
        let mut outstanding = Outstanding::new(self);
        if outstanding.is_satisfied() {
            // A spec with no requirements describes nothing.
            return false;
        }
        for step in &job.steps {
            outstanding.consume(step);
            if outstanding.is_satisfied() {
                return true;
            }
        }
        false
    }
}

/// Known publishing mechanisms, in priority order.
pub static CATALOG: LazyLock<Vec<JobMatchSpec>> = LazyLock::new(|| {
    vec![
        JobMatchSpec::new("Node/npm", "candidate node publishing workflow using npm")
            .action(ActionPattern::uses("actions/setup-node").with_param("registry-url", NPM_PUBLIC_REGISTRY))
            .command(r"npm.*publish"),
        JobMatchSpec::new("Java/Maven", "candidate java publishing workflow using maven")
            .action(ActionPattern::uses("actions/setup-java"))
            .command(r"mvn.*deploy"),
        JobMatchSpec::new("Java/Gradle", "candidate java publishing workflow using gradle")
            .action(ActionPattern::uses("actions/setup-java"))
            .command(r"gradle.*publish"),
        JobMatchSpec::new("Ruby/gem", "candidate ruby publishing workflow using gem")
            .command(r"gem.*push"),
        JobMatchSpec::new(".NET/NuGet", "candidate nuget publishing workflow")
            .command(r"nuget.*push"),
        JobMatchSpec::new("Container", "candidate docker publishing workflow")
            .action(ActionPattern::uses("docker/build-push-action")),
        JobMatchSpec::new("Container", "candidate docker publishing workflow")
            .command(r"docker.*push"),
        JobMatchSpec::new("Python/PyPI", "candidate python publishing workflow using pypi")
            .action(ActionPattern::uses("actions/setup-python"))
            .action(ActionPattern::uses("pypa/gh-action-pypi-publish")),
        JobMatchSpec::new("Go module release", "candidate golang publishing workflow")
            .action(ActionPattern::uses("actions/setup-go"))
            .action(ActionPattern::uses("goreleaser/goreleaser-action")),
        JobMatchSpec::new("Rust/crates", "candidate rust publishing workflow using cargo")
            .command(r"cargo.*publish"),
    ]
});

/// Which spec matched, and in which job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: &'static str,
    pub description: &'static str,
    pub job: String,
}

/// Classify a workflow against `specs`. The earliest spec satisfied by any
/// job wins; among jobs, declaration order breaks ties.
pub fn classify_with(specs: &[JobMatchSpec], workflow: &Workflow) -> Option<Classification> {
    specs.iter().find_map(|spec| {
        workflow
            .jobs
            .iter()
            .find(|job| spec.matches(job))
            .map(|job| Classification {
                label: spec.label,
                description: spec.description,
                job: job.name.clone(),
            })
    })
}

pub fn classify(workflow: &Workflow) -> Option<Classification> {
    classify_with(&CATALOG, workflow)
}
