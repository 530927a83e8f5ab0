use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nomad_service_sdk::{CommandError, ProgressSink, SchedulerClient};
use serde::Deserialize;

use crate::domain::runner::CommandRunner;

/// [`SchedulerClient`] backed by the `nomad` command line.
pub struct NomadCli {
    runner: Arc<dyn CommandRunner>,
    bin: String,
}

#[derive(Deserialize)]
struct VariableDocument {
    #[serde(rename = "Items", default)]
    items: HashMap<String, String>,
}

impl NomadCli {
    pub fn new(runner: Arc<dyn CommandRunner>, bin: impl Into<String>) -> Self {
        Self {
            runner,
            bin: bin.into(),
        }
    }

    fn argv<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        std::iter::once(self.bin.clone())
            .chain(args.into_iter().map(str::to_owned))
            .collect()
    }

    fn malformed(&self, detail: impl Into<String>) -> CommandError {
        CommandError::MalformedOutput {
            program: self.bin.clone(),
            detail: detail.into(),
        }
    }
}

/// `nomad var put` reads the value from a file when it starts with `@`;
/// a leading backslash makes it literal.
#[must_use]
pub fn escape_cli_value(value: &str) -> Cow<'_, str> {
    if value.starts_with('@') {
        Cow::Owned(format!("\\{value}"))
    } else {
        Cow::Borrowed(value)
    }
}

#[async_trait]
impl SchedulerClient for NomadCli {
    async fn put_variable(
        &self,
        path: &str,
        items: &[(&str, &str)],
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        let assignments: Vec<String> = items
            .iter()
            .map(|(key, value)| format!("{key}={}", escape_cli_value(value)))
            .collect();
        let mut argv = self.argv(["var", "put", "-force", path]);
        argv.extend(assignments);
        self.runner.stream(&argv, progress).await
    }

    async fn variable_items(&self, path: &str) -> Result<HashMap<String, String>, CommandError> {
        let out = self
            .runner
            .capture(&self.argv(["var", "get", "-out", "json", path]))
            .await?;
        let doc: VariableDocument = serde_json::from_slice(&out)
            .map_err(|e| self.malformed(format!("variable {path} is not valid JSON: {e}")))?;
        Ok(doc.items)
    }

    async fn variable_item(&self, path: &str, item: &str) -> Result<Vec<u8>, CommandError> {
        let template = format!("{{{{ .Items.{item} }}}}");
        self.runner
            .capture(&self.argv([
                "var",
                "get",
                "-out",
                "go-template",
                "-template",
                template.as_str(),
                path,
            ]))
            .await
    }

    async fn find_node(&self, name: &str) -> Result<Option<String>, CommandError> {
        let filter = format!("\"{name}\" in Name");
        let out = self
            .runner
            .capture(&self.argv(["node", "status", "-filter", filter.as_str(), "-quiet"]))
            .await?;
        let out = String::from_utf8(out).map_err(|_| self.malformed("node id is not UTF-8"))?;
        let mut ids = out.lines().map(str::trim).filter(|l| !l.is_empty());
        let first = ids.next().map(str::to_owned);
        if ids.next().is_some() {
            tracing::warn!(%name, "Several nodes match, using the first one");
        }
        Ok(first)
    }

    async fn disable_eligibility(
        &self,
        node_id: &str,
        progress: &ProgressSink,
    ) -> Result<(), CommandError> {
        self.runner
            .stream(&self.argv(["node", "eligibility", "-disable", node_id]), progress)
            .await
    }

    async fn drain_node(&self, node_id: &str, progress: &ProgressSink) -> Result<(), CommandError> {
        self.runner
            .stream(&self.argv(["node", "drain", "-yes", "-enable", node_id]), progress)
            .await
    }

    async fn run_job(&self, jobspec: &Path, progress: &ProgressSink) -> Result<(), CommandError> {
        let path = jobspec.to_string_lossy();
        self.runner
            .stream(&self.argv(["job", "run", &*path]), progress)
            .await
    }
}
