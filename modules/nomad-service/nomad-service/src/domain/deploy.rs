use std::path::PathBuf;
use std::sync::Arc;

use nomad_service_sdk::{ProgressSink, SchedulerClient};

use super::error::DomainError;
use super::jobspec::{VERSION_KEY, decode_jobspec, render, substitution_values};

/// Where a service's variables live in the scheduler's key-value store.
#[derive(Debug, Clone)]
pub struct VariableLayout {
    prefix: String,
    stack: Option<String>,
}

impl VariableLayout {
    #[must_use]
    pub fn new(prefix: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack: stack.filter(|s| !s.is_empty()),
        }
    }

    /// `<prefix>/<service>[-<stack>]/<item>`
    #[must_use]
    pub fn path(&self, service: &str, item: &str) -> String {
        match &self.stack {
            Some(stack) => format!("{}/{service}-{stack}/{item}", self.prefix),
            None => format!("{}/{service}/{item}", self.prefix),
        }
    }
}

/// Rolls a service to a new version: store the version, render the job
/// specification from the stored template and settings, submit it.
pub struct DeployService {
    scheduler: Arc<dyn SchedulerClient>,
    layout: VariableLayout,
    scratch_dir: PathBuf,
}

impl DeployService {
    pub fn new(
        scheduler: Arc<dyn SchedulerClient>,
        layout: VariableLayout,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scheduler,
            layout,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run the full deploy pipeline, reporting each step to `progress`.
    /// Returns the path of the submitted job specification.
    ///
    /// # Errors
    /// Returns the first failing step as a `DomainError`; later steps are skipped.
    pub async fn deploy(
        &self,
        service: &str,
        version: &str,
        progress: &ProgressSink,
    ) -> Result<PathBuf, DomainError> {
        progress
            .line(format!("Setting new version to {version} ...\n"))
            .await;
        self.scheduler
            .put_variable(
                &self.layout.path(service, "version"),
                &[(VERSION_KEY, version)],
                progress,
            )
            .await
            .map_err(DomainError::SetVersion)?;

        progress
            .line(format!("\nRetrieving settings for {service} ...\n"))
            .await;
        let settings = self
            .scheduler
            .variable_items(&self.layout.path(service, "settings"))
            .await
            .map_err(DomainError::Settings)?;

        progress
            .line(format!("\nRetrieving jobspec for {service} ...\n"))
            .await;
        let encoded = self
            .scheduler
            .variable_item(&self.layout.path(service, "jobspec"), "jobspec")
            .await
            .map_err(DomainError::Jobspec)?;
        let template = decode_jobspec(&encoded)?;

        progress.line("\nCreating updated jobspec ...\n").await;
        let rendered = render(&template, &substitution_values(settings, version))?;

        progress
            .line(format!("\nUpdating job {service} with new jobspec ...\n"))
            .await;
        let path = self.scratch_dir.join(format!("{service}.nomad"));
        write_jobspec(&path, &rendered).await?;
        self.scheduler
            .run_job(&path, progress)
            .await
            .map_err(DomainError::RunJob)?;

        progress
            .line(format!("\nDeployed {version} to {service}\n"))
            .await;
        tracing::info!(%service, %version, "Deployed");
        Ok(path)
    }
}

async fn write_jobspec(path: &std::path::Path, contents: &[u8]) -> Result<(), DomainError> {
    let to_error = |source| DomainError::WriteJobspec {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(to_error)?;
    }
    tokio::fs::write(path, contents).await.map_err(to_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeScheduler, SchedulerCall, collect_progress};

    fn service(scheduler: &Arc<FakeScheduler>, dir: &std::path::Path) -> DeployService {
        DeployService::new(
            scheduler.clone(),
            VariableLayout::new("app", None),
            dir.to_path_buf(),
        )
    }

    #[test]
    fn layout_with_and_without_stack() {
        assert_eq!(
            VariableLayout::new("app", None).path("wiki", "settings"),
            "app/wiki/settings"
        );
        assert_eq!(
            VariableLayout::new("app", Some("prod".to_owned())).path("wiki", "jobspec"),
            "app/wiki-prod/jobspec"
        );
        assert_eq!(
            VariableLayout::new("app", Some(String::new())).path("wiki", "version"),
            "app/wiki/version"
        );
    }

    #[tokio::test]
    async fn deploy_steps_run_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            FakeScheduler::new()
                .with_settings("app/wiki/settings", &[("PORT", "8080")])
                .with_jobspec("app/wiki/jobspec", b"port=[[ PORT ]] v=[[ version ]]"),
        );
        let svc = service(&scheduler, tmp.path());

        let (sink, rx) = ProgressSink::channel("deploy", 64);
        let path = svc.deploy("wiki", "v1.2.3", &sink).await.unwrap();
        drop(sink);

        assert_eq!(std::fs::read(&path).unwrap(), b"port=8080 v=v1.2.3");
        assert_eq!(
            scheduler.calls(),
            vec![
                SchedulerCall::PutVariable {
                    path: "app/wiki/version".to_owned(),
                    items: vec![("version".to_owned(), "v1.2.3".to_owned())],
                },
                SchedulerCall::VariableItems("app/wiki/settings".to_owned()),
                SchedulerCall::VariableItem("app/wiki/jobspec".to_owned(), "jobspec".to_owned()),
                SchedulerCall::RunJob(path.clone()),
            ]
        );

        let (text, aborted) = collect_progress(rx).await;
        assert!(!aborted);
        assert!(text.starts_with("Setting new version to v1.2.3 ...\n"));
        assert!(text.ends_with("\nDeployed v1.2.3 to wiki\n"));
    }

    #[tokio::test]
    async fn failed_version_write_stops_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(FakeScheduler::new().failing_put());
        let svc = service(&scheduler, tmp.path());

        let err = svc
            .deploy("wiki", "v2", &ProgressSink::log_only("deploy"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Setting new version failed.");
        assert_eq!(scheduler.calls().len(), 1);
    }

    #[tokio::test]
    async fn unresolved_placeholder_never_reaches_scheduler() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            FakeScheduler::new()
                .with_settings("app/wiki/settings", &[])
                .with_jobspec("app/wiki/jobspec", b"port=[[ PORT ]]"),
        );
        let svc = service(&scheduler, tmp.path());

        let err = svc
            .deploy("wiki", "v2", &ProgressSink::log_only("deploy"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Render(_)));
        assert!(
            !scheduler
                .calls()
                .iter()
                .any(|c| matches!(c, SchedulerCall::RunJob(_)))
        );
        assert!(!tmp.path().join("wiki.nomad").exists());
    }

    #[tokio::test]
    async fn malformed_jobspec_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(
            FakeScheduler::new()
                .with_settings("app/wiki/settings", &[])
                .with_raw_item("app/wiki/jobspec", b"%%%"),
        );
        let svc = service(&scheduler, tmp.path());

        let err = svc
            .deploy("wiki", "v2", &ProgressSink::log_only("deploy"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DecodeJobspec(_)));
    }
}
