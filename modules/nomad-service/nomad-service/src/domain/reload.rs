use std::sync::Arc;

use nomad_service_sdk::{CalloutClient, CalloutError, ProgressSink};

use super::instances::InstanceStore;

/// Result of a reload fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub attempted: usize,
    pub failed: usize,
}

impl ReloadSummary {
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Asks every known instance of a service to reload. One unreachable
/// instance does not stop the others.
pub struct ReloadService {
    instances: Arc<InstanceStore>,
    callout: Arc<dyn CalloutClient>,
}

impl ReloadService {
    pub fn new(instances: Arc<InstanceStore>, callout: Arc<dyn CalloutClient>) -> Self {
        Self { instances, callout }
    }

    pub async fn reload(
        &self,
        service: &str,
        secret: &str,
        progress: &ProgressSink,
    ) -> ReloadSummary {
        let instances = self.instances.instances(service);
        if instances.is_empty() {
            progress
                .line(format!("No known instances of {service}\n"))
                .await;
        }

        let mut summary = ReloadSummary {
            attempted: instances.len(),
            failed: 0,
        };
        for instance in &instances {
            let url = instance.reload_url();
            match self.callout.reload_instance(instance, secret).await {
                Ok(()) => progress.line(format!("Calling {url} ... OK\n")).await,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(%service, %url, error = %err, "Instance reload failed");
                    progress
                        .line(format!("Calling {url} ... FAIL ({})\n", failure_reason(&err)))
                        .await;
                }
            }
        }

        if summary.all_succeeded() {
            progress.line("All instances reloaded\n").await;
        } else {
            progress
                .line(format!(
                    "ERROR: {} of {} instances failed to reload\n",
                    summary.failed, summary.attempted
                ))
                .await;
        }
        tracing::info!(
            %service,
            attempted = summary.attempted,
            failed = summary.failed,
            "Reload fan-out finished"
        );
        summary
    }
}

fn failure_reason(err: &CalloutError) -> String {
    match err {
        CalloutError::Status { status, .. } => format!("HTTP {status}"),
        CalloutError::Transport { detail, .. } => detail.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instances::InstanceDirectory;
    use crate::test_support::{RecordingCallout, collect_progress};
    use nomad_service_sdk::ServiceInstance;

    fn store(instances: Vec<ServiceInstance>) -> Arc<InstanceStore> {
        Arc::new(InstanceStore::with_snapshot(
            "instances.json",
            InstanceDirectory::from_entries([("wiki", instances)]),
        ))
    }

    #[tokio::test]
    async fn partial_failure_reports_every_instance() {
        let callout = Arc::new(RecordingCallout::new().failing_reload_for("10.0.0.2"));
        let svc = ReloadService::new(
            store(vec![
                ServiceInstance::new("10.0.0.1", 8080),
                ServiceInstance::new("10.0.0.2", 8080),
                ServiceInstance::new("10.0.0.3", 8080),
            ]),
            callout.clone(),
        );

        let (sink, rx) = ProgressSink::channel("reload", 16);
        let summary = svc.reload("wiki", "s3cret", &sink).await;
        drop(sink);

        assert_eq!(
            summary,
            ReloadSummary {
                attempted: 3,
                failed: 1
            }
        );
        let (text, aborted) = collect_progress(rx).await;
        assert!(!aborted);
        assert_eq!(
            text,
            "Calling http://10.0.0.1:8080/reload ... OK\n\
             Calling http://10.0.0.2:8080/reload ... FAIL (HTTP 500)\n\
             Calling http://10.0.0.3:8080/reload ... OK\n\
             ERROR: 1 of 3 instances failed to reload\n"
        );
        assert_eq!(callout.reloads().len(), 3);
        assert!(callout.reloads().iter().all(|(_, secret)| secret == "s3cret"));
    }

    #[tokio::test]
    async fn unknown_service_reloads_nothing() {
        let callout = Arc::new(RecordingCallout::new());
        let svc = ReloadService::new(store(vec![]), callout.clone());

        let (sink, rx) = ProgressSink::channel("reload", 16);
        let summary = svc.reload("other", "s3cret", &sink).await;
        drop(sink);

        assert!(summary.all_succeeded());
        let (text, _) = collect_progress(rx).await;
        assert_eq!(text, "No known instances of other\nAll instances reloaded\n");
        assert!(callout.reloads().is_empty());
    }
}
