use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::store::ChangeEvent;

use super::{Action, CommandError, CommandRecord, JobHandle, JobRegistry, JobRunner, LaunchError};

/// Outcome of a handled command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The job was launched
    Started(JobHandle),
    /// START for a job which is already running, nothing happened
    AlreadyRunning(JobHandle),
    /// The job is no longer tracked as running
    Stopped(JobHandle),
    /// STOP for a job which is not running, nothing happened
    NotRunning,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("Launching `{target}` failed: {source}")]
    Launch {
        target: String,
        #[source]
        source: LaunchError,
    },
}

/// State machine driving the jobs of one [JobRegistry].
///
/// Commands must be handled one at a time, every job name must always be
/// handled by the same dispatcher.
pub struct CommandDispatcher<R: ?Sized> {
    registry: JobRegistry,
    runner: Arc<R>,
}

impl<R> CommandDispatcher<R>
where
    R: JobRunner + ?Sized,
{
    pub fn new(registry: JobRegistry, runner: Arc<R>) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Apply a command to the registry, launching the job if needed.
    ///
    /// A failed launch leaves the job stopped.
    pub async fn handle(&mut self, record: CommandRecord) -> Result<Transition, DispatchError> {
        let name = self
            .registry
            .resolve(&record.target)
            .ok_or_else(|| CommandError::UnknownTarget(record.target.clone()))?
            .to_owned();

        match (record.action, self.registry.handle(&name).cloned()) {
            (Action::Start, Some(handle)) => {
                info!(job = %name, id = %handle.id(), "Ignoring START, job is already running");
                Ok(Transition::AlreadyRunning(handle))
            }
            (Action::Start, None) => {
                let handle = self
                    .runner
                    .launch(&name, record.args.as_deref())
                    .await
                    .map_err(|source| DispatchError::Launch {
                        target: name.clone(),
                        source,
                    })?;
                self.registry.mark_running(&name, handle.clone());
                info!(job = %name, id = %handle.id(), "Started job");
                Ok(Transition::Started(handle))
            }
            (Action::Stop, Some(_)) => match self.registry.mark_stopped(&name) {
                Some(handle) => {
                    info!(job = %name, id = %handle.id(), "Stopped tracking job");
                    Ok(Transition::Stopped(handle))
                }
                None => Ok(Transition::NotRunning),
            },
            (Action::Stop, None) => {
                info!(job = %name, "Ignoring STOP, job is not running");
                Ok(Transition::NotRunning)
            }
        }
    }

    /// Handle a change of the command namespace.
    ///
    /// Errors are logged and the command is dropped, this never fails.
    pub async fn handle_event(&mut self, event: &ChangeEvent) -> Option<Transition> {
        let record = match CommandRecord::from_event(event) {
            Ok(x) => x,
            Err(e) => {
                warn!(key = %event.key, "Ignoring command: {e}");
                return None;
            }
        };
        match self.handle(record).await {
            Ok(x) => Some(x),
            Err(e) => {
                error!(key = %event.key, "Command failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::control::JobState;

    /// Runner recording every launch
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub(crate) launches: Mutex<Vec<(String, Option<String>)>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn launch(&self, target: &str, args: Option<&str>) -> Result<JobHandle, LaunchError> {
            if self.fail {
                return Err(LaunchError::InvalidArgs {
                    target: target.to_owned(),
                    reason: "broken".to_owned(),
                });
            }
            self.launches
                .lock()
                .unwrap()
                .push((target.to_owned(), args.map(str::to_owned)));
            Ok(JobHandle::new(target))
        }
    }

    fn dispatcher(
        runner: RecordingRunner,
    ) -> (CommandDispatcher<RecordingRunner>, Arc<RecordingRunner>) {
        let runner = Arc::new(runner);
        let registry = JobRegistry::new(["ingest", "speedo"]).with_alias("kafka", "ingest");
        (CommandDispatcher::new(registry, runner.clone()), runner)
    }

    fn start(target: &str) -> CommandRecord {
        CommandRecord::new(target, Action::Start, None)
    }

    fn stop(target: &str) -> CommandRecord {
        CommandRecord::new(target, Action::Stop, None)
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (mut dispatcher, runner) = dispatcher(RecordingRunner::default());
        let first = dispatcher.handle(start("speedo")).await.unwrap();
        let Transition::Started(handle) = first else {
            panic!("{first:?}")
        };
        let second = dispatcher.handle(start("speedo")).await.unwrap();
        assert_eq!(second, Transition::AlreadyRunning(handle));
        assert_eq!(runner.launches.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.registry().state("speedo"), Some(JobState::Running));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (mut dispatcher, _) = dispatcher(RecordingRunner::default());
        assert_eq!(
            dispatcher.handle(stop("speedo")).await.unwrap(),
            Transition::NotRunning
        );
        assert_eq!(dispatcher.registry().state("speedo"), Some(JobState::Stopped));

        dispatcher.handle(start("speedo")).await.unwrap();
        assert!(matches!(
            dispatcher.handle(stop("speedo")).await.unwrap(),
            Transition::Stopped(_)
        ));
        assert_eq!(
            dispatcher.handle(stop("speedo")).await.unwrap(),
            Transition::NotRunning
        );
    }

    #[tokio::test]
    async fn restart_after_stop_launches_again() {
        let (mut dispatcher, runner) = dispatcher(RecordingRunner::default());
        dispatcher.handle(start("speedo")).await.unwrap();
        dispatcher.handle(stop("speedo")).await.unwrap();
        dispatcher.handle(start("speedo")).await.unwrap();
        assert_eq!(runner.launches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_target_changes_nothing() {
        let (mut dispatcher, runner) = dispatcher(RecordingRunner::default());
        let result = dispatcher.handle(start("wordcount")).await;
        assert!(matches!(
            result,
            Err(DispatchError::Command(CommandError::UnknownTarget(x))) if x == "wordcount"
        ));
        assert!(runner.launches.lock().unwrap().is_empty());
        assert!(dispatcher
            .registry()
            .jobs()
            .all(|(_, state)| state == JobState::Stopped));
    }

    #[tokio::test]
    async fn failed_launch_stays_stopped() {
        let (mut dispatcher, _) = dispatcher(RecordingRunner {
            fail: true,
            ..Default::default()
        });
        let result = dispatcher.handle(start("ingest")).await;
        assert!(matches!(result, Err(DispatchError::Launch { target, .. }) if target == "ingest"));
        assert_eq!(dispatcher.registry().state("ingest"), Some(JobState::Stopped));
    }

    #[tokio::test]
    async fn targets_ignore_case_and_aliases() {
        let (mut dispatcher, runner) = dispatcher(RecordingRunner::default());
        dispatcher
            .handle(CommandRecord::new("KAFKA", Action::Start, Some("a.jsonl".into())))
            .await
            .unwrap();
        assert!(matches!(
            dispatcher.handle(start("Ingest")).await.unwrap(),
            Transition::AlreadyRunning(_)
        ));
        assert_eq!(
            *runner.launches.lock().unwrap(),
            vec![("ingest".to_owned(), Some("a.jsonl".to_owned()))]
        );
    }

    #[tokio::test]
    async fn bad_events_are_dropped() {
        use crate::store::{encode, ChangeKind, Namespace};
        use crate::control::CommandEntry;

        let (mut dispatcher, runner) = dispatcher(RecordingRunner::default());
        let event = ChangeEvent {
            namespace: Namespace::Command,
            key: "speedo".into(),
            value: encode(&CommandEntry {
                verb: "pause".into(),
                args: None,
            })
            .unwrap(),
            kind: ChangeKind::Added,
        };
        assert!(dispatcher.handle_event(&event).await.is_none());
        assert!(runner.launches.lock().unwrap().is_empty());
    }
}
