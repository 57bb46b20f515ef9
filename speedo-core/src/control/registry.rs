use indexmap::IndexMap;

use super::JobHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Stopped,
    Running,
}

/// Which jobs a dispatcher has running.
///
/// Job names and aliases are matched case-insensitively. The registry is
/// local to its owner and never shared.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: IndexMap<String, Option<JobHandle>>,
    aliases: IndexMap<String, String>,
}

impl JobRegistry {
    /// Registry knowing the given jobs, all of them stopped
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        Self {
            jobs: names
                .into_iter()
                .map(|n| (n.as_ref().to_lowercase(), None))
                .collect(),
            aliases: IndexMap::new(),
        }
    }

    /// Accept `alias` as another name of job `name`
    pub fn with_alias(mut self, alias: &str, name: &str) -> Self {
        self.aliases.insert(alias.to_lowercase(), name.to_lowercase());
        self
    }

    /// Canonical name of a job, `None` if the job is unknown
    pub fn resolve(&self, target: &str) -> Option<&str> {
        let lower = target.trim().to_lowercase();
        let name = self.aliases.get(&lower).unwrap_or(&lower);
        self.jobs.get_key_value(name).map(|(k, _)| k.as_str())
    }

    pub fn state(&self, target: &str) -> Option<JobState> {
        let name = self.resolve(target)?;
        match self.jobs.get(name)? {
            Some(_) => Some(JobState::Running),
            None => Some(JobState::Stopped),
        }
    }

    /// Handle of the running instance of a job
    pub fn handle(&self, target: &str) -> Option<&JobHandle> {
        let name = self.resolve(target)?;
        self.jobs.get(name)?.as_ref()
    }

    /// All known jobs and their state
    pub fn jobs(&self) -> impl Iterator<Item = (&str, JobState)> {
        self.jobs.iter().map(|(name, handle)| {
            let state = match handle {
                Some(_) => JobState::Running,
                None => JobState::Stopped,
            };
            (name.as_str(), state)
        })
    }

    /// Record `handle` as the running instance, returns `false` for an
    /// unknown job
    pub(crate) fn mark_running(&mut self, target: &str, handle: JobHandle) -> bool {
        let Some(name) = self.resolve(target).map(str::to_owned) else {
            return false;
        };
        self.jobs.insert(name, Some(handle));
        true
    }

    /// Forget the running instance, returning it
    pub(crate) fn mark_stopped(&mut self, target: &str) -> Option<JobHandle> {
        let name = self.resolve(target)?.to_owned();
        self.jobs.get_mut(&name)?.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let registry = JobRegistry::new(["ingest", "speedo"]);
        assert_eq!(registry.state("ingest"), Some(JobState::Stopped));
        assert_eq!(registry.state("speedo"), Some(JobState::Stopped));
        assert_eq!(registry.state("wordcount"), None);
    }

    #[test]
    fn matches_names_ignoring_case() {
        let registry = JobRegistry::new(["Speedo"]).with_alias("KAFKA", "speedo");
        assert_eq!(registry.resolve("SPEEDO"), Some("speedo"));
        assert_eq!(registry.resolve(" speedo "), Some("speedo"));
        assert_eq!(registry.resolve("Kafka"), Some("speedo"));
        assert_eq!(registry.resolve("other"), None);
    }

    #[test]
    fn running_and_stopped() {
        let mut registry = JobRegistry::new(["ingest"]).with_alias("kafka", "ingest");
        let handle = JobHandle::new("ingest");
        assert!(registry.mark_running("kafka", handle.clone()));
        assert_eq!(registry.state("ingest"), Some(JobState::Running));
        assert_eq!(registry.handle("INGEST"), Some(&handle));

        assert_eq!(registry.mark_stopped("ingest"), Some(handle));
        assert_eq!(registry.state("kafka"), Some(JobState::Stopped));
        assert_eq!(registry.mark_stopped("ingest"), None);
    }

    #[test]
    fn unknown_jobs_are_not_added() {
        let mut registry = JobRegistry::new(["ingest"]);
        assert!(!registry.mark_running("speedo", JobHandle::new("speedo")));
        assert_eq!(registry.jobs().count(), 1);
    }
}
