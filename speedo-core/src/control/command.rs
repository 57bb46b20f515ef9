use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{ChangeEvent, Namespace, Store, StoreError, StoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Start,
    Stop,
}

impl FromStr for Action {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let verb = s.trim();
        if verb.eq_ignore_ascii_case("start") {
            Ok(Self::Start)
        } else if verb.eq_ignore_ascii_case("stop") {
            Ok(Self::Stop)
        } else {
            Err(CommandError::UnknownAction(s.to_owned()))
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Start => f.write_str("START"),
            Action::Stop => f.write_str("STOP"),
        }
    }
}

/// Value written under a job name into the command namespace.
///
/// The verb is kept as free text so commands with unknown verbs can still be
/// stored and are rejected when dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub verb: String,
    #[serde(default)]
    pub args: Option<String>,
}

/// A decoded request to start or stop a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub target: String,
    pub action: Action,
    pub args: Option<String>,
}

impl CommandRecord {
    pub fn new(target: impl Into<String>, action: Action, args: Option<String>) -> Self {
        Self {
            target: target.into(),
            action,
            args,
        }
    }

    /// Parse the stored entry of job `target`
    pub fn parse(target: &str, entry: CommandEntry) -> Result<Self, CommandError> {
        if entry.verb.trim().is_empty() {
            return Err(CommandError::MissingAction(target.to_owned()));
        }
        let action = entry.verb.parse()?;
        Ok(Self::new(target, action, entry.args))
    }

    /// Decode a change of the command namespace
    pub fn from_event(event: &ChangeEvent) -> Result<Self, CommandError> {
        let entry: CommandEntry = event.decode()?;
        Self::parse(&event.key, entry)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command target `{0}`")]
    UnknownTarget(String),
    #[error("Unknown command action `{0}`")]
    UnknownAction(String),
    #[error("Command for `{0}` carries no action")]
    MissingAction(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Write a command for job `target` into the store
pub async fn submit<S: Store + ?Sized>(
    store: &S,
    target: &str,
    verb: &str,
    args: Option<&str>,
) -> Result<(), StoreError> {
    let entry = CommandEntry {
        verb: verb.to_owned(),
        args: args.map(str::to_owned),
    };
    store.put_value(Namespace::Command, target, &entry).await
}
