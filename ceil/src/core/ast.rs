//! Command AST produced by the parser.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One CEIL command.
///
/// Every variant except `FetchExternal` names a project path that must stay
/// inside the sandbox; see [`Command::path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Create {
        file: String,
        content: String,
    },
    Patch {
        file: String,
        search: String,
        replace: String,
    },
    Delete {
        file: String,
    },
    /// `target` is either a project script or a shell-style system invocation;
    /// the executor decides which.
    Run {
        target: String,
    },
    FetchExternal {
        url: String,
    },
}

/// Field-less discriminant of [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Patch,
    Delete,
    Run,
    FetchExternal,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Create => "CREATE",
            CommandKind::Patch => "PATCH",
            CommandKind::Delete => "DELETE",
            CommandKind::Run => "RUN",
            CommandKind::FetchExternal => "FETCH_EXTERNAL",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Create { .. } => CommandKind::Create,
            Command::Patch { .. } => CommandKind::Patch,
            Command::Delete { .. } => CommandKind::Delete,
            Command::Run { .. } => CommandKind::Run,
            Command::FetchExternal { .. } => CommandKind::FetchExternal,
        }
    }

    /// The project-relative path subject to sandbox containment, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Command::Create { file, .. }
            | Command::Patch { file, .. }
            | Command::Delete { file } => Some(file),
            Command::Run { target } => Some(target),
            Command::FetchExternal { .. } => None,
        }
    }

    /// The user-facing target: the path, or the URL for `FetchExternal`.
    pub fn target(&self) -> &str {
        match self {
            Command::FetchExternal { url } => url,
            other => other.path().unwrap_or_default(),
        }
    }
}

/// An ordered sequence of commands. Execution order is parse order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    pub commands: Vec<Command>,
}

impl Program {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_external_has_no_containment_path() {
        let cmd = Command::FetchExternal {
            url: "https://example.com/docs".to_string(),
        };
        assert_eq!(cmd.path(), None);
        assert_eq!(cmd.target(), "https://example.com/docs");
        assert_eq!(cmd.kind(), CommandKind::FetchExternal);
    }

    #[test]
    fn run_target_is_its_containment_path() {
        let cmd = Command::Run {
            target: "scripts/build.sh".to_string(),
        };
        assert_eq!(cmd.path(), Some("scripts/build.sh"));
    }

    #[test]
    fn commands_serialize_with_kind_tag() {
        let cmd = Command::Delete {
            file: "old.txt".to_string(),
        };
        let json = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(json["kind"], "delete");
        assert_eq!(json["file"], "old.txt");
    }
}
