//! Classification of `RUN` targets.

/// Tools a `RUN` may invoke through the platform shell.
pub const SYSTEM_TOOLS: [&str; 6] = ["pip", "pip3", "npm", "npx", "node", "git"];

/// Interpreter prefixes stripped from project-script invocations.
pub const PYTHON_PREFIXES: [&str; 2] = ["python", "python3"];

/// What a `RUN` target asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget<'a> {
    /// A shell command line whose first word is in [`SYSTEM_TOOLS`].
    System(&'a str),
    /// A project script, with any words after it passed as arguments.
    Script { path: &'a str, args: Vec<&'a str> },
    /// `python` or `python3` with nothing after it.
    MissingScript,
}

impl<'a> RunTarget<'a> {
    /// The path that sandbox containment applies to.
    pub fn containment_path(&self, raw: &'a str) -> &'a str {
        match self {
            RunTarget::Script { path, .. } => *path,
            RunTarget::System(_) | RunTarget::MissingScript => raw,
        }
    }
}

/// Classify a `RUN` target. Pure; the executor resolves scripts on disk.
pub fn classify(target: &str) -> RunTarget<'_> {
    let mut words = target.split_whitespace();
    let Some(first) = words.next() else {
        return RunTarget::MissingScript;
    };
    if SYSTEM_TOOLS.contains(&first) {
        return RunTarget::System(target.trim());
    }
    let path = if PYTHON_PREFIXES.contains(&first) {
        match words.next() {
            Some(script) => script,
            None => return RunTarget::MissingScript,
        }
    } else {
        first
    };
    RunTarget::Script {
        path,
        args: words.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_tools_are_system_invocations() {
        assert_eq!(
            classify("pip install requests"),
            RunTarget::System("pip install requests")
        );
        assert_eq!(classify("  git status "), RunTarget::System("git status"));
    }

    #[test]
    fn python_prefix_is_stripped() {
        assert_eq!(
            classify("python3 tools/gen.py --fast"),
            RunTarget::Script {
                path: "tools/gen.py",
                args: vec!["--fast"],
            }
        );
    }

    #[test]
    fn bare_interpreter_has_no_script() {
        assert_eq!(classify("python"), RunTarget::MissingScript);
        assert_eq!(classify(""), RunTarget::MissingScript);
    }

    #[test]
    fn unknown_first_word_is_a_script() {
        let target = "scripts/build.sh release";
        let parsed = classify(target);
        assert_eq!(parsed.containment_path(target), "scripts/build.sh");
    }

    #[test]
    fn system_containment_uses_raw_target() {
        let target = "npm test";
        assert_eq!(classify(target).containment_path(target), "npm test");
    }
}
