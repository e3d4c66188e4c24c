use regex_lite::Regex;
use std::path::PathBuf;

/// Name of the Java runtime component.
pub const RUNTIME: &str = "java-runtime";
/// Name of the relay client component.
pub const RELAY_CLIENT: &str = "relay-client";

/// How to tell whether a component is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Present if the command runs and exits successfully.
    Command { program: PathBuf, args: Vec<String> },
    /// Present if the path exists.
    Path(PathBuf),
    /// Present if `<java> -version` reports at least `min_major`.
    JavaRuntime { java: PathBuf, min_major: u32 },
}

/// How to install a missing component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSpec {
    /// Run a command; success means installed.
    Command(Vec<String>),
    /// Download a single executable to `dest`.
    Download { url: String, dest: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub mandatory: bool,
    pub presence: Presence,
    pub install: Option<InstallSpec>,
}

impl Component {
    pub fn mandatory(name: impl Into<String>, presence: Presence) -> Self {
        Self {
            name: name.into(),
            mandatory: true,
            presence,
            install: None,
        }
    }

    pub fn optional(name: impl Into<String>, presence: Presence) -> Self {
        Self {
            mandatory: false,
            ..Self::mandatory(name, presence)
        }
    }

    pub fn with_install(mut self, install: Option<InstallSpec>) -> Self {
        self.install = install;
        self
    }
}

/// Major version from `java -version` output.
///
/// Handles both `1.8.0_392` (major 8) and `17.0.9` styles.
pub fn parse_java_major(output: &str) -> Option<u32> {
    let re = Regex::new(r#"version "(\d+)(?:\.(\d+))?"#).ok()?;
    let caps = re.captures(output)?;
    let first: u32 = caps.get(1)?.as_str().parse().ok()?;
    if first == 1 {
        caps.get(2)?.as_str().parse().ok()
    } else {
        Some(first)
    }
}
