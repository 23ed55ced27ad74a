use std::{iter::Sum, ops};

/// A shell script. It renders with a shebang header and sets the strict evaluation flags.
/// Can be combined with other scripts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script(String);

impl Script {
    pub fn from_vec<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self(command_line(tokens))
    }

    /// A command run from inside `dir`.
    pub fn in_dir<S: AsRef<str>>(dir: &str, tokens: &[S]) -> Self {
        Self(format!("(cd {} && {})", quoted(dir), command_line(tokens)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Renders tokens as a single quoted command line.
pub fn command_line<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| quoted(token.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

// Quote all strings expect for explicit bash variable references.
fn quoted(src: &str) -> String {
    if src.starts_with("${") {
        format!(r#""{src}""#)
    } else {
        yash_quote::quoted(src).to_string()
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "#!/bin/bash")?;
        writeln!(f, "set -euo pipefail")?;
        writeln!(f)?;
        write!(f, "{}", self.0)?;
        Ok(())
    }
}

impl ops::Add<Script> for Script {
    type Output = Script;

    fn add(self, rhs: Script) -> Self::Output {
        if self.is_empty() {
            return rhs;
        }
        Script(format!("{}\n{}", self.0, rhs.0))
    }
}

impl Sum for Script {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(|lhs, rhs| lhs + rhs).unwrap_or_default()
    }
}
