//! Typed command builder

use std::fmt;

use super::constants::TAG_ATTRIBUTE;
use super::sentence::Sentence;

/// A command sentence without its tag
///
/// The tag is assigned by the connection when the command is sent, so the
/// same `Command` can be retried on a fresh connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    args: Vec<String>,
}

impl Command {
    /// Create a command for a menu path, e.g. `/interface/print`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Add an attribute word `=name=value`
    pub fn attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.args.push(format!("={}={}", name, value.as_ref()));
        self
    }

    /// Add a query word `?expr`
    pub fn query(mut self, expr: impl AsRef<str>) -> Self {
        self.args.push(format!("?{}", expr.as_ref()));
        self
    }

    /// Restrict returned properties
    pub fn proplist(self, props: &[&str]) -> Self {
        let joined = props.join(",");
        self.attr(".proplist", joined)
    }

    /// Command path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Argument words in order
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Look up the value of an attribute argument
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.iter().find_map(|word| {
            word.strip_prefix('=')
                .and_then(|rest| rest.strip_prefix(name))
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// Build the wire sentence with the given tag
    pub fn to_sentence(&self, tag: &str) -> Sentence {
        let mut sentence = Sentence::from_words(std::iter::once(self.path.clone()));
        for arg in &self.args {
            sentence.push(arg.clone());
        }
        sentence.push(format!("{}={}", TAG_ATTRIBUTE, tag));
        sentence
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for arg in &self.args {
            if arg.starts_with("=password=") {
                f.write_str(" =password=***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
