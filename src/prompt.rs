//! Password acquisition.
//!
//! The store core never reads passwords from argv or the environment; the
//! boundary injects a [`Prompter`] wherever one is needed. The terminal
//! implementation lives in the CLI binary.

use crate::error::Result;

/// A source of passwords.
pub trait Prompter {
    /// Ask for a password. With `confirm` the password is entered twice
    /// and must match.
    fn password(&self, prompt: &str, confirm: bool) -> Result<String>;
}

/// A prompter that always answers with a fixed password. For tests and
/// non-interactive callers.
pub struct StaticPrompter(pub String);

impl Prompter for StaticPrompter {
    fn password(&self, _prompt: &str, _confirm: bool) -> Result<String> {
        Ok(self.0.clone())
    }
}
