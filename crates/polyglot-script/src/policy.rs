//! Host access policy for interpreted handlers.
//!
//! Scripting bundles run as ordinary host processes. The policy decides
//! whether they may run at all and which environment they inherit.

use std::path::Path;

use tokio::process::Command;

use polyglot_common::{HostAccess, Language, RuntimeError};

/// Variables kept under [`HostAccess::Restricted`].
const RESTRICTED_PASSTHROUGH: [&str; 2] = ["PATH", "LANG"];

/// Trust policy applied to every interpreter process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostPolicy {
    access: HostAccess,
}

impl HostPolicy {
    /// Create a policy for the given access level.
    pub fn new(access: HostAccess) -> Self {
        Self { access }
    }

    /// The configured access level.
    pub fn access(self) -> HostAccess {
        self.access
    }

    /// Fail if bundles in `language` may not run.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ScriptingDenied`] under [`HostAccess::Denied`].
    pub fn check(self, language: Language) -> Result<(), RuntimeError> {
        match self.access {
            HostAccess::Denied => Err(RuntimeError::ScriptingDenied {
                language: language.to_string(),
            }),
            HostAccess::Full | HostAccess::Restricted => Ok(()),
        }
    }

    /// Configure the environment of `command` for a bundle rooted at
    /// `bundle_dir`.
    pub fn apply(self, command: &mut Command, bundle_dir: &Path) {
        if self.access != HostAccess::Restricted {
            return;
        }

        command.env_clear();
        for key in RESTRICTED_PASSTHROUGH {
            if let Some(value) = std::env::var_os(key) {
                command.env(key, value);
            }
        }
        command.env("HOME", bundle_dir);
    }
}

impl From<HostAccess> for HostPolicy {
    fn from(access: HostAccess) -> Self {
        Self::new(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_full_access() {
        let policy = HostPolicy::default();
        assert_eq!(policy.access(), HostAccess::Full);
        assert!(policy.check(Language::JavaScript).is_ok());
    }

    #[test]
    fn test_denied_refuses_scripts() {
        let policy = HostPolicy::new(HostAccess::Denied);

        let err = policy.check(Language::Python).unwrap_err();
        assert!(matches!(err, RuntimeError::ScriptingDenied { .. }));
        assert!(err.to_string().contains("python"));
    }

    #[test]
    fn test_restricted_clears_environment() {
        let mut command = Command::new("env");
        HostPolicy::new(HostAccess::Restricted).apply(&mut command, Path::new("/srv/bundle"));

        let envs: Vec<_> = command.as_std().get_envs().collect();
        assert!(envs.iter().any(|(key, value)| {
            *key == "HOME" && *value == Some(std::ffi::OsStr::new("/srv/bundle"))
        }));
        assert!(envs
            .iter()
            .all(|(key, _)| ["HOME", "PATH", "LANG"].contains(&key.to_str().unwrap())));
    }

    #[test]
    fn test_full_leaves_environment_untouched() {
        let mut command = Command::new("env");
        HostPolicy::new(HostAccess::Full).apply(&mut command, Path::new("/srv/bundle"));

        assert_eq!(command.as_std().get_envs().count(), 0);
    }
}
