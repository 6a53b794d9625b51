use crate::error::Result;
use crate::executor::LaunchParams;
use crate::handler::Handler;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Working directory of the child.
#[derive(Debug, Clone)]
pub struct StartDir {
    dir: PathBuf,
}

impl StartDir {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl Handler for StartDir {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        params.work_dir = Some(self.dir.clone());
        Ok(())
    }
}

/// Environment of the child.
///
/// Starts from the environment installed by an earlier handler, the
/// parent's environment, or nothing at all when [`Env::cleared`] was used,
/// then applies removals and assignments in that order.
#[derive(Debug, Clone, Default)]
pub struct Env {
    clear: bool,
    set: Vec<(OsString, OsString)>,
    remove: Vec<OsString>,
}

impl Env {
    /// Inherit the parent's environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an empty environment.
    pub fn cleared() -> Self {
        Self {
            clear: true,
            ..Self::default()
        }
    }

    pub fn set(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.set
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn remove(mut self, key: impl AsRef<OsStr>) -> Self {
        self.remove.push(key.as_ref().to_os_string());
        self
    }

    fn is_noop(&self) -> bool {
        !self.clear && self.set.is_empty() && self.remove.is_empty()
    }
}

// Windows environment names are case-insensitive.
#[cfg(windows)]
fn same_key(a: &OsStr, b: &OsStr) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(unix)]
fn same_key(a: &OsStr, b: &OsStr) -> bool {
    a == b
}

impl Handler for Env {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        if self.is_noop() {
            return Ok(());
        }
        let mut vars = match (self.clear, params.env.take()) {
            (true, _) => Vec::new(),
            (false, Some(vars)) => vars,
            (false, None) => std::env::vars_os().collect(),
        };

        vars.retain(|(key, _)| !self.remove.iter().any(|r| same_key(key, r)));
        for (key, value) in &self.set {
            match vars.iter_mut().find(|(k, _)| same_key(k, key)) {
                Some(entry) => entry.1 = value.clone(),
                None => vars.push((key.clone(), value.clone())),
            }
        }
        params.env = Some(vars);
        Ok(())
    }
}
