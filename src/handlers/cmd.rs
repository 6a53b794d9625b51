use crate::error::{LaunchError, Result};
use crate::executor::LaunchParams;
use crate::handler::Handler;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Program and arguments of the launch.
///
/// The executable path is passed to the OS as given. [`Cmd::search`]
/// resolves a bare program name against `PATH` first.
#[derive(Debug, Clone)]
pub struct Cmd {
    exe: PathBuf,
    args: Vec<OsString>,
    #[cfg_attr(windows, allow(dead_code))]
    arg0: Option<OsString>,
}

impl Cmd {
    pub fn new(exe: impl AsRef<Path>) -> Self {
        Self {
            exe: exe.as_ref().to_path_buf(),
            args: Vec::new(),
            arg0: None,
        }
    }

    /// Look `name` up in `PATH`.
    ///
    /// A name containing a directory separator is not searched, only
    /// checked. On Unix systems the program still sees `name` as its
    /// `argv[0]`.
    pub fn search(name: impl AsRef<OsStr>) -> Result<Self> {
        let name = name.as_ref();
        let exe = search_path(name).ok_or_else(|| LaunchError::Io {
            kind: std::io::ErrorKind::NotFound,
            message: format!("'{}' not found in PATH", name.to_string_lossy()),
        })?;
        log::debug!("Resolved {:?} to {}", name, exe.display());
        Ok(Self {
            arg0: Some(name.to_os_string()),
            ..Self::new(exe)
        })
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Override the program name the child sees (Unix only; ignored on
    /// Windows, where the command line starts with the executable path).
    pub fn arg0(mut self, arg0: impl AsRef<OsStr>) -> Self {
        self.arg0 = Some(arg0.as_ref().to_os_string());
        self
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

impl Handler for Cmd {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        params.exe = Some(self.exe.clone());
        params.args = self.args.clone();
        #[cfg(unix)]
        {
            params.arg0 = self.arg0.clone();
        }
        Ok(())
    }
}

fn search_path(name: &OsStr) -> Option<PathBuf> {
    let given = Path::new(name);
    if given.components().count() > 1 {
        return candidates(given).into_iter().find(|p| is_executable(p));
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir.join(name)))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn candidates(path: &Path) -> Vec<PathBuf> {
    vec![path.to_path_buf()]
}

#[cfg(windows)]
fn candidates(path: &Path) -> Vec<PathBuf> {
    if path.extension().is_some() {
        return vec![path.to_path_buf()];
    }
    let exts = std::env::var_os("PATHEXT")
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".COM;.EXE;.BAT;.CMD".to_string());
    exts.split(';')
        .filter(|e| !e.is_empty())
        .map(|ext| {
            let mut name = path.as_os_str().to_os_string();
            name.push(ext);
            PathBuf::from(name)
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
