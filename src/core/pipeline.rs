//! Pipeline orchestration: resolve working directories, switch telemetry
//! off, then authenticate and run the mode's commands in each directory,
//! strictly in order. The first failure ends the run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{Config, ENV_COMMAND, ENV_RUNTIME_AUTH, ENV_RUNTIME_NAMESPACE};
use crate::env_file;
use crate::error::{Error, Result};
use crate::runner::CommandRunner;
use crate::token::{self, TokenOrigin, TokenSource};

pub const TELEMETRY_OFF_COMMAND: &str = "aio telemetry off";
pub const BUILD_COMMAND: &str = "aio app build";
pub const DEPLOY_COMMAND: &str = "aio app deploy --no-build";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Build,
    Deploy,
    Auth,
}

impl RunMode {
    const ALL: [RunMode; 3] = [RunMode::Build, RunMode::Deploy, RunMode::Auth];

    /// Case-insensitive. Unset or blank is a missing argument.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let value = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
            Error::validation_missing_argument(vec![ENV_COMMAND.to_string()])
                .with_hint("Set COMMAND (or pass the mode as an argument): build, deploy or auth")
        })?;

        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "command",
                    format!("unknown aio command '{}'", value),
                    Some(value.to_string()),
                    Some(Self::ALL.iter().map(|m| m.as_str().to_string()).collect()),
                )
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Build => "build",
            RunMode::Deploy => "deploy",
            RunMode::Auth => "auth",
        }
    }

    pub fn commands(&self) -> &'static [&'static str] {
        match self {
            RunMode::Build => &[BUILD_COMMAND],
            RunMode::Deploy => &[DEPLOY_COMMAND],
            RunMode::Auth => &[],
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, RunMode::Deploy | RunMode::Auth)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryReport {
    pub work_dir: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenOrigin>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runtime_keys: Vec<String>,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub mode: RunMode,
    pub directories: Vec<DirectoryReport>,
}

/// Target directories: every configured monorepo service, or the app root.
pub fn resolve_work_dirs(config: &Config) -> Vec<PathBuf> {
    match config.monorepo_root() {
        Some(root) => config
            .services
            .iter()
            .map(|service| root.join(service))
            .collect(),
        None => vec![config.app_root.clone()],
    }
}

/// Trailing path segment of a working directory.
pub fn service_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub struct Pipeline<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    tokens: &'a dyn TokenSource,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        tokens: &'a dyn TokenSource,
    ) -> Self {
        Self {
            config,
            runner,
            tokens,
        }
    }

    /// Run the mode selected by the configuration.
    pub fn run(&self) -> Result<PipelineReport> {
        let mode = RunMode::parse(self.config.command.as_deref())?;
        self.run_mode(mode)
    }

    pub fn run_mode(&self, mode: RunMode) -> Result<PipelineReport> {
        crate::log_debug!("pipeline", "Running pipeline in {} mode", mode);
        let work_dirs = resolve_work_dirs(self.config);

        // The wrapped CLI prompts for telemetry consent unless it is off.
        self.runner.run(TELEMETRY_OFF_COMMAND, None)?;

        let mut directories = Vec::with_capacity(work_dirs.len());
        for dir in &work_dirs {
            directories.push(self.run_directory(mode, dir)?);
        }

        Ok(PipelineReport { mode, directories })
    }

    fn run_directory(&self, mode: RunMode, dir: &Path) -> Result<DirectoryReport> {
        crate::log_status!("pipeline", "▶️ Running aio commands in {}", dir.display());

        let token = if mode.requires_auth() {
            let resolved = self.tokens.resolve_token(dir)?;
            token::persist(&resolved.token, dir)?;
            Some(resolved.origin)
        } else {
            None
        };

        let service = service_name(dir);
        let runtime_keys = self.inject_runtime(&service, dir)?;

        let mut commands = Vec::with_capacity(mode.commands().len());
        for command in mode.commands() {
            self.runner.run(command, Some(dir))?;
            commands.push(command.to_string());
        }

        Ok(DirectoryReport {
            work_dir: dir.display().to_string(),
            service,
            token,
            runtime_keys,
            commands,
        })
    }

    /// Persist whichever runtime credentials are configured for `service`.
    fn inject_runtime(&self, service: &str, dir: &Path) -> Result<Vec<String>> {
        let Some(runtime) = self.config.runtime_for(service) else {
            crate::log_debug!("pipeline", "No runtime credentials configured for {}", service);
            return Ok(Vec::new());
        };

        let mut written = Vec::new();
        for (key, value) in [
            (ENV_RUNTIME_AUTH, &runtime.auth),
            (ENV_RUNTIME_NAMESPACE, &runtime.namespace),
        ] {
            match value {
                Some(value) => {
                    env_file::set(key, value, dir)?;
                    written.push(key.to_string());
                }
                None => crate::log_debug!("pipeline", "{} not set for {}, skipping", key, service),
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeCredentials;
    use crate::token::{AuthToken, ResolvedToken};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<(String, Option<PathBuf>)>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &str, work_dir: Option<&Path>) -> Result<i32> {
            self.calls
                .borrow_mut()
                .push((command.to_string(), work_dir.map(Path::to_path_buf)));
            Ok(0)
        }
    }

    #[derive(Default)]
    struct CountingTokens {
        calls: Cell<usize>,
    }

    impl TokenSource for CountingTokens {
        fn resolve_token(&self, _dir: &Path) -> Result<ResolvedToken> {
            self.calls.set(self.calls.get() + 1);
            Ok(ResolvedToken {
                token: AuthToken {
                    token: "tok".into(),
                    expiry: i64::MAX,
                },
                origin: TokenOrigin::Generated,
            })
        }
    }

    fn single_root(root: &Path, command: Option<&str>) -> Config {
        Config {
            command: command.map(String::from),
            debug: false,
            app_root: root.to_path_buf(),
            monorepo: None,
            ignored_services: Vec::new(),
            services: Vec::new(),
            runtimes: BTreeMap::from([(
                "default".to_string(),
                RuntimeCredentials {
                    auth: Some("runtime-auth".into()),
                    namespace: None,
                },
            )]),
            ims: Default::default(),
            ims_host: "https://ims.example".into(),
            run_as_user: None,
        }
    }

    #[test]
    fn parse_mode_is_case_insensitive() {
        assert_eq!(RunMode::parse(Some("BUILD")).unwrap(), RunMode::Build);
        assert_eq!(RunMode::parse(Some(" deploy ")).unwrap(), RunMode::Deploy);
        assert_eq!(RunMode::parse(Some("Auth")).unwrap(), RunMode::Auth);
    }

    #[test]
    fn parse_mode_rejects_missing_and_unknown() {
        let missing = RunMode::parse(None).unwrap_err();
        assert_eq!(missing.code.as_str(), "validation.missing_argument");
        assert_eq!(
            RunMode::parse(Some("")).unwrap_err().code.as_str(),
            "validation.missing_argument"
        );

        let unknown = RunMode::parse(Some("release")).unwrap_err();
        assert_eq!(unknown.code.as_str(), "validation.invalid_argument");
        assert_eq!(unknown.details["id"], "release");
    }

    #[test]
    fn mode_command_matrix() {
        assert_eq!(RunMode::Build.commands(), &["aio app build"]);
        assert!(!RunMode::Build.requires_auth());
        assert_eq!(RunMode::Deploy.commands(), &["aio app deploy --no-build"]);
        assert!(RunMode::Deploy.requires_auth());
        assert!(RunMode::Auth.commands().is_empty());
        assert!(RunMode::Auth.requires_auth());
    }

    #[test]
    fn build_runs_telemetry_then_build_without_auth() {
        let root = TempDir::new().unwrap();
        let config = single_root(root.path(), Some("build"));
        let runner = RecordingRunner::default();
        let tokens = CountingTokens::default();

        let report = Pipeline::new(&config, &runner, &tokens).run().unwrap();

        assert_eq!(tokens.calls.get(), 0);
        assert_eq!(
            *runner.calls.borrow(),
            vec![
                (TELEMETRY_OFF_COMMAND.to_string(), None),
                (BUILD_COMMAND.to_string(), Some(root.path().to_path_buf())),
            ]
        );
        assert_eq!(report.directories[0].token, None);
        assert_eq!(report.directories[0].runtime_keys, vec!["AIO_RUNTIME_AUTH"]);
    }

    #[test]
    fn auth_mode_authenticates_and_runs_no_app_command() {
        let root = TempDir::new().unwrap();
        let config = single_root(root.path(), Some("auth"));
        let runner = RecordingRunner::default();
        let tokens = CountingTokens::default();

        let report = Pipeline::new(&config, &runner, &tokens).run().unwrap();

        assert_eq!(tokens.calls.get(), 1);
        assert_eq!(runner.calls.borrow().len(), 1);
        assert!(report.directories[0].commands.is_empty());
        assert_eq!(
            env_file::get(token::TOKEN_KEY, root.path()).as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn missing_mode_fails_before_any_command() {
        let root = TempDir::new().unwrap();
        let config = single_root(root.path(), None);
        let runner = RecordingRunner::default();
        let tokens = CountingTokens::default();

        let err = Pipeline::new(&config, &runner, &tokens).run().unwrap_err();

        assert!(err.is_configuration());
        assert!(runner.calls.borrow().is_empty());
        assert!(!root.path().join(".env").exists());
    }

    #[test]
    fn service_name_is_trailing_segment() {
        assert_eq!(service_name(Path::new("/app/services/orders")), "orders");
        assert_eq!(service_name(Path::new("/app")), "app");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_service_dir_is_joined_verbatim() {
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new().unwrap();
        let raw = std::ffi::OsStr::from_bytes(b"svc-\xff");
        std::fs::create_dir_all(root.path().join("services").join(raw)).unwrap();

        let mut config = single_root(root.path(), Some("build"));
        config.monorepo = Some("services".into());
        config.services = vec![raw.to_os_string()];
        let runner = RecordingRunner::default();
        let tokens = CountingTokens::default();

        let report = Pipeline::new(&config, &runner, &tokens).run().unwrap();

        let dir = root.path().join("services").join(raw);
        assert_eq!(resolve_work_dirs(&config), vec![dir.clone()]);
        assert_eq!(runner.calls.borrow()[1].1.as_deref(), Some(dir.as_path()));
        assert_eq!(report.directories[0].service, raw.to_string_lossy());
    }

    #[test]
    fn resolve_work_dirs_for_monorepo_and_single_root() {
        let root = TempDir::new().unwrap();
        let mut config = single_root(root.path(), Some("build"));
        assert_eq!(resolve_work_dirs(&config), vec![root.path().to_path_buf()]);

        config.monorepo = Some("services".into());
        config.services = vec!["svcA".into()];
        assert_eq!(
            resolve_work_dirs(&config),
            vec![root.path().join("services").join("svcA")]
        );
    }
}
