use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use aio_pipe::config::Config;
use aio_pipe::env_file;
use aio_pipe::error::{Error, SubprocessFailedDetails};
use aio_pipe::pipeline::{Pipeline, BUILD_COMMAND, DEPLOY_COMMAND, TELEMETRY_OFF_COMMAND};
use aio_pipe::runner::CommandRunner;
use aio_pipe::token::{
    IdentityProvider, TokenOrigin, TokenProvider, TokenRequest, TOKEN_EXPIRY_KEY, TOKEN_KEY,
};
use aio_pipe::Result;
use tempfile::TempDir;

/// Shared record of runner and identity-provider calls, in call order.
type Journal = Rc<RefCell<Vec<String>>>;

#[derive(Default)]
struct ScriptedRunner {
    calls: RefCell<Vec<(String, Option<PathBuf>)>>,
    fail_in: Option<String>,
    journal: Journal,
}

impl ScriptedRunner {
    fn failing_in(service: &str) -> Self {
        Self {
            fail_in: Some(service.to_string()),
            ..Self::default()
        }
    }

    fn dirs(&self) -> Vec<Option<PathBuf>> {
        self.calls.borrow().iter().map(|(_, d)| d.clone()).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str, work_dir: Option<&Path>) -> Result<i32> {
        self.calls
            .borrow_mut()
            .push((command.to_string(), work_dir.map(Path::to_path_buf)));
        let place = work_dir
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        self.journal
            .borrow_mut()
            .push(format!("run {} in {}", command, place));

        let failing = match (&self.fail_in, work_dir) {
            (Some(service), Some(dir)) => dir.ends_with(service),
            _ => false,
        };
        if failing {
            return Err(Error::subprocess_failed(SubprocessFailedDetails {
                command: command.to_string(),
                exit_code: 2,
                work_dir: work_dir.map(|d| d.display().to_string()),
            }));
        }
        Ok(0)
    }
}

#[derive(Default)]
struct StubIdentity {
    calls: Cell<usize>,
    journal: Journal,
}

impl IdentityProvider for StubIdentity {
    fn request_token(&self, _request: &TokenRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.journal.borrow_mut().push("request token".to_string());
        Ok(format!("token-{}", self.calls.get()))
    }
}

fn monorepo(services: &[&str]) -> TempDir {
    let root = TempDir::new().unwrap();
    for service in services {
        fs::create_dir_all(root.path().join("services").join(service)).unwrap();
    }
    root
}

fn monorepo_config(root: &Path, command: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars = vec![
        ("APP_ROOT".to_string(), root.display().to_string()),
        ("MONOREPO".to_string(), "services".to_string()),
        ("COMMAND".to_string(), command.to_string()),
        ("CLIENT_ID".to_string(), "client".to_string()),
        ("CLIENT_SECRET".to_string(), "secret".to_string()),
        ("TECHNICAL_ACCOUNT_ID".to_string(), "tech@techacct.adobe.com".to_string()),
        ("IMS_ORG_ID".to_string(), "org@AdobeOrg".to_string()),
        ("KEY".to_string(), "pem".to_string()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Config::from_vars(vars).unwrap()
}

#[test]
fn ignored_service_is_never_visited() {
    let root = monorepo(&["svcA", "svcB"]);
    let config = monorepo_config(root.path(), "build", &[("IGNORED_SERVICES", "svcB")]);
    let runner = ScriptedRunner::default();
    let identity = StubIdentity::default();
    let tokens = TokenProvider::new(&config.ims, &identity);

    let report = Pipeline::new(&config, &runner, &tokens).run().unwrap();

    assert_eq!(report.directories.len(), 1);
    assert_eq!(report.directories[0].service, "svcA");
    assert_eq!(
        runner.dirs(),
        vec![None, Some(root.path().join("services").join("svcA"))]
    );
}

#[test]
fn deploy_authenticates_and_injects_runtime_per_service() {
    let root = monorepo(&["svcA", "svcB"]);
    let config = monorepo_config(
        root.path(),
        "deploy",
        &[
            ("SVCA_AIO_RUNTIME_AUTH", "auth-a"),
            ("SVCA_AIO_RUNTIME_NAMESPACE", "ns-a"),
            ("SVCB_AIO_RUNTIME_NAMESPACE", "ns-b"),
        ],
    );
    let journal = Journal::default();
    let runner = ScriptedRunner {
        journal: Rc::clone(&journal),
        ..ScriptedRunner::default()
    };
    let identity = StubIdentity {
        journal: Rc::clone(&journal),
        ..StubIdentity::default()
    };
    let tokens = TokenProvider::new(&config.ims, &identity);

    let report = Pipeline::new(&config, &runner, &tokens).run().unwrap();

    assert_eq!(identity.calls.get(), 2);
    assert_eq!(
        *journal.borrow(),
        vec![
            format!("run {} in -", TELEMETRY_OFF_COMMAND),
            "request token".to_string(),
            format!("run {} in svcA", DEPLOY_COMMAND),
            "request token".to_string(),
            format!("run {} in svcB", DEPLOY_COMMAND),
        ]
    );

    let svc_a = root.path().join("services").join("svcA");
    let svc_b = root.path().join("services").join("svcB");
    assert_eq!(env_file::get("AIO_RUNTIME_AUTH", &svc_a).as_deref(), Some("auth-a"));
    assert_eq!(env_file::get("AIO_RUNTIME_NAMESPACE", &svc_a).as_deref(), Some("ns-a"));
    assert_eq!(env_file::get("AIO_RUNTIME_AUTH", &svc_b), None);
    assert_eq!(env_file::get("AIO_RUNTIME_NAMESPACE", &svc_b).as_deref(), Some("ns-b"));
    assert!(env_file::get(TOKEN_KEY, &svc_a).is_some());
    assert!(env_file::get(TOKEN_EXPIRY_KEY, &svc_b).is_some());

    assert!(report
        .directories
        .iter()
        .all(|d| d.token == Some(TokenOrigin::Generated)));
}

#[test]
fn second_run_reuses_persisted_tokens() {
    let root = monorepo(&["svcA"]);
    let config = monorepo_config(root.path(), "auth", &[]);
    let runner = ScriptedRunner::default();
    let identity = StubIdentity::default();
    let tokens = TokenProvider::new(&config.ims, &identity);
    let pipeline = Pipeline::new(&config, &runner, &tokens);

    let first = pipeline.run().unwrap();
    let second = pipeline.run().unwrap();

    assert_eq!(identity.calls.get(), 1);
    assert_eq!(first.directories[0].token, Some(TokenOrigin::Generated));
    assert_eq!(second.directories[0].token, Some(TokenOrigin::Cached));
    let svc_a = root.path().join("services").join("svcA");
    assert_eq!(env_file::get(TOKEN_KEY, &svc_a).as_deref(), Some("token-1"));
}

#[test]
fn failing_directory_stops_the_run() {
    let root = monorepo(&["svcA", "svcB", "svcC"]);
    let config = monorepo_config(root.path(), "build", &[]);
    let runner = ScriptedRunner::failing_in("svcB");
    let identity = StubIdentity::default();
    let tokens = TokenProvider::new(&config.ims, &identity);

    let err = Pipeline::new(&config, &runner, &tokens).run().unwrap_err();

    assert_eq!(err.code.as_str(), "subprocess.failed");
    let services = root.path().join("services");
    assert_eq!(
        runner.dirs(),
        vec![None, Some(services.join("svcA")), Some(services.join("svcB"))]
    );
    assert_eq!(
        runner.calls.borrow().last().map(|(c, _)| c.as_str()),
        Some(BUILD_COMMAND)
    );
}

#[test]
fn missing_credentials_abort_deploy_before_any_app_command() {
    let root = monorepo(&["svcA"]);
    let config = Config::from_vars([
        ("APP_ROOT", root.path().to_str().unwrap()),
        ("MONOREPO", "services"),
        ("COMMAND", "deploy"),
    ])
    .unwrap();
    let runner = ScriptedRunner::default();
    let identity = StubIdentity::default();
    let tokens = TokenProvider::new(&config.ims, &identity);

    let err = Pipeline::new(&config, &runner, &tokens).run().unwrap_err();

    assert_eq!(err.code.as_str(), "config.missing_key");
    assert_eq!(identity.calls.get(), 0);
    let commands: Vec<String> = runner.calls.borrow().iter().map(|(c, _)| c.clone()).collect();
    assert_eq!(commands, vec![TELEMETRY_OFF_COMMAND]);
}

#[test]
fn unknown_mode_fails_before_telemetry() {
    let root = monorepo(&["svcA"]);
    let config = monorepo_config(root.path(), "publish", &[]);
    let runner = ScriptedRunner::default();
    let identity = StubIdentity::default();
    let tokens = TokenProvider::new(&config.ims, &identity);

    let err = Pipeline::new(&config, &runner, &tokens).run().unwrap_err();

    assert_eq!(err.code.as_str(), "validation.invalid_argument");
    assert!(runner.calls.borrow().is_empty());
}
