//! Process configuration snapshot.
//!
//! Everything the pipeline needs from the environment is read once here and
//! passed explicitly to the components that need it.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::io;

pub const DEFAULT_APP_ROOT: &str = "/app";
pub const DEFAULT_SCOPE: &str = "ent_eventpublisher_sdk";
pub const DEFAULT_IMS_HOST: &str = "https://ims-na1.adobelogin.com";

/// Runtime entry used when no monorepo is configured.
pub const DEFAULT_RUNTIME_KEY: &str = "default";

pub const ENV_COMMAND: &str = "COMMAND";
pub const ENV_DEBUG: &str = "DEBUG";
pub const ENV_APP_ROOT: &str = "APP_ROOT";
pub const ENV_MONOREPO: &str = "MONOREPO";
pub const ENV_IGNORED_SERVICES: &str = "IGNORED_SERVICES";
pub const ENV_RUNTIME_AUTH: &str = "AIO_RUNTIME_AUTH";
pub const ENV_RUNTIME_NAMESPACE: &str = "AIO_RUNTIME_NAMESPACE";
const ENV_RUNTIME_NAMESPACE_LEGACY: &str = "AIO_RUN";
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_TECHNICAL_ACCOUNT_ID: &str = "TECHNICAL_ACCOUNT_ID";
pub const ENV_IMS_ORG_ID: &str = "IMS_ORG_ID";
pub const ENV_PRIVATE_KEY: &str = "KEY";
pub const ENV_SCOPES: &str = "SCOPES";
pub const ENV_IMS_HOST: &str = "IMS_HOST";
/// Unset means commands run as the current user. Images that expect the aio
/// CLI to run as `node` must set `RUN_AS_USER=node`.
pub const ENV_RUN_AS_USER: &str = "RUN_AS_USER";

/// Per-service runtime credentials written into each service's `.env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCredentials {
    pub auth: Option<String>,
    pub namespace: Option<String>,
}

/// Identity-provider credentials. Presence is only checked when a new token
/// has to be requested.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ImsCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub technical_account_id: Option<String>,
    pub ims_org_id: Option<String>,
    pub private_key: Option<String>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ImsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ImsCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("technical_account_id", &self.technical_account_id)
            .field("ims_org_id", &self.ims_org_id)
            .field("private_key", &redacted(&self.private_key))
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub command: Option<String>,
    pub debug: bool,
    pub app_root: PathBuf,
    pub monorepo: Option<String>,
    pub ignored_services: Vec<String>,
    /// Service directory names under the monorepo root, as found on disk.
    pub services: Vec<OsString>,
    pub runtimes: BTreeMap<String, RuntimeCredentials>,
    pub ims: ImsCredentials,
    pub ims_host: String,
    pub run_as_user: Option<String>,
}

impl Config {
    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(utf8_vars(std::env::vars_os()))
    }

    /// Build a configuration from an explicit set of variables.
    ///
    /// In monorepo mode this lists the monorepo directory to discover
    /// services, so the directory must exist.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| non_empty(&vars, key);

        let app_root = PathBuf::from(get(ENV_APP_ROOT).unwrap_or_else(|| DEFAULT_APP_ROOT.into()));
        let monorepo = get(ENV_MONOREPO);
        let ignored_services = get(ENV_IGNORED_SERVICES)
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let services = match &monorepo {
            Some(name) => discover_services(&app_root, name, &ignored_services)?,
            None => Vec::new(),
        };

        let runtimes = if monorepo.is_some() {
            services
                .iter()
                .map(|service| {
                    let service = service.to_string_lossy().into_owned();
                    let lookup = |key: &str| {
                        get(&format!("{}_{}", service.to_uppercase(), key))
                            .or_else(|| get(&format!("{}_{}", service_env_prefix(&service), key)))
                    };
                    let creds = RuntimeCredentials {
                        auth: lookup(ENV_RUNTIME_AUTH),
                        namespace: lookup(ENV_RUNTIME_NAMESPACE),
                    };
                    (service, creds)
                })
                .collect()
        } else {
            let creds = RuntimeCredentials {
                auth: get(ENV_RUNTIME_AUTH),
                namespace: get(ENV_RUNTIME_NAMESPACE)
                    .or_else(|| get(ENV_RUNTIME_NAMESPACE_LEGACY)),
            };
            BTreeMap::from([(DEFAULT_RUNTIME_KEY.to_string(), creds)])
        };

        let scopes = get(ENV_SCOPES)
            .map(|raw| split_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        let ims = ImsCredentials {
            client_id: get(ENV_CLIENT_ID),
            client_secret: get(ENV_CLIENT_SECRET),
            technical_account_id: get(ENV_TECHNICAL_ACCOUNT_ID),
            ims_org_id: get(ENV_IMS_ORG_ID),
            private_key: get(ENV_PRIVATE_KEY),
            scopes,
        };

        Ok(Self {
            command: get(ENV_COMMAND),
            debug: get(ENV_DEBUG).is_some_and(|v| parse_flag(&v)),
            app_root,
            monorepo,
            ignored_services,
            services,
            runtimes,
            ims,
            ims_host: get(ENV_IMS_HOST)
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_IMS_HOST.to_string()),
            run_as_user: get(ENV_RUN_AS_USER),
        })
    }

    /// Override the run mode (CLI argument wins over `COMMAND`).
    pub fn with_command(mut self, command: Option<String>) -> Self {
        if let Some(command) = command.filter(|c| !c.trim().is_empty()) {
            self.command = Some(command);
        }
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = self.debug || debug;
        self
    }

    /// `app_root/monorepo` when a monorepo is configured.
    pub fn monorepo_root(&self) -> Option<PathBuf> {
        self.monorepo.as_ref().map(|name| self.app_root.join(name))
    }

    /// Runtime credentials for a service.
    ///
    /// Without a monorepo every directory uses the `default` entry.
    pub fn runtime_for(&self, service: &str) -> Option<&RuntimeCredentials> {
        if self.monorepo.is_some() {
            self.runtimes.get(service)
        } else {
            self.runtimes.get(DEFAULT_RUNTIME_KEY)
        }
    }
}

/// Shell-safe alias prefix for a service's runtime credentials.
///
/// `my-service` → `MY_SERVICE`. The literal upper-cased name
/// (`MY-SERVICE_AIO_RUNTIME_AUTH`) is looked up first.
pub fn service_env_prefix(service: &str) -> String {
    service
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn discover_services(app_root: &Path, monorepo: &str, ignored: &[String]) -> Result<Vec<OsString>> {
    let root = app_root.join(monorepo);
    let dirs = io::list_subdirectories(&root, "list monorepo services").map_err(|e| {
        Error::config_invalid_value(
            ENV_MONOREPO,
            Some(monorepo.to_string()),
            format!("cannot read {}: {}", root.display(), e),
        )
        .with_hint(format!(
            "MONOREPO is resolved relative to {} (set APP_ROOT to change it)",
            app_root.display()
        ))
    })?;

    Ok(dirs
        .into_iter()
        .filter(|dir| !ignored.iter().any(|skip| dir.as_os_str() == skip.as_str()))
        .collect())
}

fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
