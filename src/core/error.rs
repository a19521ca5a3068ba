use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    AuthProviderFailed,

    SubprocessFailed,
    SubprocessSpawnFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::AuthProviderFailed => "auth.provider_failed",

            ErrorCode::SubprocessFailed => "subprocess.failed",
            ErrorCode::SubprocessSpawnFailed => "subprocess.spawn_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderFailedDetails {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubprocessFailedDetails {
    pub command: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let message = format!("Missing required argument: {}", args.join(", "));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            message,
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let message = format!("Invalid argument: {}", problem);
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem,
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, message, details)
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let message = format!("Missing required configuration key: {}", key);
        Self::new(
            ErrorCode::ConfigMissingKey,
            message,
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        let message = format!("Invalid configuration value for {}: {}", key, problem);
        let details = to_details(ConfigInvalidValueDetails {
            key,
            value,
            problem,
        });

        Self::new(ErrorCode::ConfigInvalidValue, message, details)
    }

    pub fn auth_provider_failed(
        host: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let message = match status {
            Some(code) => format!("Identity provider returned HTTP {}: {}", code, error),
            None => format!("Identity provider request failed: {}", error),
        };
        let details = to_details(AuthProviderFailedDetails {
            host: host.into(),
            status,
            error,
        });

        Self::new(ErrorCode::AuthProviderFailed, message, details)
    }

    pub fn subprocess_failed(details: SubprocessFailedDetails) -> Self {
        let message = format!(
            "Command '{}' exited with code {}",
            details.command, details.exit_code
        );
        Self::new(ErrorCode::SubprocessFailed, message, to_details(details))
    }

    pub fn subprocess_spawn_failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        let command = command.into();
        let error = error.into();
        let message = format!("Failed to spawn '{}': {}", command, error);
        Self::new(
            ErrorCode::SubprocessSpawnFailed,
            message,
            serde_json::json!({ "command": command, "error": error }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        Self::new(
            ErrorCode::InternalIoError,
            message,
            to_details(InternalIoErrorDetails { error, context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Configuration and validation errors: the run never started any
    /// directory work.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigMissingKey
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::ValidationMissingArgument
                | ErrorCode::ValidationInvalidArgument
        )
    }
}
