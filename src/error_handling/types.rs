use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    CliError(String),
    MissingCommand,
    BadPath(String),
    BadHeader(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::CliError(e) => write!(f, "Command line error: {}", e),
            ConfigError::MissingCommand => write!(f, "No stdio command configured"),
            ConfigError::BadPath(e) => write!(f, "Path error: {}", e),
            ConfigError::BadHeader(e) => write!(f, "Header formatting error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug, PartialEq)]
pub enum SessionError {
    MissingId,
    NotFound(String),
    InvalidMessage(String),
    SendFailed(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingId => write!(f, "Missing sessionId parameter"),
            SessionError::NotFound(id) => write!(f, "No active SSE connection for session {}", id),
            SessionError::InvalidMessage(e) => write!(f, "Invalid message: {}", e),
            SessionError::SendFailed(e) => write!(f, "Send failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum ChildError {
    SpawnFailed(std::io::Error),
    MissingPipe(&'static str),
    StdinWriteFailed(std::io::Error),
    StdinClosed,
    SerializeFailed(String),
    WaitFailed(std::io::Error),
}

impl fmt::Display for ChildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildError::SpawnFailed(e) => write!(f, "Child spawn failed: {}", e),
            ChildError::MissingPipe(name) => write!(f, "Child {} pipe unavailable", name),
            ChildError::StdinWriteFailed(e) => write!(f, "Child stdin write failed: {}", e),
            ChildError::StdinClosed => write!(f, "Child stdin writer stopped"),
            ChildError::SerializeFailed(e) => write!(f, "Message serialization failed: {}", e),
            ChildError::WaitFailed(e) => write!(f, "Waiting on child failed: {}", e),
        }
    }
}

impl std::error::Error for ChildError {}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
    InvalidHeader(String),
    InvalidOrigin(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Bind failed: {}", e),
            WebError::InvalidHeader(e) => write!(f, "Invalid response header: {}", e),
            WebError::InvalidOrigin(e) => write!(f, "Invalid CORS origin: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum GatewayError {
    ConfigurationError(ConfigError),
    ChildError(ChildError),
    StorageError(StorageError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            GatewayError::ChildError(e) => write!(f, "Child process error: {}", e),
            GatewayError::StorageError(e) => write!(f, "Storage error: {}", e),
            GatewayError::WebError(e) => write!(f, "Web server error: {}", e),
            GatewayError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        GatewayError::ConfigurationError(err)
    }
}

impl From<ChildError> for GatewayError {
    fn from(err: ChildError) -> Self {
        GatewayError::ChildError(err)
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        GatewayError::StorageError(err)
    }
}

impl From<WebError> for GatewayError {
    fn from(err: WebError) -> Self {
        GatewayError::WebError(err)
    }
}
