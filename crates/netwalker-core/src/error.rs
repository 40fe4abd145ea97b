use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] ssh2::Error),

    #[error("Connection error: failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection refused by {addr}")]
    ConnectRefused { addr: String },

    #[error("Authentication failed for user {username}")]
    AuthFailed { username: String },

    #[error("SSH handshake failed: {source}")]
    SshHandshakeFailed {
        #[source]
        source: ssh2::Error,
    },

    #[error("Command timed out: {command}")]
    CommandTimeout { command: String },

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Seed error: {0}")]
    SeedError(String),

    #[error("Secret error: {0}")]
    SecretError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Discovery cancelled")]
    Cancelled,
}

// Helper methods for error context
impl WalkError {
    pub fn connection_failed(addr: impl Into<String>, err: io::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            source: err,
        }
    }

    pub fn connect_refused(addr: impl Into<String>) -> Self {
        Self::ConnectRefused { addr: addr.into() }
    }

    pub fn auth_failed(username: impl Into<String>) -> Self {
        Self::AuthFailed {
            username: username.into(),
        }
    }

    pub fn command_timeout(command: impl Into<String>) -> Self {
        Self::CommandTimeout {
            command: command.into(),
        }
    }

    /// Short stable label used in `[FAIL]` markers and the `devices.status`
    /// failure annotation. Never contains credentials or addresses.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::IoError(_) => "io",
            Self::SshError(_) | Self::SshHandshakeFailed { .. } => "ssh",
            Self::ConnectionFailed { .. } => "connect-failed",
            Self::ConnectRefused { .. } => "connect-refused",
            Self::AuthFailed { .. } => "auth-failed",
            Self::CommandTimeout { .. } => "command-timeout",
            Self::ReadError(_) => "read",
            Self::WriteError(_) => "write",
            Self::PromptError(_) => "prompt",
            Self::ChannelError(_) => "channel",
            Self::ConfigError(_) | Self::ConfigSource(_) => "config",
            Self::SeedError(_) => "seed",
            Self::SecretError(_) => "secret",
            Self::ReportError(_) => "report",
            Self::Store(_) => "store",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the alternate transport should be tried after this failure.
    /// Only outright refusal and authentication failure trigger the telnet
    /// fallback; timeouts and protocol errors do not.
    pub fn warrants_transport_fallback(&self) -> bool {
        match self {
            Self::ConnectRefused { .. } | Self::AuthFailed { .. } => true,
            Self::ConnectionFailed { source, .. } => {
                source.kind() == io::ErrorKind::ConnectionRefused
            }
            Self::SshHandshakeFailed { .. } => true,
            _ => false,
        }
    }
}

// Storage-specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Transient errors are retried with bounded backoff; fatal errors abort
    /// the engine with partial results preserved.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Connection(sqlx::Error::Database(db)) => {
                let msg = db.message().to_lowercase();
                msg.contains("locked") || msg.contains("busy")
            }
            StoreError::Connection(sqlx::Error::Io(_)) => true,
            StoreError::Connection(sqlx::Error::PoolTimedOut) => true,
            StoreError::Query(_) => false,
            StoreError::Schema(_) | StoreError::Fatal(_) | StoreError::Serialization(_) => false,
            StoreError::Connection(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_policy() {
        assert!(WalkError::connect_refused("10.0.0.1:22").warrants_transport_fallback());
        assert!(WalkError::auth_failed("netops").warrants_transport_fallback());
        assert!(!WalkError::command_timeout("show version").warrants_transport_fallback());
        assert!(!WalkError::ReadError("eof".to_string()).warrants_transport_fallback());
    }

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(WalkError::connect_refused("x").kind_label(), "connect-refused");
        assert_eq!(WalkError::auth_failed("x").kind_label(), "auth-failed");
        assert_eq!(
            WalkError::command_timeout("show vlan").kind_label(),
            "command-timeout"
        );
    }

    #[test]
    fn test_store_fatal_is_not_transient() {
        assert!(!StoreError::Fatal("corrupt".to_string()).is_transient());
        assert!(!StoreError::Query("bad sql".to_string()).is_transient());
    }
}
