use crate::channel::{CliChannel, TransportStream};
use crate::error::WalkError;
use crate::model::Transport;
use crate::patterns::{CRLF_PATTERN, GENERIC_PROMPT_PATTERN};
use regex::Regex;
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

lazy_static! {
    static ref LOGIN_PROMPT_PATTERN: Regex = Regex::new(r"(?i)(sername|ogin)\s*:\s*$").unwrap();
    static ref PASSWORD_PROMPT_PATTERN: Regex = Regex::new(r"(?i)assword\s*:?\s*$").unwrap();
    static ref LOGIN_FAILED_PATTERN: Regex =
        Regex::new(r"(?i)login invalid|authentication failed|access denied").unwrap();
}

// Poll interval at the TCP layer; command deadlines are enforced above it
const POLL_READ_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials for device sessions. `enable_password` is only used when the
/// device lands in user mode.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub enable_password: Option<String>,
}

/// Connection-level knobs, derived from `[discovery]` configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub ssh_port: u16,
    pub telnet_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            ssh_port: 22,
            telnet_port: 23,
        }
    }
}

/// An authenticated CLI session to one device.
///
/// Transport policy: secure shell first; on refusal or authentication
/// failure, one retry over plaintext telnet. Both failing is a connection
/// failure.
pub struct DeviceSession {
    channel: CliChannel,
    session: Option<Session>,
    pub transport: Transport,
    base_prompt: String,
    config: SessionConfig,
}

impl DeviceSession {
    pub fn open(ip: &str, creds: &Credentials, config: &SessionConfig) -> Result<Self, WalkError> {
        match Self::open_ssh(ip, creds, config) {
            Ok(session) => Ok(session),
            Err(e) if e.warrants_transport_fallback() => {
                info!(ip, error = %e, "Secure shell rejected, retrying over telnet");
                Self::open_telnet(ip, creds, config)
            }
            Err(e) => Err(e),
        }
    }

    fn open_ssh(ip: &str, creds: &Credentials, config: &SessionConfig) -> Result<Self, WalkError> {
        let addr = format!("{}:{}", ip, config.ssh_port);
        debug!(target: "DeviceSession::open_ssh", "Establishing TCP connection to {}", addr);

        let tcp = connect_tcp(&addr, config.connect_timeout)?;
        tcp.set_read_timeout(Some(POLL_READ_TIMEOUT))
            .map_err(WalkError::IoError)?;
        tcp.set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(WalkError::IoError)?;

        let mut session = Session::new().map_err(WalkError::SshError)?;
        session.set_tcp_stream(tcp);

        debug!(target: "DeviceSession::open_ssh", "Starting SSH handshake");
        if let Err(e) = session.handshake() {
            info!("SSH handshake failed for {}: {}", addr, e);
            return Err(WalkError::SshHandshakeFailed { source: e });
        }

        debug!(target: "DeviceSession::open_ssh", "Authenticating as {}", creds.username);
        let auth = match creds.password.as_deref() {
            Some(password) => session.userauth_password(&creds.username, password),
            None => session.userauth_agent(&creds.username),
        };
        if let Err(e) = auth {
            info!("Authentication failed for {}: {}", addr, e);
            return Err(WalkError::auth_failed(&creds.username));
        }

        let mut channel = session
            .channel_session()
            .map_err(|e| WalkError::ChannelError(format!("Failed to create channel session: {}", e)))?;
        channel
            .request_pty("xterm", None, None)
            .map_err(WalkError::SshError)?;
        channel.shell().map_err(WalkError::SshError)?;

        session.set_keepalive(true, 60);
        session.set_blocking(true);

        debug!(target: "DeviceSession::open_ssh", "Connection established successfully");
        Ok(Self {
            channel: CliChannel::new(Some(TransportStream::Ssh(channel))),
            session: Some(session),
            transport: Transport::Ssh,
            base_prompt: String::new(),
            config: config.clone(),
        })
    }

    fn open_telnet(
        ip: &str,
        creds: &Credentials,
        config: &SessionConfig,
    ) -> Result<Self, WalkError> {
        let addr = format!("{}:{}", ip, config.telnet_port);
        debug!(target: "DeviceSession::open_telnet", "Establishing TCP connection to {}", addr);

        let tcp = connect_tcp(&addr, config.connect_timeout)?;
        tcp.set_read_timeout(Some(POLL_READ_TIMEOUT))
            .map_err(WalkError::IoError)?;
        tcp.set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(WalkError::IoError)?;

        let mut session = Self {
            channel: CliChannel::new(Some(TransportStream::Telnet(tcp))),
            session: None,
            transport: Transport::Telnet,
            base_prompt: String::new(),
            config: config.clone(),
        };
        session.telnet_login(creds)?;
        Ok(session)
    }

    fn telnet_login(&mut self, creds: &Credentials) -> Result<(), WalkError> {
        let timeout = self.config.connect_timeout;

        self.channel
            .read_until_pattern(&LOGIN_PROMPT_PATTERN, timeout)
            .map_err(|_| WalkError::PromptError("No telnet login prompt".to_string()))?;
        self.channel
            .write_channel(&format!("{}\n", creds.username))?;

        self.channel
            .read_until_pattern(&PASSWORD_PROMPT_PATTERN, timeout)
            .map_err(|_| WalkError::PromptError("No telnet password prompt".to_string()))?;
        self.channel
            .write_channel(&format!("{}\n", creds.password.as_deref().unwrap_or("")))?;

        // A prompt means we are in; a second login banner means we are not
        lazy_static! {
            static ref LOGIN_OUTCOME: Regex =
                Regex::new(r"(?mi)[>#]\s*$|sername\s*:\s*$|login invalid|authentication failed|access denied")
                    .unwrap();
        }
        let output = self
            .channel
            .read_until_pattern(&LOGIN_OUTCOME, timeout)
            .map_err(|_| WalkError::auth_failed(&creds.username))?;
        if LOGIN_FAILED_PATTERN.is_match(&output) || LOGIN_PROMPT_PATTERN.is_match(&output) {
            return Err(WalkError::auth_failed(&creds.username));
        }

        debug!(target: "DeviceSession::telnet_login", "Telnet login complete");
        Ok(())
    }

    /// Locate the device prompt and remember it for command framing.
    /// Returns the bare prompt with the mode terminator stripped.
    pub fn prepare(&mut self) -> Result<String, WalkError> {
        self.channel.write_channel("\n")?;
        let output = self
            .channel
            .read_until_pattern(&GENERIC_PROMPT_PATTERN, Duration::from_secs(10))?;

        let last_line = output
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        if last_line.is_empty() {
            return Err(WalkError::PromptError("Empty prompt line".to_string()));
        }

        let bare = last_line.trim_end_matches(['#', '>']).to_string();
        self.channel.set_base_prompt(&bare);
        self.base_prompt = bare.clone();
        debug!(target: "DeviceSession::prepare", "Base prompt set to {}", bare);
        Ok(bare)
    }

    /// The prompt without its mode terminator, used as the platform hint.
    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    fn prompt_pattern(&self) -> &Regex {
        self.channel
            .prompt_regex()
            .unwrap_or(&*GENERIC_PROMPT_PATTERN)
    }

    /// Enter privileged mode. Failures leave the session in user mode.
    pub fn enable(&mut self, secret: &str) -> Result<(), WalkError> {
        debug!(target: "DeviceSession::enable", "Entering enable mode");
        self.channel.write_channel("enable\n")?;

        lazy_static! {
            static ref ENABLE_RESPONSE: Regex = Regex::new(r"(?mi)assword|#\s*$").unwrap();
        }
        let output = self
            .channel
            .read_until_pattern(&ENABLE_RESPONSE, Duration::from_secs(10))?;

        if PASSWORD_PROMPT_PATTERN.is_match(output.trim_end()) {
            self.channel.write_channel(&format!("{}\n", secret))?;
            lazy_static! {
                static ref ENABLE_PROMPT: Regex = Regex::new(r"(?m)#\s*$").unwrap();
            }
            self.channel
                .read_until_pattern(&ENABLE_PROMPT, Duration::from_secs(10))?;
        }

        debug!(target: "DeviceSession::enable", "Privileged mode entered");
        Ok(())
    }

    /// Run one command and return its output with the echo and trailing
    /// prompt stripped. The deadline is the caller's or the per-command
    /// default.
    pub fn run(&mut self, command: &str, timeout: Option<Duration>) -> Result<String, WalkError> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        debug!(target: "DeviceSession::run", "Running command: {}", command);

        self.channel.write_channel(&format!("{}\n", command))?;

        let output = match self.channel.read_until_pattern(self.prompt_pattern(), timeout) {
            Ok(output) => output,
            Err(WalkError::PromptError(_)) => {
                warn!(command, "Command timed out");
                return Err(WalkError::command_timeout(command));
            }
            Err(e) => return Err(e),
        };

        Ok(self.scrub_output(&output, command))
    }

    fn scrub_output(&self, output: &str, command: &str) -> String {
        let normalized = CRLF_PATTERN.replace_all(output, "\n").to_string();
        let mut lines: Vec<&str> = normalized.lines().collect();

        // Drop the echoed command
        if let Some(first) = lines.first() {
            if first.trim() == command.trim() {
                lines.remove(0);
            }
        }
        // Drop the trailing prompt line
        if let Some(last) = lines.last() {
            if GENERIC_PROMPT_PATTERN.is_match(last) {
                lines.pop();
            }
        }

        lines.join("\n")
    }

    /// Close the channel and drop the underlying session. Safe to call on
    /// every exit path.
    pub fn close(&mut self) {
        let _ = self.channel.write_channel("exit\n");
        if let Err(e) = self.channel.close() {
            debug!(target: "DeviceSession::close", "Error closing channel: {}", e);
        }
        if let Some(session) = self.session.take() {
            drop(session);
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect_tcp(addr: &str, timeout: Duration) -> Result<TcpStream, WalkError> {
    let mut last_err: Option<std::io::Error> = None;
    let resolved = addr
        .to_socket_addrs()
        .map_err(|e| WalkError::connection_failed(addr, e))?;
    for sock_addr in resolved {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    let err = last_err
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "no addresses"));
    if err.kind() == std::io::ErrorKind::ConnectionRefused {
        Err(WalkError::connect_refused(addr))
    } else {
        Err(WalkError::connection_failed(addr, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.ssh_port, 22);
        assert_eq!(config.telnet_port, 23);
    }

    #[test]
    fn test_login_prompt_patterns() {
        assert!(LOGIN_PROMPT_PATTERN.is_match("User Access Verification\n\nUsername: "));
        assert!(LOGIN_PROMPT_PATTERN.is_match("login: "));
        assert!(PASSWORD_PROMPT_PATTERN.is_match("Password: "));
        assert!(LOGIN_FAILED_PATTERN.is_match("% Login invalid"));
    }

    #[test]
    fn test_scrub_output_strips_echo_and_prompt() {
        let session = DeviceSession {
            channel: CliChannel::new(None),
            session: None,
            transport: Transport::Ssh,
            base_prompt: "SW01".to_string(),
            config: SessionConfig::default(),
        };
        let raw = "show version\r\nCisco IOS Software, Version 15.2\r\nSW01#";
        let scrubbed = session.scrub_output(raw, "show version");
        assert_eq!(scrubbed, "Cisco IOS Software, Version 15.2");
    }

    #[test]
    fn test_connect_refused_maps_to_fallback_eligible_error() {
        // Port 1 on localhost is almost certainly closed
        let result = connect_tcp("127.0.0.1:1", Duration::from_secs(2));
        if let Err(e) = result {
            assert!(e.warrants_transport_fallback() || matches!(e, WalkError::ConnectionFailed { .. }));
        }
    }
}
