use crate::error::WalkError;
use regex::Regex;
use ssh2::Channel as SSH2Channel;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tracing::debug;

// Optimal buffer size based on typical network device response sizes
const DEFAULT_BUFFER_SIZE: usize = 16384; // 16KB

// Telnet IAC protocol bytes
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// The raw byte stream under a CLI session, secure shell or plaintext.
pub enum TransportStream {
    Ssh(SSH2Channel),
    Telnet(TcpStream),
}

/// A character-mode channel to a device CLI. Wraps either an SSH PTY channel
/// or a telnet TCP stream behind one read/write surface; telnet option
/// negotiation is refused inline and stripped from the data.
pub struct CliChannel {
    remote_conn: RefCell<Option<TransportStream>>,
    base_prompt: Option<String>,
    prompt_regex: Option<Regex>,
    read_buffer: RefCell<Vec<u8>>,
}

impl CliChannel {
    pub fn new(conn: Option<TransportStream>) -> Self {
        Self {
            remote_conn: RefCell::new(conn),
            base_prompt: None,
            prompt_regex: None,
            read_buffer: RefCell::new(vec![0u8; DEFAULT_BUFFER_SIZE]),
        }
    }

    pub fn set_base_prompt(&mut self, prompt: &str) {
        debug!(target: "CliChannel::set_base_prompt", "Setting base prompt to: {}", prompt);
        self.base_prompt = Some(prompt.to_string());

        // Match the prompt followed by > or # at end of output
        let prompt_pattern = format!(r"{}\S*[>#]\s*$", regex::escape(prompt));
        match Regex::new(&prompt_pattern) {
            Ok(re) => {
                self.prompt_regex = Some(re);
            }
            Err(e) => {
                debug!(target: "CliChannel::set_base_prompt", "Failed to create prompt regex: {}", e);
            }
        }
    }

    pub fn get_base_prompt(&self) -> Option<&str> {
        self.base_prompt.as_deref()
    }

    pub fn prompt_regex(&self) -> Option<&Regex> {
        self.prompt_regex.as_ref()
    }

    pub fn is_none(&self) -> bool {
        self.remote_conn.borrow().is_none()
    }

    pub fn write_channel(&self, out_data: &str) -> Result<(), WalkError> {
        debug!(target: "CliChannel::write_channel", "Writing to channel: {:?}", out_data);

        let mut remote_conn = self.remote_conn.borrow_mut();
        let conn = remote_conn.as_mut().ok_or_else(|| {
            WalkError::WriteError(
                "Attempt to write data, but there is no active channel.".to_string(),
            )
        })?;

        let bytes = out_data.as_bytes();
        match conn {
            TransportStream::Ssh(channel) => {
                channel.write_all(bytes).map_err(|e| {
                    WalkError::WriteError(format!("Failed to write to channel: {}", e))
                })?;
                channel.flush().map_err(|e| {
                    WalkError::WriteError(format!("Failed to flush channel: {}", e))
                })?;
            }
            TransportStream::Telnet(stream) => {
                stream.write_all(bytes).map_err(|e| {
                    WalkError::WriteError(format!("Failed to write to stream: {}", e))
                })?;
                stream.flush().map_err(|e| {
                    WalkError::WriteError(format!("Failed to flush stream: {}", e))
                })?;
            }
        }

        Ok(())
    }

    /// Read whatever is currently available without blocking past the
    /// transport's read timeout. Returns an empty string when no data is
    /// pending.
    pub fn read_available(&self) -> Result<String, WalkError> {
        let mut remote_conn = self.remote_conn.borrow_mut();
        let conn = remote_conn.as_mut().ok_or_else(|| {
            WalkError::ReadError("Attempt to read, but there is no active channel.".to_string())
        })?;

        let mut buffer = self.read_buffer.borrow_mut();

        let read = match conn {
            TransportStream::Ssh(channel) => {
                if channel.eof() {
                    return Err(WalkError::ReadError(
                        "Channel stream closed by remote device.".to_string(),
                    ));
                }
                channel.read(&mut buffer)
            }
            TransportStream::Telnet(stream) => stream.read(&mut buffer),
        };

        match read {
            Ok(0) => Err(WalkError::ReadError(
                "Channel stream closed by remote device.".to_string(),
            )),
            Ok(n) => {
                debug!(target: "CliChannel::read_available", "Read {} bytes from channel", n);
                let chunk = match conn {
                    TransportStream::Ssh(_) => buffer[..n].to_vec(),
                    TransportStream::Telnet(stream) => {
                        let (data, responses) = negotiate_telnet(&buffer[..n]);
                        if !responses.is_empty() {
                            let _ = stream.write_all(&responses);
                        }
                        data
                    }
                };
                Ok(String::from_utf8_lossy(&chunk).to_string())
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(String::new())
            }
            Err(e) => Err(WalkError::IoError(e)),
        }
    }

    /// Accumulate output until `pattern` matches or `timeout` elapses.
    pub fn read_until_pattern(
        &self,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<String, WalkError> {
        let mut output = String::new();
        let start = Instant::now();

        while start.elapsed() < timeout {
            let chunk = self.read_available()?;
            if chunk.is_empty() {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            output.push_str(&chunk);
            if pattern.is_match(&output) {
                debug!(target: "CliChannel::read_until_pattern", "Found pattern, exiting read loop");
                return Ok(output);
            }
        }

        debug!(target: "CliChannel::read_until_pattern", "Timeout reached waiting for pattern");
        Err(WalkError::PromptError(format!(
            "Timed out waiting for pattern: {}",
            pattern.as_str()
        )))
    }

    /// Close the channel, sending EOF on SSH transports.
    pub fn close(&self) -> Result<(), WalkError> {
        debug!(target: "CliChannel::close", "Closing channel");

        if let Some(conn) = self.remote_conn.borrow_mut().take() {
            match conn {
                TransportStream::Ssh(mut channel) => {
                    if let Err(e) = channel.send_eof() {
                        debug!(target: "CliChannel::close", "Error sending EOF: {}", e);
                    }
                    if let Err(e) = channel.close() {
                        debug!(target: "CliChannel::close", "Error closing channel: {}", e);
                        return Err(WalkError::ChannelError(format!(
                            "Failed to close channel: {}",
                            e
                        )));
                    }
                    if let Err(e) = channel.wait_close() {
                        debug!(target: "CliChannel::close", "Error waiting for channel to close: {}", e);
                    }
                }
                TransportStream::Telnet(stream) => {
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                }
            }
        } else {
            debug!(target: "CliChannel::close", "No active channel to close");
        }

        Ok(())
    }
}

/// Strip telnet IAC sequences from a chunk, producing the cleaned data and
/// the refusal responses to send back. Every WILL is answered DONT and every
/// DO is answered WONT; subnegotiation blocks are discarded.
fn negotiate_telnet(raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut data = Vec::with_capacity(raw.len());
    let mut responses = Vec::new();
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != IAC {
            data.push(raw[i]);
            i += 1;
            continue;
        }
        match raw.get(i + 1) {
            Some(&IAC) => {
                // Escaped 0xff data byte
                data.push(IAC);
                i += 2;
            }
            Some(&cmd @ WILL..=DONT) => {
                if let Some(&option) = raw.get(i + 2) {
                    match cmd {
                        WILL => responses.extend_from_slice(&[IAC, DONT, option]),
                        DO => responses.extend_from_slice(&[IAC, WONT, option]),
                        _ => {}
                    }
                }
                i += 3;
            }
            Some(&SB) => {
                // Skip subnegotiation through IAC SE
                let mut j = i + 2;
                while j + 1 < raw.len() && !(raw[j] == IAC && raw[j + 1] == SE) {
                    j += 1;
                }
                i = j + 2;
            }
            Some(_) => i += 2,
            None => i += 1,
        }
    }

    (data, responses)
}
