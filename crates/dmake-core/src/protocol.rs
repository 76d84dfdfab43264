//! git-annex external special remote protocol
//!
//! Line based. git-annex sends requests on our stdin and reads replies from
//! our stdout; while handling a request the remote may itself send requests
//! (`GETURLS`, `GETGITDIR`) and read their `VALUE` replies.

use crate::error::ComputeError;
use crate::remote::{AnnexHost, ComputeRemote};
use dmake_workspace::Backend;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Protocol version announced on startup
pub const PROTOCOL_VERSION: u32 = 1;

/// Request/reply channel to git-annex
#[derive(Debug)]
pub struct Channel<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Channel<R, W> {
    /// Channel over a reader and a writer
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Send one line
    ///
    /// # Errors
    /// Returns `ComputeError::Io` if the writer fails.
    pub fn send(&mut self, line: &str) -> Result<(), ComputeError> {
        tracing::trace!(line, "->");
        writeln!(self.output, "{line}")
            .and_then(|()| self.output.flush())
            .map_err(|e| ComputeError::io_error("<protocol output>", e))
    }

    /// Read one line without its terminator, `None` at end of input
    ///
    /// # Errors
    /// Returns `ComputeError::Io` if the reader fails.
    pub fn receive(&mut self) -> Result<Option<String>, ComputeError> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| ComputeError::io_error("<protocol input>", e))?;
        if read == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(line = %line, "<-");
        Ok(Some(line))
    }

    fn expect_value(&mut self) -> Result<String, ComputeError> {
        match self.receive()? {
            Some(line) => match line.strip_prefix("VALUE") {
                Some(rest) => Ok(rest.strip_prefix(' ').unwrap_or(rest).to_string()),
                None => Err(ComputeError::Config(format!("expected VALUE, got '{line}'"))),
            },
            None => Err(ComputeError::Config("git-annex closed the channel".to_string())),
        }
    }

    /// Give back the underlying writer
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> AnnexHost for Channel<R, W> {
    fn get_urls(&mut self, key: &str, prefix: &str) -> Result<Vec<String>, ComputeError> {
        self.send(&format!("GETURLS {key} {prefix}"))?;
        let mut urls = Vec::new();
        loop {
            let value = self.expect_value()?;
            if value.is_empty() {
                return Ok(urls);
            }
            urls.push(value);
        }
    }

    fn git_dir(&mut self) -> Result<PathBuf, ComputeError> {
        self.send("GETGITDIR")?;
        Ok(PathBuf::from(self.expect_value()?))
    }

    fn debug(&mut self, message: &str) {
        let message = message.replace('\n', " ");
        if let Err(err) = self.send(&format!("DEBUG {message}")) {
            tracing::warn!(error = %err, "failed to send debug message");
        }
    }
}

/// Serve `remote` over `channel` until git-annex closes it
///
/// # Errors
/// Returns an error only if the channel itself fails; request failures are
/// reported to git-annex.
pub fn serve<B, R, W>(
    remote: &ComputeRemote<B>,
    channel: &mut Channel<R, W>,
) -> Result<(), ComputeError>
where
    B: Backend,
    R: BufRead,
    W: Write,
{
    channel.send(&format!("VERSION {PROTOCOL_VERSION}"))?;

    while let Some(line) = channel.receive()? {
        let (command, args) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let reply = match command {
            "EXTENSIONS" => "EXTENSIONS".to_string(),
            "INITREMOTE" => "INITREMOTE-SUCCESS".to_string(),
            "PREPARE" => "PREPARE-SUCCESS".to_string(),
            "GETCOST" => format!("COST {}", remote.cost()),
            "GETAVAILABILITY" => "AVAILABILITY LOCAL".to_string(),
            "CLAIMURL" => outcome(remote.claim(args), "CLAIMURL-SUCCESS", "CLAIMURL-FAILURE"),
            "CHECKURL" => outcome(
                remote.checkurl(args),
                "CHECKURL-CONTENTS UNKNOWN",
                "CHECKURL-FAILURE",
            ),
            "CHECKPRESENT" => match remote.checkpresent(channel, args) {
                Ok(true) => format!("CHECKPRESENT-SUCCESS {args}"),
                Ok(false) => format!("CHECKPRESENT-FAILURE {args}"),
                Err(err) => format!("CHECKPRESENT-UNKNOWN {args} {}", one_line(&err)),
            },
            "TRANSFER" => transfer(remote, channel, args),
            "REMOVE" => format!("REMOVE-SUCCESS {args}"),
            "ERROR" => {
                tracing::error!(detail = args, "git-annex reported an error");
                return Ok(());
            }
            _ => "UNSUPPORTED-REQUEST".to_string(),
        };
        channel.send(&reply)?;
    }

    tracing::debug!("git-annex closed the channel");
    Ok(())
}

/// `TRANSFER <RETRIEVE|STORE> <key> <file>`, the file name may contain spaces
fn transfer<B, R, W>(remote: &ComputeRemote<B>, channel: &mut Channel<R, W>, args: &str) -> String
where
    B: Backend,
    R: BufRead,
    W: Write,
{
    let mut parts = args.splitn(3, ' ');
    let (Some(direction), Some(key), Some(file)) = (parts.next(), parts.next(), parts.next())
    else {
        return "UNSUPPORTED-REQUEST".to_string();
    };

    match direction {
        "RETRIEVE" => match remote.retrieve(channel, key, &absolute(Path::new(file))) {
            Ok(()) => format!("TRANSFER-SUCCESS RETRIEVE {key}"),
            Err(err) => {
                tracing::error!(key, error = %err, "retrieval failed");
                format!("TRANSFER-FAILURE RETRIEVE {key} {}", one_line(&err))
            }
        },
        "STORE" => format!("TRANSFER-SUCCESS STORE {key}"),
        _ => "UNSUPPORTED-REQUEST".to_string(),
    }
}

fn outcome(success: bool, yes: &str, no: &str) -> String {
    let reply = if success { yes } else { no };
    reply.to_string()
}

/// git-annex names transfer files relative to the working directory
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}

fn one_line(err: &ComputeError) -> String {
    err.to_string().replace('\n', " ")
}
