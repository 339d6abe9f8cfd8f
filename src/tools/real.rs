//! Transport-backed tool client.
//!
//! Each call spawns the configured bridge command, writes one JSON request
//! to its stdin, and reads one JSON response from its stdout. Transient
//! failures retry with exponential backoff before surfacing as a run error.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_DELAY_SECS: u64 = 2;
const BACKOFF_FACTOR: u64 = 2;
const MAX_DELAY_SECS: u64 = 32;

#[derive(Debug)]
pub struct RealToolClient {
    bridge: Vec<String>,
}

impl RealToolClient {
    pub fn new(bridge: Vec<String>) -> Self {
        Self { bridge }
    }

    pub fn call(&mut self, tool: &str, input: &Value) -> Result<Value> {
        if self.bridge.is_empty() {
            return Err(anyhow!(
                "no tool bridge configured (tools.bridge); pass --dry-run for the stub client"
            ));
        }
        let request = json!({ "tool": tool, "input": input });
        let mut delay = INITIAL_DELAY_SECS;
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.invoke_bridge(&request) {
                Ok(output) => return Ok(output),
                Err(err) => {
                    last_error = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        std::thread::sleep(Duration::from_secs(delay));
                        delay = (delay * BACKOFF_FACTOR).min(MAX_DELAY_SECS);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("tool call failed: {tool}")))
            .with_context(|| format!("call {tool} after {MAX_ATTEMPTS} attempts"))
    }

    fn invoke_bridge(&self, request: &Value) -> Result<Value> {
        let program = &self.bridge[0];
        let mut child = Command::new(program)
            .args(&self.bridge[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn tool bridge {program}"))?;

        let payload = serde_json::to_string(request).context("serialize tool request")?;
        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("tool bridge stdin unavailable"))?
            .write_all(payload.as_bytes())
            .context("write tool request")?;

        let output = child.wait_with_output().context("wait for tool bridge")?;
        if !output.status.success() {
            return Err(anyhow!(
                "tool bridge exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow!("tool bridge produced no output"))?;
        serde_json::from_str(line).context("parse tool bridge response")
    }
}
