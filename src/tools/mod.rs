//! Tool client abstraction: one `call(tool, input) -> output` operation over
//! a variant chosen at construction time. `--dry-run` always selects the
//! stub, regardless of configuration.

mod real;
mod stub;

pub use real::RealToolClient;
pub use stub::StubToolClient;

use anyhow::Result;
use serde_json::Value;

pub const SUGGEST_CHEMISTRIES: &str = "materials-data-mcp.suggest_chemistries";
pub const FETCH_PRIORS: &str = "materials-data-mcp.fetch_priors";
pub const BUILD_CONSTRAINTS: &str = "qlip-mcp.build_constraints";
pub const RUN_QLIP: &str = "qlip-mcp.run_qlip";
pub const BATCH_VALIDATE: &str = "csp-validators-mcp.batch_validate";

#[derive(Debug)]
pub enum ToolClient {
    Stub(StubToolClient),
    Real(RealToolClient),
}

impl ToolClient {
    pub fn stub(seed: u64) -> Self {
        ToolClient::Stub(StubToolClient::new(seed))
    }

    pub fn real(bridge: Vec<String>) -> Self {
        ToolClient::Real(RealToolClient::new(bridge))
    }

    pub fn call(&mut self, tool: &str, input: &Value) -> Result<Value> {
        match self {
            ToolClient::Stub(client) => client.call(tool, input),
            ToolClient::Real(client) => client.call(tool, input),
        }
    }
}
