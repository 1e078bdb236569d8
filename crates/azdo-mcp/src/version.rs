/// Package version plus the build the binary came from (git revision unless overridden).
pub const FULL: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("AZDO_MCP_BUILD"));
