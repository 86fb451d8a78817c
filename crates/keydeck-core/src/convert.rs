// Conversions between persisted connection records and wire-level
// parameter types. keydeck-config stays serde-only, keydeck-api stays
// serde-free; this is the bridge.

use std::time::Duration;

use keydeck_api::ConnectionParams;
use keydeck_config::ConnectionConfig;

/// Derive the wire parameters for one persisted connection.
pub fn connection_params(config: &ConnectionConfig) -> ConnectionParams {
    ConnectionParams {
        host: config.host.clone(),
        port: config.port,
        auth: config.auth.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    }
}
