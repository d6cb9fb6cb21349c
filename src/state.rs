use std::sync::Arc;

use crate::blocks::{BlockParser, FunctionCallBlockParser};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub block_parser: Arc<dyn BlockParser>,
}

impl AppState {
    /// Build state with the default `<function_call>` block parser.
    ///
    /// # Errors
    ///
    /// Returns an error when the vendor transport cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, BridgeError> {
        Self::with_block_parser(config, Arc::new(FunctionCallBlockParser))
    }

    /// Build state with a caller-supplied block parser.
    ///
    /// # Errors
    ///
    /// Returns an error when the vendor transport cannot be built.
    pub fn with_block_parser(
        config: AppConfig,
        block_parser: Arc<dyn BlockParser>,
    ) -> Result<Self, BridgeError> {
        let transport = HttpTransport::new(&config.server, &config.upstream)?;
        tracing::debug!(
            models = config.models.len(),
            chat_url = %transport.chat_url(),
            "application state initialized"
        );
        Ok(Self {
            config,
            transport,
            block_parser,
        })
    }
}
