//! Token Management
//!
//! Token lifecycle: persistence, endpoint exchange, the lifecycle manager
//! and its periodic driver.

pub mod endpoint;
pub mod manager;
pub mod poller;
pub mod storage;

// Token Storage
pub use storage::{
    create_file_token_store, create_mock_token_store, FileTokenStore, MockTokenStore, TokenStore,
};

// Token Endpoint
pub use endpoint::{
    parse_token_response, DefaultTokenEndpointClient, ExchangeCall, MockTokenEndpointClient,
    TokenEndpointClient,
};

// Token Manager
pub use manager::{
    create_mock_token_manager, create_token_manager, DefaultTokenLifecycleManager, LastFailure,
    LifecycleState, MockTokenManager, TokenLifecycleManager, TokenManager, REFRESH_BUFFER_SECS,
};

// Poller
pub use poller::{PollerStats, RefreshPoller, DEFAULT_POLL_INTERVAL};
