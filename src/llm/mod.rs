pub mod anthropic;
pub mod client;
pub mod local;
pub mod mock_provider;
pub mod normalizer;
pub mod openai_compat;
pub mod provider;
pub mod registry;
pub mod streaming;
pub mod transport;
pub mod types;


pub use client::{EffectiveConfig, ProviderClient, ProviderConfig, SharedProvider};
pub use mock_provider::MockProvider;
pub use provider::LLMProvider;
pub use registry::{ModelDescriptor, ProviderDescriptor, ProviderRegistry, WireProtocol};
pub use types::*;
