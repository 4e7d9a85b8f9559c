//! Outbound HTTP collaborators: the voice assistant API and the ngrok agent.

pub mod assistant;
pub mod public_url;

pub use assistant::AssistantClient;
pub use public_url::PublicUrlResolver;
