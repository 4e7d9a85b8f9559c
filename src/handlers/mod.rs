pub mod calls;
pub mod config;
pub mod webhooks;

pub use self::calls::*;
pub use self::config::*;
pub use self::webhooks::*;
