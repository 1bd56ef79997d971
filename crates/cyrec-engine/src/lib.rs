pub mod browser;
pub mod capture;
pub mod channel;
pub mod config;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod store;

pub use cyrec_common::formatter;
pub use cyrec_common::protocol;
pub use cyrec_common::selector;
pub use cyrec_common::translator;
