pub mod aggregate;
pub mod history;
pub mod keys;
pub mod logging;
pub mod recorder;
pub mod session;
pub mod state;
pub mod store;
pub mod summary;
pub mod surface;
