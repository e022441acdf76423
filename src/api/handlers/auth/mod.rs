//! Interactive login and session endpoints.

pub mod login;
pub mod session;
pub mod state;
pub mod types;
mod utils;

pub use state::{AuthState, LoginStates};
