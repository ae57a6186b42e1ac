//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod common;
pub mod farms;
pub mod orphans;
pub mod profiles;
pub mod visitors;

pub use admin::*;
pub use auth::*;
pub use common::*;
pub use farms::*;
pub use orphans::*;
pub use profiles::*;
pub use visitors::*;
