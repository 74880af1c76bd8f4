mod classify;
mod config;
mod environment;
mod error;
mod flatten;
mod layout;
mod moves;
mod node;
mod provider;
mod rename;
mod selection;
mod session;

pub use crate::classify::*;
pub use crate::config::*;
pub use crate::environment::*;
pub use crate::error::*;
pub use crate::flatten::*;
pub use crate::layout::*;
pub use crate::moves::*;
pub use crate::node::*;
pub use crate::provider::*;
pub use crate::rename::*;
pub use crate::selection::*;
pub use crate::session::*;
