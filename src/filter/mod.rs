mod catalog;
mod pipeline;
pub mod predicates;
mod state;

pub use catalog::*;
pub use pipeline::*;
pub use predicates::*;
pub use state::*;
