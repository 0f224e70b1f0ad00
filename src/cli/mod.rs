//! CLI command handling

pub mod ask;
pub mod history;
pub mod mode;
pub mod output;
pub mod send;
pub mod setup;

pub use ask::*;
pub use history::*;
pub use mode::*;
pub use output::*;
pub use send::*;
pub use setup::*;
