// core.rs splits ledger responsibilities into submodules for easier maintenance.
pub mod chain;
pub mod results;
pub mod state;
pub mod validation;

pub use chain::*;
pub use results::*;
pub use state::*;
pub use validation::*;
