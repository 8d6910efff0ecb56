pub mod analyzer;
pub mod questions;
pub mod session;

pub use analyzer::*;
pub use questions::*;
pub use session::*;
