//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `create` | `Create`         |

pub mod create;
pub mod serve;

pub use create::cmd_create;
pub use serve::cmd_serve;
