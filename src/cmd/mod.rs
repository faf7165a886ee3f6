//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                       |
//! |-----------|----------------------------------------|
//! | `run`     | `Run`                                  |
//! | `session` | `List`, `Status`, `Reports`, `Reset`   |

pub mod run;
pub mod session;

pub use run::cmd_run;
pub use session::{cmd_list, cmd_reports, cmd_reset, cmd_status};
