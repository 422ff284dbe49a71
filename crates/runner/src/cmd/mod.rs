mod check;
mod exec;

pub use check::{CheckArgs, run_check};
pub use exec::{ExecArgs, run_exec};
