pub mod dispatch;
pub mod local;
pub mod ssh;
pub mod traits;

pub use dispatch::Dispatcher;
pub use local::LocalShell;
pub use ssh::SshSession;
pub use traits::{quote_argv, CommandOutput, Shell};
