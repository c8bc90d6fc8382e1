mod paths;

pub use paths::{AppPaths, AppPathsError, install_root};
