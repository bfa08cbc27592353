mod hooks;
mod projects;
mod repository;
mod transport;

pub use hooks::HookSettings;
pub use projects::ProjectScope;
pub use transport::{ClientOptions, GitLabClient};
