mod catalog;
mod client;
mod types;

pub use catalog::{ListingContext, ProjectCatalog};
pub use client::{ClientOptions, GitLabClient, HookSettings};
pub use types::{HookEvents, Project};
