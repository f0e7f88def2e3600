//! Resource kinds backed by the SonarQube Web API.

pub mod groups;

pub use groups::UserGroups;
