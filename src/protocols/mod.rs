//! Bundled behavioral protocols.
//!
//! Each protocol implements [`crate::task::Task`] and is selected by name
//! through [`crate::task::task_for_name`].

pub mod follow_the_light;
pub mod habituation;
pub mod simple;

pub use follow_the_light::FollowTheLight;
pub use habituation::Habituation;
pub use simple::Simple;
