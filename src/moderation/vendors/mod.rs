//! Built-in HTTP moderation vendors.

pub mod shumei;
pub mod zkrj;

pub use shumei::ShumeiChecker;
pub use zkrj::ZkrjChecker;
