mod locations;
mod profile;
mod task;

pub use locations::Locations;
pub use profile::{FileIndex, FolderIndex, Index, Permission, UserPermission, UserProfile};
pub use task::{UserProfileTask, UserProfileTaskKind};
