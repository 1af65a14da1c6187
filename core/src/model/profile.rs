use std::{collections::BTreeMap, fmt};

use hv_crypto::UserKeyPair;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
	Read,
	Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
	pub user_id: String,
	pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
	pub content_hash: [u8; 32],
	pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderIndex {
	pub children: BTreeMap<String, Index>,
	/// Who else can see this folder, empty for private folders.
	pub permissions: Vec<UserPermission>,
	/// Set on folders another user shared with us.
	pub shared_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Index {
	File(FileIndex),
	Folder(FolderIndex),
}

impl FolderIndex {
	#[must_use]
	pub fn is_shared(&self) -> bool {
		!self.permissions.is_empty() || self.shared_by.is_some()
	}
}

/// Everything a user owns: their key pair and the index of their files. Stored encrypted in
/// the DHT, exactly one canonical version at a time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	pub user_id: String,
	signing_secret: [u8; 32],
	encryption_secret: [u8; 32],
	pub root: FolderIndex,
}

impl fmt::Debug for UserProfile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserProfile")
			.field("user_id", &self.user_id)
			.field("root", &self.root)
			.finish_non_exhaustive()
	}
}

impl UserProfile {
	#[must_use]
	pub fn new(user_id: impl Into<String>, key_pair: &UserKeyPair) -> Self {
		let (signing_secret, encryption_secret) = key_pair.to_secret_bytes();

		Self {
			user_id: user_id.into(),
			signing_secret,
			encryption_secret,
			root: FolderIndex::default(),
		}
	}

	#[must_use]
	pub fn key_pair(&self) -> UserKeyPair {
		UserKeyPair::from_secret_bytes(self.signing_secret, self.encryption_secret)
	}

	#[must_use]
	pub fn folder(&self, path: &str) -> Option<&FolderIndex> {
		segments(path).try_fold(&self.root, |folder, name| match folder.children.get(name) {
			Some(Index::Folder(child)) => Some(child),
			_ => None,
		})
	}

	pub fn folder_mut(&mut self, path: &str) -> Option<&mut FolderIndex> {
		segments(path).try_fold(&mut self.root, |folder, name| {
			match folder.children.get_mut(name) {
				Some(Index::Folder(child)) => Some(child),
				_ => None,
			}
		})
	}

	/// Creates a folder, its parent must exist. Existing folders are left untouched.
	pub fn add_folder(&mut self, path: &str) -> Result<()> {
		let (parent, name) = split_parent(path);

		self.folder_mut(parent)
			.ok_or_else(|| Error::FolderNotFound(parent.to_string()))?
			.children
			.entry(name.to_string())
			.or_insert_with(|| Index::Folder(FolderIndex::default()));

		Ok(())
	}

	pub fn add_file(&mut self, path: &str, content_hash: [u8; 32], size: u64) -> Result<()> {
		let (parent, name) = split_parent(path);

		self.folder_mut(parent)
			.ok_or_else(|| Error::FolderNotFound(parent.to_string()))?
			.children
			.insert(name.to_string(), Index::File(FileIndex { content_hash, size }));

		Ok(())
	}

	/// Grants `friend` access to the folder, returning what they had before.
	pub fn share_folder(
		&mut self,
		path: &str,
		friend: &str,
		permission: Permission,
	) -> Result<Option<Permission>> {
		let folder = self
			.folder_mut(path)
			.ok_or_else(|| Error::FolderNotFound(path.to_string()))?;

		let previous = folder
			.permissions
			.iter()
			.find(|existing| existing.user_id == friend)
			.map(|existing| existing.permission);

		folder.permissions.retain(|existing| existing.user_id != friend);
		folder.permissions.push(UserPermission {
			user_id: friend.to_string(),
			permission,
		});

		Ok(previous)
	}

	/// Puts back what [`UserProfile::share_folder`] returned as the previous permission.
	pub fn restore_permission(
		&mut self,
		path: &str,
		friend: &str,
		previous: Option<Permission>,
	) -> Result<()> {
		match previous {
			Some(permission) => self.share_folder(path, friend, permission).map(|_| ()),
			None => self.unshare_folder(path, friend),
		}
	}

	/// Undoes [`UserProfile::share_folder`].
	pub fn unshare_folder(&mut self, path: &str, friend: &str) -> Result<()> {
		self.folder_mut(path)
			.ok_or_else(|| Error::FolderNotFound(path.to_string()))?
			.permissions
			.retain(|existing| existing.user_id != friend);

		Ok(())
	}

	/// Mounts a folder shared by another user at the root and returns the name it got.
	///
	/// A name already taken by another folder gets the sharer appended, then a counter.
	/// Accepting the same share twice is a no-op, which makes replaying a queued share task
	/// harmless.
	pub fn accept_shared_folder(&mut self, name: &str, sharer: &str, permission: Permission) -> String {
		let mut candidate = name.to_string();
		let mut attempt = 1_usize;

		loop {
			match self.root.children.get(&candidate) {
				None => break,
				Some(Index::Folder(existing)) if existing.shared_by.as_deref() == Some(sharer) => {
					return candidate;
				}
				Some(_) => {
					attempt += 1;
					candidate = if attempt == 2 {
						format!("{name} ({sharer})")
					} else {
						format!("{name} ({sharer}) {attempt}")
					};
				}
			}
		}

		self.root.children.insert(
			candidate.clone(),
			Index::Folder(FolderIndex {
				children: BTreeMap::new(),
				permissions: vec![UserPermission {
					user_id: sharer.to_string(),
					permission,
				}],
				shared_by: Some(sharer.to_string()),
			}),
		);

		candidate
	}
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|segment| !segment.is_empty())
}

fn split_parent(path: &str) -> (&str, &str) {
	let path = path.trim_matches('/');
	path.rsplit_once('/').unwrap_or(("", path))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_and_shares_a_tree() {
		let mut profile = UserProfile::new("alice", &UserKeyPair::generate());

		profile.add_folder("photos").unwrap();
		profile.add_folder("photos/2024").unwrap();
		profile.add_file("photos/2024/beach.jpg", [7; 32], 1024).unwrap();

		assert!(matches!(
			profile.add_file("music/song.mp3", [0; 32], 1),
			Err(Error::FolderNotFound(parent)) if parent == "music"
		));

		let year = profile.folder("/photos/2024/").unwrap();
		assert!(matches!(
			year.children.get("beach.jpg"),
			Some(Index::File(FileIndex { size: 1024, .. }))
		));

		profile.share_folder("photos", "bob", Permission::Read).unwrap();
		profile.share_folder("photos", "bob", Permission::Write).unwrap();

		let photos = profile.folder("photos").unwrap();
		assert!(photos.is_shared());
		assert_eq!(photos.permissions.len(), 1);
		assert_eq!(photos.permissions[0].permission, Permission::Write);

		profile.unshare_folder("photos", "bob").unwrap();
		assert!(!profile.folder("photos").unwrap().is_shared());
	}

	#[test]
	fn accepting_a_share_twice_is_harmless() {
		let mut profile = UserProfile::new("bob", &UserKeyPair::generate());

		profile.accept_shared_folder("photos", "alice", Permission::Read);
		let once = profile.clone();
		profile.accept_shared_folder("photos", "alice", Permission::Read);

		assert_eq!(profile, once);
		assert_eq!(
			profile.folder("photos").unwrap().shared_by.as_deref(),
			Some("alice")
		);
	}

	#[test]
	fn resharing_remembers_the_previous_permission() {
		let mut profile = UserProfile::new("alice", &UserKeyPair::generate());
		profile.add_folder("photos").unwrap();

		assert_eq!(
			profile.share_folder("photos", "bob", Permission::Read).unwrap(),
			None
		);
		let previous = profile
			.share_folder("photos", "bob", Permission::Write)
			.unwrap();
		assert_eq!(previous, Some(Permission::Read));

		profile.restore_permission("photos", "bob", previous).unwrap();

		let photos = profile.folder("photos").unwrap();
		assert_eq!(
			photos.permissions,
			vec![UserPermission {
				user_id: "bob".to_string(),
				permission: Permission::Read,
			}]
		);
	}

	#[test]
	fn shared_folder_never_replaces_an_own_one() {
		let mut profile = UserProfile::new("bob", &UserKeyPair::generate());
		profile.add_folder("photos").unwrap();
		profile.add_file("photos/cat.jpg", [1; 32], 10).unwrap();

		let mounted = profile.accept_shared_folder("photos", "alice", Permission::Read);
		assert_eq!(mounted, "photos (alice)");
		assert_eq!(
			profile.accept_shared_folder("photos", "alice", Permission::Read),
			mounted
		);

		let own = profile.folder("photos").unwrap();
		assert_eq!(own.shared_by, None);
		assert!(own.children.contains_key("cat.jpg"));
		assert_eq!(
			profile.folder(&mounted).unwrap().shared_by.as_deref(),
			Some("alice")
		);

		profile.add_folder("docs").unwrap();
		profile.add_folder("docs (alice)").unwrap();
		assert_eq!(
			profile.accept_shared_folder("docs", "alice", Permission::Write),
			"docs (alice) 3"
		);
	}

	#[test]
	fn debug_hides_the_keys() {
		let key_pair = UserKeyPair::generate();
		let profile = UserProfile::new("alice", &key_pair);

		assert_eq!(profile.key_pair().public_keys(), key_pair.public_keys());
		assert!(!format!("{profile:?}").contains("secret"));
	}
}
