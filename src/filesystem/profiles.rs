//! Profile registry
//!
//! Maps profile names to independent file system instances, each with its
//! own sandbox root. Requests that name no profile get the default one.

use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{FsError, RequestError};
use crate::filesystem::facade::FileSystem;

pub struct ProfileRegistry {
    default_profile: String,
    filesystems: HashMap<String, Arc<FileSystem>>,
}

impl ProfileRegistry {
    pub fn new(default_profile: impl Into<String>) -> Self {
        Self {
            default_profile: default_profile.into().to_lowercase(),
            filesystems: HashMap::new(),
        }
    }

    /// Builds one local file system per configured profile, creating
    /// missing roots on the way.
    pub fn from_config(config: &AppConfig) -> Result<Self, FsError> {
        let settings = config.filesystem_settings();
        let mut registry = Self::new(&config.default_profile);

        for (name, profile) in &config.profiles {
            std::fs::create_dir_all(&profile.root).map_err(|e| FsError::from_io(e, &profile.root))?;
            let filesystem = FileSystem::local(name.as_str(), &profile.root, &settings)?;
            info!("Profile '{}' serving {}", name, profile.root);
            registry.register(filesystem);
        }

        Ok(registry)
    }

    /// Adds or replaces the file system for its profile
    pub fn register(&mut self, filesystem: FileSystem) {
        let name = filesystem.profile().to_lowercase();
        self.filesystems.insert(name, Arc::new(filesystem));
    }

    pub fn get(&self, profile: Option<&str>) -> Result<Arc<FileSystem>, RequestError> {
        let name = match profile.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_lowercase(),
            _ => self.default_profile.clone(),
        };
        self.filesystems
            .get(&name)
            .cloned()
            .ok_or(RequestError::UnknownProfile(name))
    }

    pub fn default_profile(&self) -> &str {
        &self.default_profile
    }

    pub fn profiles(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filesystems.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::facade::FileSystemSettings;
    use tempfile::TempDir;

    fn registry(a: &TempDir, b: &TempDir) -> ProfileRegistry {
        let settings = FileSystemSettings::default();
        let mut registry = ProfileRegistry::new("default");
        registry.register(FileSystem::local("default", a.path(), &settings).unwrap());
        registry.register(FileSystem::local("Archive", b.path(), &settings).unwrap());
        registry
    }

    #[test]
    fn missing_profile_uses_default() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let registry = registry(&a, &b);
        assert_eq!(registry.get(None).unwrap().profile(), "default");
        assert_eq!(registry.get(Some("  ")).unwrap().profile(), "default");
    }

    #[test]
    fn profile_names_ignore_case() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let registry = registry(&a, &b);
        assert_eq!(registry.get(Some("ARCHIVE")).unwrap().profile(), "Archive");
        assert_eq!(registry.profiles(), vec!["archive", "default"]);
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let registry = registry(&a, &b);
        assert!(matches!(
            registry.get(Some("nope")),
            Err(RequestError::UnknownProfile(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn profiles_are_isolated() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let registry = registry(&a, &b);
        let default = registry.get(None).unwrap();
        assert!(default.create_directory("/", "only-here").await.is_success());

        let archive = registry.get(Some("archive")).unwrap();
        let tree = archive.list_tree().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(a.path().join("only-here").is_dir());
        assert!(!b.path().join("only-here").exists());
    }
}
