//! # Components and Packages
//!
//! A component is a pluggable configuration module with its own versioned
//! source repository; a package is a reusable bundle of parameter classes,
//! versioned and fetched the same way. Both are materialized as worktrees
//! of shared dependency store entries under `dependencies/`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Parameter key for a component name: `-` becomes `_`.
///
/// Component names are DNS-style slugs, but YAML parameter keys with
/// dashes cannot be referenced from `${...}` expressions.
pub fn component_parameters_key(name: &str) -> String {
    name.replace('-', "_")
}

/// Working tree directory of a component.
pub fn component_dir(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join("dependencies").join(name)
}

/// Working tree directory of a package.
///
/// Packages live next to components but with a `pkg.` prefix so a package
/// and a component with the same name cannot collide.
pub fn package_dependency_dir(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join("dependencies").join(format!("pkg.{}", name))
}

/// Validate a component or package slug.
///
/// Slugs are lowercase alphanumeric segments separated by single dashes,
/// starting with a letter.
pub fn validate_slug(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && !name.contains("--")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "Invalid {} slug '{}': must be lowercase alphanumeric segments separated by '-'",
            kind, name
        )))
    }
}

/// One component instance registered with the compile context.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    work_dir: PathBuf,
    version: Option<String>,
    sub_path: String,
    dependency_key: Option<String>,
}

impl Component {
    pub fn new(name: &str, work_dir: &Path) -> Result<Self> {
        validate_slug("component", name)?;
        Ok(Self {
            name: name.to_string(),
            work_dir: work_dir.to_path_buf(),
            version: None,
            sub_path: String::new(),
            dependency_key: None,
        })
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_sub_path(mut self, sub_path: &str) -> Self {
        self.sub_path = sub_path.to_string();
        self
    }

    pub fn with_dependency_key(mut self, key: &str) -> Self {
        self.dependency_key = Some(key.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Key of the shared dependency store entry backing this component.
    pub fn dependency_key(&self) -> Option<&str> {
        self.dependency_key.as_deref()
    }

    /// The checkout directory under `dependencies/`.
    pub fn target_directory(&self) -> PathBuf {
        component_dir(&self.work_dir, &self.name)
    }

    /// The content root: the checkout directory, or the configured
    /// subdirectory within it.
    pub fn root_directory(&self) -> PathBuf {
        if self.sub_path.is_empty() {
            self.target_directory()
        } else {
            self.target_directory().join(&self.sub_path)
        }
    }

    /// The component class advertised to the inventory.
    pub fn class_file(&self) -> PathBuf {
        self.root_directory().join("class").join(format!("{}.yml", self.name))
    }

    /// The component's defaults class.
    pub fn defaults_file(&self) -> PathBuf {
        self.root_directory().join("class").join("defaults.yml")
    }
}

/// One package registered with the compile context.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    work_dir: PathBuf,
    version: Option<String>,
    sub_path: String,
    dependency_key: Option<String>,
}

impl Package {
    pub fn new(name: &str, work_dir: &Path) -> Result<Self> {
        validate_slug("package", name)?;
        Ok(Self {
            name: name.to_string(),
            work_dir: work_dir.to_path_buf(),
            version: None,
            sub_path: String::new(),
            dependency_key: None,
        })
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_sub_path(mut self, sub_path: &str) -> Self {
        self.sub_path = sub_path.to_string();
        self
    }

    pub fn with_dependency_key(mut self, key: &str) -> Self {
        self.dependency_key = Some(key.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn dependency_key(&self) -> Option<&str> {
        self.dependency_key.as_deref()
    }

    pub fn target_directory(&self) -> PathBuf {
        package_dependency_dir(&self.work_dir, &self.name)
    }

    /// Directory holding the package's classes.
    pub fn root_directory(&self) -> PathBuf {
        if self.sub_path.is_empty() {
            self.target_directory()
        } else {
            self.target_directory().join(&self.sub_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_component_parameters_key() {
        assert_eq!(component_parameters_key("foo"), "foo");
        assert_eq!(component_parameters_key("foo-comp"), "foo_comp");
        assert_eq!(component_parameters_key("a-b-c"), "a_b_c");
    }

    #[test]
    fn test_component_paths() {
        let work_dir = PathBuf::from("/work");
        let c = Component::new("my-component", &work_dir).unwrap();
        assert_eq!(
            c.target_directory(),
            PathBuf::from("/work/dependencies/my-component")
        );
        assert_eq!(
            c.class_file(),
            PathBuf::from("/work/dependencies/my-component/class/my-component.yml")
        );
        assert_eq!(
            c.defaults_file(),
            PathBuf::from("/work/dependencies/my-component/class/defaults.yml")
        );
    }

    #[test]
    fn test_component_sub_path_moves_content_root() {
        let work_dir = PathBuf::from("/work");
        let c = Component::new("my-component", &work_dir)
            .unwrap()
            .with_sub_path("component");
        assert_eq!(
            c.class_file(),
            PathBuf::from("/work/dependencies/my-component/component/class/my-component.yml")
        );
    }

    #[test]
    fn test_package_directory_is_prefixed() {
        let work_dir = PathBuf::from("/work");
        let p = Package::new("shared", &work_dir).unwrap();
        assert_eq!(
            p.target_directory(),
            PathBuf::from("/work/dependencies/pkg.shared")
        );
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("component", "foo").is_ok());
        assert!(validate_slug("component", "foo-comp2").is_ok());
        assert!(validate_slug("component", "").is_err());
        assert!(validate_slug("component", "Foo").is_err());
        assert!(validate_slug("component", "2foo").is_err());
        assert!(validate_slug("component", "foo-").is_err());
        assert!(validate_slug("component", "foo--bar").is_err());
        assert!(validate_slug("component", "foo_bar").is_err());
    }
}
