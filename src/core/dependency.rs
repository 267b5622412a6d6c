//! Dependency edges between documents and the resolution of directive paths
//! to document URIs.

use super::error::DependencyLocationError;
use crate::traits::FileSystem;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    /// The entry document of a graph.
    Root,
    /// Declarations are flattened into the including document.
    Include,
    /// Declarations are exposed under a namespace alias.
    Import,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Root => "root",
            DependencyKind::Include => "include",
            DependencyKind::Import => "import",
        }
    }
}

impl FromStr for DependencyKind {
    type Err = DependencyLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(DependencyKind::Root),
            "include" => Ok(DependencyKind::Include),
            "import" => Ok(DependencyKind::Import),
            other => Err(DependencyLocationError::UnknownKind(other.to_string())),
        }
    }
}

/// One edge of the import/include graph.
///
/// Serializes as `<kind>[:<args>...]!<location>`, e.g.
/// `import:mathlib!file:///lib.ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyLocation {
    pub kind: DependencyKind,
    pub location: String,
    /// The namespace alias for imports; empty otherwise.
    pub args: Vec<String>,
}

impl DependencyLocation {
    pub fn root(location: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Root,
            location: location.into(),
            args: Vec::new(),
        }
    }

    pub fn include(location: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Include,
            location: location.into(),
            args: Vec::new(),
        }
    }

    pub fn import(location: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            kind: DependencyKind::Import,
            location: location.into(),
            args: alias.into_iter().collect(),
        }
    }

    /// The alias declarations are exposed under, if this edge is a named import.
    pub fn namespace(&self) -> Option<&str> {
        match self.kind {
            DependencyKind::Import => self.args.first().map(String::as_str),
            DependencyKind::Root | DependencyKind::Include => None,
        }
    }
}

impl fmt::Display for DependencyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        for arg in &self.args {
            write!(f, ":{arg}")?;
        }
        write!(f, "!{}", self.location)
    }
}

impl FromStr for DependencyLocation {
    type Err = DependencyLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, location) = s
            .split_once('!')
            .ok_or_else(|| DependencyLocationError::MissingSeparator(s.to_string()))?;
        if location.is_empty() {
            return Err(DependencyLocationError::EmptyLocation(s.to_string()));
        }
        let mut parts = head.split(':');
        let kind = parts.next().unwrap_or_default().parse()?;
        Ok(Self {
            kind,
            location: location.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

/// Turns the path written in an include/import directive into the URI of an
/// existing document.
///
/// A path starting with `/` is relative to the workspace folder of the
/// importing document (or its own directory outside any folder); any other
/// path is relative to the importing document. The path is tried as written,
/// then with each configured extension appended.
#[derive(Clone)]
pub struct ImportResolver {
    fs: Arc<dyn FileSystem>,
    extensions: Vec<String>,
}

impl fmt::Debug for ImportResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportResolver")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl ImportResolver {
    pub fn new(fs: Arc<dyn FileSystem>, extensions: Vec<String>) -> Self {
        Self { fs, extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub async fn resolve(&self, from_uri: &str, path: &str) -> Option<String> {
        let base = self.base_for(from_uri, path).await?;
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let candidates: Vec<String> = std::iter::once(relative.to_string())
            .chain(
                self.extensions
                    .iter()
                    .map(|extension| format!("{relative}.{}", extension.trim_start_matches('.'))),
            )
            .filter_map(|candidate| base.join(&candidate).ok())
            .map(String::from)
            .collect();

        let resolved = self.fs.find_existing_path(&candidates).await;
        if resolved.is_none() {
            tracing::debug!("Unresolved dependency '{}' from {}", path, from_uri);
        }
        resolved
    }

    async fn base_for(&self, from_uri: &str, path: &str) -> Option<Url> {
        let document = Url::parse(from_uri).ok()?;
        if !path.starts_with('/') {
            return Some(document);
        }
        match self.fs.get_workspace_folder_uri(from_uri).await {
            Some(folder) => {
                let mut folder = Url::parse(&folder).ok()?;
                if !folder.path().ends_with('/') {
                    let with_slash = format!("{}/", folder.path());
                    folder.set_path(&with_slash);
                }
                Some(folder)
            }
            None => Some(document),
        }
    }
}
