use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};

use common::principal::Principal;
use common::principal_set::PrincipalSet;

use super::{PrincipalSource, SourceError};

/// On-disk layout: `{"name:secret": ["pattern", ...], ...}`
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct AuthFile(BTreeMap<String, Vec<String>>);

impl AuthFile {
    fn into_principals(self, path: &Path) -> Result<Vec<Principal>, SourceError> {
        self.0
            .into_iter()
            .map(|(token, patterns)| {
                Principal::from_entry(&token, &patterns).map_err(|source| {
                    SourceError::InvalidPrincipal {
                        origin: format!("auth file {}", path.display()),
                        source,
                    }
                })
            })
            .collect()
    }
}

/// Principals loaded from a JSON auth file, reloaded whenever the file is written.
///
/// The watch is placed on the file's parent directory and filtered by file
/// name, so saves that replace the file by rename are picked up like any
/// in-place write.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    principals: PrincipalSet,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, principals: PrincipalSet) -> Result<Self, SourceError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(SourceError::MissingPath);
        }
        if path.file_name().is_none() {
            return Err(SourceError::NotAFile(path));
        }
        Ok(Self { path, principals })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> &OsStr {
        // checked in `new`
        self.path.file_name().unwrap_or_default()
    }

    /// Directory holding the auth file; `.` for a bare file name.
    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    async fn read(&self) -> Result<Vec<Principal>, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
        let raw: AuthFile =
            serde_json::from_slice(&bytes).map_err(|source| SourceError::InvalidJson {
                path: self.path.clone(),
                source,
            })?;
        raw.into_principals(&self.path)
    }
}

/// Whether `event` may have left new content under `name`.
///
/// In-place writes, creation and renames onto `name` all count. Renames away
/// from `name` and removals do not; the next write or rename brings it back.
fn rewrites(event: &Event, name: &OsStr) -> bool {
    let targets: &[PathBuf] = match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => &event.paths[..],
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            &event.paths[event.paths.len().saturating_sub(1)..]
        }
        _ => &[],
    };
    targets.iter().any(|path| path.file_name() == Some(name))
}

/// Events that may have re-pointed a symlinked auth file without touching its name.
fn relinks(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)))
}

#[async_trait]
impl PrincipalSource for FileSource {
    fn origin(&self) -> String {
        format!("auth file {}", self.path.display())
    }

    async fn load(&self) -> Result<usize, SourceError> {
        let principals = self.read().await?;
        Ok(self.principals.replace_all(principals))
    }

    async fn watch(&self, mut shutdown: watch::Receiver<()>) -> Result<(), SourceError> {
        let directory = self.directory().to_path_buf();
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
            // receiver gone means the watch loop already returned
            let _ = tx.send(event);
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(
            path = %self.path.display(),
            directory = %directory.display(),
            "watching auth file for changes"
        );

        // pick up writes that landed before the watch was registered
        self.reload().await;
        let mut resolved = tokio::fs::canonicalize(&self.path).await.ok();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!(path = %self.path.display(), "auth file watch shutting down");
                    return Ok(());
                }
                event = rx.recv() => {
                    let event = match event {
                        Some(event) => event?,
                        None => return Err(SourceError::WatchLost(directory)),
                    };
                    tracing::trace!(?event, "auth file directory event");

                    if matches!(event.kind, EventKind::Remove(_))
                        && event.paths.iter().any(|path| path == &directory)
                    {
                        return Err(SourceError::WatchLost(directory));
                    }

                    if rewrites(&event, self.file_name()) {
                        self.reload().await;
                        resolved = tokio::fs::canonicalize(&self.path).await.ok();
                    } else if relinks(&event.kind) {
                        let current = tokio::fs::canonicalize(&self.path).await.ok();
                        if current != resolved {
                            tracing::debug!(path = %self.path.display(), "auth file link target changed");
                            resolved = current;
                            self.reload().await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, RemoveKind};

    use super::*;

    #[test]
    fn test_empty_path_is_rejected() {
        let result = FileSource::new("", PrincipalSet::new());
        assert!(matches!(result, Err(SourceError::MissingPath)));
    }

    #[test]
    fn test_rejects_path_without_file_name() {
        let result = FileSource::new("/", PrincipalSet::new());
        assert!(matches!(result, Err(SourceError::NotAFile(_))));
    }

    #[test]
    fn test_bare_file_name_watches_current_directory() {
        let source = FileSource::new("users.json", PrincipalSet::new()).unwrap();
        assert_eq!(source.directory(), Path::new("."));
        let source = FileSource::new("/etc/warden/users.json", PrincipalSet::new()).unwrap();
        assert_eq!(source.directory(), Path::new("/etc/warden"));
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_rewrites_only_for_the_watched_name() {
        let name = OsStr::new("users.json");
        let write = EventKind::Modify(ModifyKind::Data(DataChange::Content));

        assert!(rewrites(&event(write, &["/etc/warden/users.json"]), name));
        assert!(!rewrites(&event(write, &["/etc/warden/other.json"]), name));
        assert!(rewrites(
            &event(EventKind::Create(CreateKind::File), &["/etc/warden/users.json"]),
            name
        ));
        assert!(!rewrites(
            &event(EventKind::Remove(RemoveKind::File), &["/etc/warden/users.json"]),
            name
        ));
    }

    #[test]
    fn test_rename_onto_the_file_rewrites_it() {
        let name = OsStr::new("users.json");
        let both = EventKind::Modify(ModifyKind::Name(RenameMode::Both));

        assert!(rewrites(&event(both, &["/d/.users.json.tmp", "/d/users.json"]), name));
        assert!(!rewrites(&event(both, &["/d/users.json", "/d/users.json.bak"]), name));
        assert!(rewrites(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/d/users.json"]),
            name
        ));
        assert!(!rewrites(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/d/users.json"]),
            name
        ));
    }

    #[test]
    fn test_relinks() {
        assert!(relinks(&EventKind::Create(CreateKind::Any)));
        assert!(relinks(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))));
        assert!(!relinks(&EventKind::Modify(ModifyKind::Data(DataChange::Any))));
    }

    #[test]
    fn test_auth_file_parses_concrete_scenario() {
        let raw: AuthFile = serde_json::from_str(
            r#"{"alice:secret1": ["10\\.0\\.0\\.1", "*"], "bob:secret2": []}"#,
        )
        .unwrap();
        let principals = raw.into_principals(Path::new("users.json")).unwrap();
        assert_eq!(principals.len(), 2);
        assert_eq!(principals[0].name(), "alice");
        assert_eq!(principals[0].address_matchers().len(), 2);
        assert_eq!(principals[1].name(), "bob");
        assert!(principals[1].address_matchers().is_empty());
    }

    #[test]
    fn test_auth_file_rejects_wrong_shape() {
        let result = serde_json::from_str::<AuthFile>(r#"{"alice:pw": "*"}"#);
        assert!(result.is_err());
        let result = serde_json::from_str::<AuthFile>(r#"["alice:pw"]"#);
        assert!(result.is_err());
    }
}
