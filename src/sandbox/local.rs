//! Process-backed sandbox running code with a local interpreter.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

use super::provider::{ExecutionOutput, Sandbox, SandboxProvider};

/// Configuration for local sandboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSandboxConfig {
    /// Interpreter used to run code cells.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Maximum wall-clock time per code cell, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Directory under which sandboxes are created. Defaults to the system
    /// temp directory.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Directory exposed to code through `PYTHONPATH`.
    #[serde(default)]
    pub python_path: Option<PathBuf>,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LocalSandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_timeout_secs(),
            base_dir: None,
            python_path: None,
        }
    }
}

impl LocalSandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A sandbox backed by a private directory and a child interpreter process.
pub struct LocalSandboxInstance {
    /// Root directory owning everything this sandbox created.
    root: PathBuf,
    /// Working directory code runs in.
    work_dir: PathBuf,
    /// Host-side directory that downloads are copied into.
    downloads_dir: PathBuf,
    config: LocalSandboxConfig,
    /// Remote name already handed out for each uploaded host file.
    uploads: Mutex<HashMap<PathBuf, PathBuf>>,
    /// Whether the sandbox has been cleaned up.
    cleaned_up: bool,
}

impl LocalSandboxInstance {
    /// Picks the remote name for `local`.
    ///
    /// Re-uploading the same host file reuses its name; a different file
    /// whose name is taken gets a numbered one (`dog-1.jpg`).
    fn remote_name(&self, local: &Path) -> Result<PathBuf> {
        let file_name = local
            .file_name()
            .ok_or_else(|| Error::Sandbox(format!("cannot upload {}: no file name", local.display())))?;
        let source = std::fs::canonicalize(local)
            .map_err(|e| Error::Sandbox(format!("failed to upload {}: {}", local.display(), e)))?;

        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| Error::Sandbox("upload table poisoned".to_string()))?;
        if let Some(remote) = uploads
            .iter()
            .find_map(|(remote, owner)| (owner == &source).then(|| remote.clone()))
        {
            return Ok(remote);
        }

        let mut remote = PathBuf::from(file_name);
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()));
        let mut n = 0;
        while uploads.contains_key(&remote) || self.work_dir.join(&remote).exists() {
            n += 1;
            remote = PathBuf::from(format!("{}-{}{}", stem, n, extension.as_deref().unwrap_or("")));
        }
        uploads.insert(remote.clone(), source);
        Ok(remote)
    }

    /// Resolves a remote reference to a path inside the working directory.
    fn resolve(&self, remote: &Path) -> Result<PathBuf> {
        let escapes = remote
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::Sandbox(format!(
                "remote path {} is outside the sandbox",
                remote.display()
            )));
        }
        Ok(self.work_dir.join(remote))
    }
}

#[async_trait]
impl Sandbox for LocalSandboxInstance {
    fn path(&self) -> &Path {
        &self.work_dir
    }

    async fn upload(&self, local: &Path) -> Result<PathBuf> {
        let remote = self.remote_name(local)?;

        tokio::fs::copy(local, self.work_dir.join(&remote))
            .await
            .map_err(|e| Error::Sandbox(format!("failed to upload {}: {}", local.display(), e)))?;

        tracing::debug!(local = ?local, remote = ?remote, "uploaded file to sandbox");
        Ok(remote)
    }

    async fn download(&self, remote: &Path) -> Result<PathBuf> {
        let source = self.resolve(remote)?;
        let file_name = remote
            .file_name()
            .ok_or_else(|| Error::Sandbox(format!("cannot download {}: no file name", remote.display())))?;
        let local = self.downloads_dir.join(file_name);

        tokio::fs::copy(&source, &local)
            .await
            .map_err(|e| Error::Sandbox(format!("failed to download {}: {}", remote.display(), e)))?;

        tracing::debug!(remote = ?remote, local = ?local, "downloaded file from sandbox");
        Ok(local)
    }

    async fn execute(&self, source: &str) -> Result<ExecutionOutput> {
        let cell_path = self
            .work_dir
            .join(format!(".cell-{}.py", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&cell_path, source).await?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&cell_path)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(python_path) = &self.config.python_path {
            let mut joined = python_path.as_os_str().to_os_string();
            if let Some(existing) = std::env::var_os("PYTHONPATH") {
                joined.push(":");
                joined.push(existing);
            }
            command.env("PYTHONPATH", joined);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            Error::Sandbox(format!(
                "failed to start interpreter {}: {}",
                self.config.interpreter, e
            ))
        })?;

        let result = tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await;
        let duration = started.elapsed();
        let _ = tokio::fs::remove_file(&cell_path).await;

        match result {
            Ok(Ok(output)) => Ok(ExecutionOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
                duration,
            }),
            Ok(Err(e)) => Err(Error::Sandbox(format!("failed to wait for interpreter: {}", e))),
            Err(_) => {
                // The child is killed when its future is dropped.
                tracing::warn!(timeout = ?self.config.timeout(), "code cell timed out");
                Ok(ExecutionOutput {
                    timed_out: true,
                    duration,
                    ..Default::default()
                })
            }
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.cleaned_up {
            return Ok(());
        }

        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|e| Error::SandboxCleanup {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
        }

        tracing::info!(path = ?self.root, "removed sandbox");
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for LocalSandboxInstance {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.cleanup() {
                tracing::error!(error = %e, path = ?self.root, "failed to cleanup sandbox on drop");
            }
        }
    }
}

/// Provider that creates [`LocalSandboxInstance`]s.
#[derive(Debug, Clone, Default)]
pub struct LocalSandbox {
    config: LocalSandboxConfig,
}

impl LocalSandbox {
    pub fn new(config: LocalSandboxConfig) -> Self {
        Self { config }
    }

    fn base_dir(&self) -> PathBuf {
        match &self.config.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join("code-act-sandboxes"),
        }
    }
}

impl SandboxProvider for LocalSandbox {
    type Sandbox = LocalSandboxInstance;

    fn create(&self) -> Result<Self::Sandbox> {
        let root = self
            .base_dir()
            .join(format!("sandbox-{}", uuid::Uuid::new_v4().simple()));
        let work_dir = root.join("work");
        let downloads_dir = root.join("downloads");

        for dir in [&work_dir, &downloads_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::SandboxCreation(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        tracing::info!(path = ?root, interpreter = %self.config.interpreter, "created sandbox");

        Ok(LocalSandboxInstance {
            root,
            work_dir,
            downloads_dir,
            config: self.config.clone(),
            uploads: Mutex::new(HashMap::new()),
            cleaned_up: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(base: &TempDir) -> LocalSandbox {
        LocalSandbox::new(LocalSandboxConfig {
            base_dir: Some(base.path().to_path_buf()),
            ..Default::default()
        })
    }

    #[test]
    fn config_defaults() {
        let config = LocalSandboxConfig::default();
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn creates_and_cleans_up() {
        let base = TempDir::new().unwrap();
        let mut sandbox = provider(&base).create().unwrap();

        let work_dir = sandbox.path().to_path_buf();
        assert!(work_dir.is_dir());

        sandbox.cleanup().unwrap();
        assert!(!work_dir.exists());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let base = TempDir::new().unwrap();
        let mut sandbox = provider(&base).create().unwrap();
        sandbox.cleanup().expect("first cleanup failed");
        sandbox.cleanup().expect("second cleanup should be idempotent");
    }

    #[test]
    fn drop_removes_sandbox() {
        let base = TempDir::new().unwrap();
        let work_dir = {
            let sandbox = provider(&base).create().unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!work_dir.exists());
    }

    #[test]
    fn upload_download_round_trip_preserves_bytes() {
        let base = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let sandbox = provider(&base).create().unwrap();

        let bytes: Vec<u8> = (0..=255).collect();
        let local = host.path().join("blob.bin");
        std::fs::write(&local, &bytes).unwrap();

        tokio_test::block_on(async {
            let remote = sandbox.upload(&local).await.unwrap();
            assert_eq!(remote, PathBuf::from("blob.bin"));
            assert!(sandbox.path().join("blob.bin").exists());

            let downloaded = sandbox.download(&remote).await.unwrap();
            assert_eq!(std::fs::read(downloaded).unwrap(), bytes);
        });
    }

    #[tokio::test]
    async fn uploads_with_clashing_names_get_distinct_remotes() {
        let base = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let sandbox = provider(&base).create().unwrap();

        std::fs::create_dir_all(host.path().join("a")).unwrap();
        std::fs::create_dir_all(host.path().join("m")).unwrap();
        let dog = host.path().join("dog.jpg");
        let other_dog = host.path().join("a").join("dog.jpg");
        let media = host.path().join("m").join("artifacts.json");
        let store = host.path().join("artifacts.json");
        std::fs::write(&dog, b"first dog").unwrap();
        std::fs::write(&other_dog, b"second dog").unwrap();
        std::fs::write(&media, b"not a store").unwrap();
        std::fs::write(&store, b"{}").unwrap();

        assert_eq!(sandbox.upload(&dog).await.unwrap(), PathBuf::from("dog.jpg"));
        assert_eq!(sandbox.upload(&other_dog).await.unwrap(), PathBuf::from("dog-1.jpg"));
        assert_eq!(sandbox.upload(&media).await.unwrap(), PathBuf::from("artifacts.json"));
        let store_remote = sandbox.upload(&store).await.unwrap();
        assert_eq!(store_remote, PathBuf::from("artifacts-1.json"));

        // Re-uploading the same host file keeps its name.
        std::fs::write(&store, b"{\"v\": 2}").unwrap();
        assert_eq!(sandbox.upload(&store).await.unwrap(), store_remote);

        let work = sandbox.path();
        assert_eq!(std::fs::read(work.join("dog.jpg")).unwrap(), b"first dog");
        assert_eq!(std::fs::read(work.join("dog-1.jpg")).unwrap(), b"second dog");
        assert_eq!(std::fs::read(work.join("artifacts.json")).unwrap(), b"not a store");
        assert_eq!(std::fs::read(work.join("artifacts-1.json")).unwrap(), b"{\"v\": 2}");
    }

    #[tokio::test]
    async fn download_rejects_escaping_paths() {
        let base = TempDir::new().unwrap();
        let sandbox = provider(&base).create().unwrap();

        let err = sandbox.download(Path::new("../secret")).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
        let err = sandbox.download(Path::new("/etc/passwd")).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[tokio::test]
    async fn missing_interpreter_is_sandbox_error() {
        let base = TempDir::new().unwrap();
        let sandbox = LocalSandbox::new(LocalSandboxConfig {
            interpreter: "no-such-interpreter-binary".to_string(),
            base_dir: Some(base.path().to_path_buf()),
            ..Default::default()
        })
        .create()
        .unwrap();

        let err = sandbox.execute("print(1)").await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(_)));
    }

    #[tokio::test]
    async fn executes_python_and_captures_failures() {
        let python = std::process::Command::new("python3").arg("--version").output();
        if !python.map(|o| o.status.success()).unwrap_or(false) {
            eprintln!("python3 not found, skipping");
            return;
        }
        let base = TempDir::new().unwrap();
        let sandbox = provider(&base).create().unwrap();

        let ok = sandbox.execute("print(6 * 7)").await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "42");

        let failed = sandbox.execute("raise ValueError('boom')").await.unwrap();
        assert!(!failed.success());
        assert!(failed.stderr.contains("ValueError: boom"));
    }
}
