use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::fs;
use uuid::Uuid;

use crate::{
    constants::{CONFIG_FILE, PARAMETERS_EXT, STDERR_EXT, STDOUT_EXT},
    core::{
        domain::{CapturedOutput, Configuration, RunArtifact, RunKey},
        traits::store::{RecordSink, ResultStore, StoreError},
    },
};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes through a sibling temporary file, so readers see either nothing
/// or the complete contents.
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let staging = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
    fs::write(&staging, contents)
        .await
        .map_err(io_error(&staging))?;
    fs::rename(&staging, path).await.map_err(io_error(path))
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Serializes `value` as pretty JSON into `path`, creating parent directories.
async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomically(path, &json).await
}

/// Raw run artifacts laid out as `<dir>/<grouping key>/<domain>_<instance>.{json,out,err}`
/// plus one `_config.json` per grouping key.
#[derive(Clone, Debug)]
pub struct FsResultStore {
    dir: PathBuf,
}

impl FsResultStore {
    pub fn new<T: AsRef<Path>>(dir: T) -> Self {
        Self {
            dir: dir.as_ref().into(),
        }
    }

    fn artifact_path(&self, grouping_key: &str, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(grouping_key).join(format!("{stem}.{ext}"))
    }
}

#[async_trait::async_trait]
impl ResultStore for FsResultStore {
    /// Whether the run already produced output. Stdout is written last, so
    /// its presence means the whole artifact is there.
    async fn has_run(&self, key: &RunKey) -> bool {
        fs::try_exists(self.artifact_path(&key.grouping_key, &key.stem(), STDOUT_EXT))
            .await
            .unwrap_or(false)
    }

    /// Creates the configuration directory and its `_config.json` on first use.
    async fn ensure_configuration(&self, configuration: &Configuration) -> Result<(), StoreError> {
        let config_path = self.dir.join(configuration.grouping_key()).join(CONFIG_FILE);
        if fs::try_exists(&config_path).await.map_err(io_error(&config_path))? {
            return Ok(());
        }
        write_json(&config_path, configuration).await
    }

    async fn save(&self, artifact: &RunArtifact) -> Result<(), StoreError> {
        let key = artifact.descriptor.run_key();
        let stem = key.stem();
        let dir = self.dir.join(&key.grouping_key);
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

        let parameters_path = self.artifact_path(&key.grouping_key, &stem, PARAMETERS_EXT);
        let parameters =
            serde_json::to_vec_pretty(&artifact.descriptor).map_err(|source| StoreError::Json {
                path: parameters_path.clone(),
                source,
            })?;
        write_atomically(&parameters_path, &parameters).await?;
        write_atomically(
            &self.artifact_path(&key.grouping_key, &stem, STDERR_EXT),
            artifact.output.stderr.as_bytes(),
        )
        .await?;
        write_atomically(
            &self.artifact_path(&key.grouping_key, &stem, STDOUT_EXT),
            artifact.output.stdout.as_bytes(),
        )
        .await
    }

    /// Captured output of a run, `None` when it never ran. A missing stderr
    /// file reads as empty.
    async fn load_output(
        &self,
        grouping_key: &str,
        stem: &str,
    ) -> Result<Option<CapturedOutput>, StoreError> {
        let Some(stdout) = read_optional(&self.artifact_path(grouping_key, stem, STDOUT_EXT)).await?
        else {
            return Ok(None);
        };
        let stderr = read_optional(&self.artifact_path(grouping_key, stem, STDERR_EXT))
            .await?
            .unwrap_or_default();
        Ok(Some(CapturedOutput { stdout, stderr }))
    }

    async fn load_parameters(
        &self,
        grouping_key: &str,
        stem: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let path = self.artifact_path(grouping_key, stem, PARAMETERS_EXT);
        let Some(text) = read_optional(&path).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Ok(None),
            Err(source) => Err(StoreError::Json { path, source }),
        }
    }

    /// Every stored configuration. Directories without a readable
    /// `_config.json` are skipped.
    async fn configurations(&self) -> Result<Vec<Configuration>, StoreError> {
        let mut configurations = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(configurations),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.dir))? {
            let config_path = entry.path().join(CONFIG_FILE);
            let Some(text) = read_optional(&config_path).await? else {
                continue;
            };
            match serde_json::from_str::<Configuration>(&text) {
                Ok(configuration) => configurations.push(configuration),
                Err(e) => tracing::warn!("Skipping {}: {}", config_path.display(), e),
            }
        }

        configurations.sort();
        Ok(configurations)
    }

    /// Stems of every executed run of a configuration, sorted.
    async fn run_stems(&self, grouping_key: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.dir.join(grouping_key);
        let mut stems = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stems),
            Err(e) => return Err(io_error(&dir)(e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == STDOUT_EXT) {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    stems.push(stem.to_string());
                }
            }
        }

        stems.sort();
        Ok(stems)
    }
}

/// Derived records laid out as `<dir>/<grouping key>/<stem>.json`.
#[derive(Clone, Debug)]
pub struct FsRecordSink {
    dir: PathBuf,
}

impl FsRecordSink {
    pub fn new<T: AsRef<Path>>(dir: T) -> Self {
        Self {
            dir: dir.as_ref().into(),
        }
    }
}

#[async_trait::async_trait]
impl RecordSink for FsRecordSink {
    async fn write_record(
        &self,
        grouping_key: &str,
        stem: &str,
        record: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let path = self
            .dir
            .join(grouping_key)
            .join(format!("{stem}.{PARAMETERS_EXT}"));
        write_json(&path, record).await
    }
}
