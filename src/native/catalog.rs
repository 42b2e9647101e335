use std::path::{Path, PathBuf};

use crate::{
    constants::INSTANCE_EXT,
    core::traits::catalog::{CatalogError, InstanceCatalog, InstanceEntry},
};

/// Reads `<dir>/<suite>/<domain>/*.pddl`. Files whose name contains
/// `domain` are domain files, everything else is an instance.
#[derive(Clone, Debug)]
pub struct FsInstanceCatalog {
    dir: PathBuf,
}

impl FsInstanceCatalog {
    pub fn new<T: AsRef<Path>>(dir: T) -> Self {
        Self {
            dir: dir.as_ref().into(),
        }
    }
}

fn list(path: &Path, directories: bool) -> Result<Vec<String>, CatalogError> {
    let io = |source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io)? {
        let entry = entry.map_err(io)?;
        let is_dir = entry.file_type().map_err(io)?.is_dir();
        if is_dir == directories {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

impl InstanceCatalog for FsInstanceCatalog {
    fn suites(&self) -> Result<Vec<String>, CatalogError> {
        list(&self.dir, true)
    }

    fn domains(&self, suite: &str) -> Result<Vec<String>, CatalogError> {
        list(&self.dir.join(suite), true)
    }

    fn instances(&self, suite: &str, domain: &str) -> Result<Vec<InstanceEntry>, CatalogError> {
        let suffix = format!(".{INSTANCE_EXT}");
        let (domain_files, instances): (Vec<String>, Vec<String>) =
            list(&self.dir.join(suite).join(domain), false)?
                .into_iter()
                .filter_map(|name| name.strip_suffix(&suffix).map(str::to_string))
                .partition(|name| name.contains("domain"));

        // one shared domain file, or one per instance in sorted order
        if domain_files.len() != 1 && domain_files.len() < instances.len() {
            return Err(CatalogError::DomainFileMismatch {
                domain: domain.to_string(),
                domain_files: domain_files.len(),
                instances: instances.len(),
            });
        }

        Ok(instances
            .into_iter()
            .enumerate()
            .map(|(index, instance)| InstanceEntry {
                domain: domain.to_string(),
                domain_file: if domain_files.len() == 1 {
                    domain_files[0].clone()
                } else {
                    domain_files[index].clone()
                },
                instance,
                index,
            })
            .collect())
    }
}
