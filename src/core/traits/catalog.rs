/// A problem instance together with the domain file it is solved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceEntry {
    pub domain: String,
    pub domain_file: String,
    pub instance: String,
    pub index: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("domain {domain} has {domain_files} domain files for {instances} instances")]
    DomainFileMismatch {
        domain: String,
        domain_files: usize,
        instances: usize,
    },
}

/// Lists the benchmark suites, their domains and instances.
#[mockall::automock]
pub trait InstanceCatalog: std::fmt::Debug + Send + Sync {
    fn suites(&self) -> Result<Vec<String>, CatalogError>;

    fn domains(&self, suite: &str) -> Result<Vec<String>, CatalogError>;

    fn instances(&self, suite: &str, domain: &str) -> Result<Vec<InstanceEntry>, CatalogError>;
}
