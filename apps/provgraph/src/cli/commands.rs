//! # CLI Command Implementations

use super::Backend;
use crate::api;
use crate::config::AppConfig;
use provgraph_core::{
    Dataset, GraphStore, ProvGraphError, Query, QueryEngine, QueryResult, SchemaRegistry,
    StorageBackend,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum dataset file size (500 MB).
const MAX_DATASET_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum query file size (2 MB, same as the HTTP body limit).
const MAX_QUERY_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ProvGraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ProvGraphError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ProvGraphError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
///
/// Canonicalizing resolves `..` and symlinks before anything is read.
fn validate_file_path(path: &Path) -> Result<PathBuf, ProvGraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        ProvGraphError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ProvGraphError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Resolve an output path whose parent directory must already exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, ProvGraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        ProvGraphError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    let filename = path
        .file_name()
        .ok_or_else(|| ProvGraphError::Io("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

/// Read a validated file as UTF-8 text.
fn read_text(path: &Path, max_size: u64) -> Result<String, ProvGraphError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| ProvGraphError::Io(format!("Read '{}': {}", validated.display(), e)))
}

/// Query text from a file or the `--inline` argument.
pub fn read_query(file: Option<&Path>, inline: Option<String>) -> Result<String, ProvGraphError> {
    match (file, inline) {
        (Some(path), _) => read_text(path, MAX_QUERY_FILE_SIZE),
        (None, Some(text)) => Ok(text),
        (None, None) => Err(ProvGraphError::validation(
            "Provide a query with --file or --inline",
        )),
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// STORE HANDLING
// =============================================================================

/// The database path and the backend that interprets it.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: PathBuf,
    pub backend: Backend,
}

impl StoreLocation {
    /// Open the store. A missing memory dataset yields an empty graph.
    pub fn open(&self, config: &AppConfig) -> Result<StorageBackend, ProvGraphError> {
        let weights = config.engine.weights;
        match self.backend {
            Backend::Redb => StorageBackend::redb(&self.path, weights),
            Backend::Memory if self.path.exists() => {
                let dataset = Dataset::from_json(&read_text(&self.path, MAX_DATASET_FILE_SIZE)?)?;
                StorageBackend::in_memory(&dataset, &weights)
            }
            Backend::Memory => Ok(StorageBackend::default()),
        }
    }

    /// Open the store behind an engine built from `config`.
    pub fn engine(&self, config: &AppConfig) -> Result<QueryEngine<StorageBackend>, ProvGraphError> {
        QueryEngine::with_config(self.open(config)?, config.engine)
    }

    /// Write an in-memory store back to its dataset file; redb needs nothing.
    pub fn save(&self, store: &StorageBackend) -> Result<(), ProvGraphError> {
        if store.is_persistent() {
            return Ok(());
        }
        let snapshot = Dataset::snapshot(&store.begin_read()?)?;
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| ProvGraphError::Io(format!("Serialize dataset: {}", e)))?;
        let output = validate_output_path(&self.path)?;
        std::fs::write(&output, data)
            .map_err(|e| ProvGraphError::Io(format!("Write '{}': {}", output.display(), e)))
    }

    fn label(&self) -> &'static str {
        match self.backend {
            Backend::Redb => "redb",
            Backend::Memory => "memory",
        }
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    store: &StoreLocation,
    config: &AppConfig,
    host: &str,
    port: u16,
) -> Result<(), ProvGraphError> {
    let engine = store.engine(config)?;

    println!("provgraph query server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", store.label());
    println!("  Database: {:?}", store.path);
    match config.engine.limits.timeout_ms {
        Some(ms) if ms > 0 => println!("  Timeout:  {} ms", ms),
        _ => println!("  Timeout:  none"),
    }
    println!();
    println!("Endpoints:");
    println!("  GET  /health        - Health check");
    println!("  GET  /status        - Entity and edge counts");
    println!("  GET  /schema        - Query language registry");
    println!("  POST /query         - Execute a query");
    println!("  POST /query/explain - Compiled plan summary");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, engine).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show entity and edge counts.
pub fn cmd_status(
    store: &StoreLocation,
    config: &AppConfig,
    json_mode: bool,
) -> Result<(), ProvGraphError> {
    let engine = store.engine(config)?;
    let stats = engine.stats()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": store.path.to_string_lossy(),
            "backend": store.label(),
            "entity_count": stats.entities,
            "edge_count": stats.edges,
        }));
        return Ok(());
    }

    println!("provgraph Store Status");
    println!("======================");
    println!("Database: {:?}", store.path);
    println!("Backend:  {}", store.label());
    println!();
    println!("Entities: {}", stats.entities);
    println!("Edges:    {}", stats.edges);
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(
    store: &StoreLocation,
    config: &AppConfig,
    force: bool,
) -> Result<(), ProvGraphError> {
    if store.path.exists() {
        if !force {
            return Err(ProvGraphError::Io(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&store.path)
            .map_err(|e| ProvGraphError::Io(format!("Remove existing database: {}", e)))?;
    }

    let backend = store.open(config)?;
    store.save(&backend)?;
    println!(
        "Initialized new {} database at {:?}",
        store.label(),
        store.path
    );
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Import a dataset file. Nothing is written if any record is invalid.
pub fn cmd_import(
    store: &StoreLocation,
    config: &AppConfig,
    file: &Path,
    json_mode: bool,
) -> Result<(), ProvGraphError> {
    let dataset = Dataset::from_json(&read_text(file, MAX_DATASET_FILE_SIZE)?)?;

    let mut backend = store.open(config)?;
    let summary = backend.import(&dataset, &config.engine.weights)?;
    store.save(&backend)?;

    if json_mode {
        print_json(&serde_json::json!({
            "entities": summary.entities,
            "edges": summary.edges,
        }));
    } else {
        println!(
            "Imported {} entities and {} edges into {:?}",
            summary.entities, summary.edges, store.path
        );
    }
    Ok(())
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// Execute a query and print the result.
pub fn cmd_query(
    store: &StoreLocation,
    config: &AppConfig,
    text: &str,
    json_mode: bool,
) -> Result<(), ProvGraphError> {
    let query: Query = text.parse()?;
    let engine = store.engine(config)?;
    let result = engine.execute(&query)?;

    if json_mode {
        print_json(&result);
    } else {
        print_rows(&result);
    }
    Ok(())
}

fn print_rows(result: &QueryResult) {
    for (i, row) in result.results.iter().enumerate() {
        println!("[{}]", i + 1);
        for (field, value) in row {
            println!("  {} = {}", field, value);
        }
    }
    println!();
    println!(
        "{} of {} results ({} ms){}",
        result.len(),
        result.metadata.total_results,
        result.metadata.query_time_ms,
        if result.metadata.has_more {
            ", more available"
        } else {
            ""
        }
    );
}

/// Print the compiled plan of a query.
pub fn cmd_explain(config: &AppConfig, text: &str) -> Result<(), ProvGraphError> {
    let query: Query = text.parse()?;
    let engine = QueryEngine::with_config(StorageBackend::default(), config.engine)?;
    print_json(&engine.explain(&query)?);
    Ok(())
}

/// Print the query language registry.
pub fn cmd_schema() -> Result<(), ProvGraphError> {
    print_json(&SchemaRegistry::new().describe());
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset_json() -> String {
        json!({
            "entities": [
                {"id": "drug:tamoxifen", "type": "drug", "name": "Tamoxifen"},
                {"id": "disease:breast_cancer", "type": "disease", "name": "Breast Cancer"}
            ],
            "edges": [{
                "edge_id": "c1",
                "source_id": "drug:tamoxifen",
                "target_id": "disease:breast_cancer",
                "relation_type": "treats",
                "kind": "claim",
                "evidence": [{"paper_id": "pmid:1", "section_type": "results",
                              "extraction_method": "llm", "confidence": 0.9, "study_type": "rct"}]
            }]
        })
        .to_string()
    }

    #[test]
    fn memory_store_persists_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("input.json");
        std::fs::write(&input, dataset_json()).expect("write");
        let store = StoreLocation {
            path: dir.path().join("graph.json"),
            backend: Backend::Memory,
        };
        let config = AppConfig::default();

        cmd_import(&store, &config, &input, true).expect("import");
        let stats = store.engine(&config).expect("engine").stats().expect("stats");
        assert_eq!((stats.entities, stats.edges), (2, 1));
    }

    #[test]
    fn redb_store_persists_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("input.json");
        std::fs::write(&input, dataset_json()).expect("write");
        let store = StoreLocation {
            path: dir.path().join("graph.redb"),
            backend: Backend::Redb,
        };
        let config = AppConfig::default();

        cmd_init(&store, &config, false).expect("init");
        cmd_import(&store, &config, &input, true).expect("import");
        let stats = store.engine(&config).expect("engine").stats().expect("stats");
        assert_eq!((stats.entities, stats.edges), (2, 1));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StoreLocation {
            path: dir.path().join("graph.json"),
            backend: Backend::Memory,
        };
        let config = AppConfig::default();

        cmd_init(&store, &config, false).expect("init");
        assert!(cmd_init(&store, &config, false).is_err());
        assert!(cmd_init(&store, &config, true).is_ok());
    }

    #[test]
    fn inline_query_is_used_when_no_file() {
        let text = read_query(None, Some("{\"find\": \"nodes\"}".to_string())).expect("text");
        assert!(text.contains("nodes"));
    }

    #[test]
    fn directories_are_not_query_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_query(Some(dir.path()), None).is_err());
    }
}
