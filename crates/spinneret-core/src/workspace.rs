//! Per-target project directory management.
//!
//! Each scraping task owns one project directory under the output root,
//! named after the target site (`<spider>_spider`). The workspace scaffolds
//! the Scrapy project skeleton, persists candidate sources per generation,
//! saves run logs per attempt, and reads back the JSON-lines output file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{spider_name_from_url, FieldSpec, GeneratedProgram, Result, SpinneretError};

/// Name of the JSON-lines file generated spiders write records to.
pub const RECORDS_FILE: &str = "output.json";

const MANIFEST_FILE: &str = "spinneret.json";

/// Manifest persisted at the project root so a project can be reopened
/// later (e.g. for a release run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub spider_name: String,
    pub target_url: String,
    #[serde(default)]
    pub fields: FieldSpec,
    /// Generation of the program currently on disk (0 = none yet).
    #[serde(default)]
    pub current_generation: u32,
    pub created_at: DateTime<Utc>,
}

/// Handle to one task's project directory.
#[derive(Debug, Clone)]
pub struct ProjectWorkspace {
    root: PathBuf,
    manifest: TaskManifest,
}

impl ProjectWorkspace {
    /// Create a fresh project directory for `target_url` under `output_root`.
    ///
    /// Scaffolds the Scrapy skeleton (cfg, settings, items, spiders package)
    /// and writes the manifest. Reuses an existing directory if present.
    pub fn create(output_root: &Path, target_url: &str, fields: FieldSpec) -> Result<Self> {
        let spider_name = spider_name_from_url(target_url);
        let root = output_root.join(format!("{spider_name}_spider"));
        fs::create_dir_all(root.join(&spider_name).join("spiders"))?;
        fs::create_dir_all(root.join("logs"))?;

        let manifest = TaskManifest {
            spider_name: spider_name.clone(),
            target_url: target_url.to_string(),
            fields,
            current_generation: 0,
            created_at: Utc::now(),
        };

        let workspace = Self { root, manifest };
        workspace.scaffold()?;
        workspace.write_manifest()?;
        debug!(event = "workspace.created", root = %workspace.root.display());
        Ok(workspace)
    }

    /// Reopen an existing project directory via its manifest.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let raw = fs::read_to_string(root.join(MANIFEST_FILE)).map_err(|e| {
            SpinneretError::TaskNotReady(format!(
                "{} is not a spinneret project: {e}",
                root.display()
            ))
        })?;
        let manifest: TaskManifest = serde_json::from_str(&raw)?;
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn spider_name(&self) -> &str {
        &self.manifest.spider_name
    }

    pub fn target_url(&self) -> &str {
        &self.manifest.target_url
    }

    pub fn fields(&self) -> &FieldSpec {
        &self.manifest.fields
    }

    pub fn current_generation(&self) -> u32 {
        self.manifest.current_generation
    }

    /// Path of the JSON-lines records file.
    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    /// Persist a candidate's sources as the current program.
    ///
    /// Writes the spider module and pipeline module inside the project
    /// package and bumps the manifest's current generation.
    pub fn write_program(&mut self, program: &GeneratedProgram) -> Result<()> {
        let package = self.root.join(&self.manifest.spider_name);
        let spider_path = package
            .join("spiders")
            .join(format!("{}.py", self.manifest.spider_name));
        fs::write(&spider_path, &program.spider_source)?;
        fs::write(package.join("pipelines.py"), &program.pipeline_source)?;

        self.manifest.current_generation = program.generation;
        self.write_manifest()?;
        debug!(
            event = "workspace.program_written",
            generation = program.generation,
            digest = program.short_digest(),
        );
        Ok(())
    }

    /// Save captured stdout/stderr for one attempt.
    pub fn save_logs(&self, generation: u32, stdout: &str, stderr: &str) -> Result<()> {
        let dir = self.root.join("logs").join(format!("attempt_{generation}"));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("stdout.log"), stdout)?;
        fs::write(dir.join("stderr.log"), stderr)?;
        Ok(())
    }

    /// Remove the records file so a run's counts cannot include records
    /// from a prior attempt.
    pub fn clear_records(&self) -> Result<()> {
        match fs::remove_file(self.records_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse the JSON-lines records file. Unparsable lines are skipped
    /// (generated spiders occasionally interleave junk on stdout capture).
    pub fn read_records(&self) -> Result<Vec<serde_json::Value>> {
        let raw = match fs::read_to_string(self.records_path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Persist an arbitrary JSON artifact at the project root.
    pub fn write_artifact<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, serde_json::to_vec_pretty(value)?)?;
        Ok(path)
    }

    fn write_manifest(&self) -> Result<()> {
        fs::write(
            self.root.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&self.manifest)?,
        )?;
        Ok(())
    }

    fn scaffold(&self) -> Result<()> {
        let name = &self.manifest.spider_name;
        let package = self.root.join(name);

        let cfg = self.root.join("scrapy.cfg");
        if !cfg.exists() {
            fs::write(
                cfg,
                format!("[settings]\ndefault = {name}.settings\n"),
            )?;
        }

        let settings = package.join("settings.py");
        if !settings.exists() {
            fs::write(
                settings,
                format!(
                    "BOT_NAME = \"{name}\"\n\
                     SPIDER_MODULES = [\"{name}.spiders\"]\n\
                     NEWSPIDER_MODULE = \"{name}.spiders\"\n\
                     ROBOTSTXT_OBEY = True\n\
                     CONCURRENT_REQUESTS = 16\n\
                     DOWNLOAD_DELAY = 1\n\
                     LOG_LEVEL = \"INFO\"\n\
                     FEEDS = {{\"{RECORDS_FILE}\": {{\"format\": \"jsonlines\"}}}}\n"
                ),
            )?;
        }

        for init in [
            package.join("__init__.py"),
            package.join("spiders").join("__init__.py"),
        ] {
            if !init.exists() {
                fs::write(init, "")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldKind;
    use tempfile::TempDir;

    fn fields() -> FieldSpec {
        FieldSpec::new(vec![("title".to_string(), FieldKind::Text)]).unwrap()
    }

    #[test]
    fn test_create_scaffolds_project() {
        let dir = TempDir::new().unwrap();
        let ws = ProjectWorkspace::create(dir.path(), "https://www.vinted.fr/x", fields()).unwrap();

        assert_eq!(ws.spider_name(), "vinted");
        assert!(ws.root().join("scrapy.cfg").exists());
        assert!(ws.root().join("vinted/settings.py").exists());
        assert!(ws.root().join("vinted/spiders/__init__.py").exists());
        assert!(ws.root().join("logs").exists());
    }

    #[test]
    fn test_write_program_and_reopen() {
        let dir = TempDir::new().unwrap();
        let mut ws =
            ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();

        let program = GeneratedProgram::initial("import scrapy\n", "# pipeline\n");
        ws.write_program(&program).unwrap();
        assert!(ws.root().join("example/spiders/example.py").exists());
        assert_eq!(ws.current_generation(), 1);

        let reopened = ProjectWorkspace::open(ws.root()).unwrap();
        assert_eq!(reopened.spider_name(), "example");
        assert_eq!(reopened.current_generation(), 1);
        assert_eq!(reopened.fields().len(), 1);
    }

    #[test]
    fn test_open_rejects_non_project_dir() {
        let dir = TempDir::new().unwrap();
        let err = ProjectWorkspace::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a spinneret project"));
    }

    #[test]
    fn test_read_records_parses_json_lines() {
        let dir = TempDir::new().unwrap();
        let ws = ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();

        fs::write(
            ws.records_path(),
            "{\"title\": \"a\"}\nnot json\n{\"title\": \"b\"}\n\n",
        )
        .unwrap();

        let records = ws.read_records().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_read_records_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ws = ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();
        assert!(ws.read_records().unwrap().is_empty());
    }

    #[test]
    fn test_clear_records_idempotent() {
        let dir = TempDir::new().unwrap();
        let ws = ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();
        ws.clear_records().unwrap();
        fs::write(ws.records_path(), "{\"a\":1}\n").unwrap();
        ws.clear_records().unwrap();
        assert!(ws.read_records().unwrap().is_empty());
    }

    #[test]
    fn test_save_logs_per_attempt() {
        let dir = TempDir::new().unwrap();
        let ws = ProjectWorkspace::create(dir.path(), "https://example.com", fields()).unwrap();
        ws.save_logs(3, "out", "err").unwrap();
        assert_eq!(
            fs::read_to_string(ws.root().join("logs/attempt_3/stdout.log")).unwrap(),
            "out"
        );
        assert_eq!(
            fs::read_to_string(ws.root().join("logs/attempt_3/stderr.log")).unwrap(),
            "err"
        );
    }
}
