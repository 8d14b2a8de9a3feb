//! Project environment detection.
//!
//! Scans a project directory, classifies it (Spring Boot, Node.js, Laravel,
//! Django or generic) and extracts MySQL connection parameters from the
//! config files that project type conventionally uses.

pub mod parsers;

use crate::error::{DbError, DbResult};
use crate::models::{ProjectEnvironment, ProjectInfo, ProjectType};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SPRING_RESOURCES: &str = "src/main/resources";
const DJANGO_MAX_DEPTH: usize = 4;
const DJANGO_SKIP_DIRS: &[&str] = &["node_modules", "venv", ".venv", "__pycache__"];

const NODE_ENV_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.development",
    ".env.test",
    ".env.production",
];
const LARAVEL_FILES: &[&str] = &[".env", "config/database.php"];
const GENERIC_FILES: &[&str] = &[".env", "config.json", "config.yml", "config.yaml"];

/// Detects the project type and database environments under a root directory.
#[derive(Debug, Clone)]
pub struct ProjectDetector {
    root: PathBuf,
}

impl ProjectDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run the full detection: project type, config files, then environments.
    pub async fn detect(&self) -> DbResult<ProjectInfo> {
        if !is_dir(&self.root).await {
            return Err(DbError::detection(
                self.root.display().to_string(),
                "directory does not exist",
            ));
        }

        let project_type = self.detect_project_type().await;
        let config_files = self.find_config_files(project_type).await;
        let environments = self.parse_environments(project_type, &config_files).await;

        info!(
            root = %self.root.display(),
            project_type = %project_type,
            config_files = config_files.len(),
            environments = environments.len(),
            "Project detection finished"
        );

        Ok(ProjectInfo {
            project_type,
            root_path: self.root.clone(),
            environments,
            config_files,
        })
    }

    /// Classify the project. First match wins.
    pub async fn detect_project_type(&self) -> ProjectType {
        let has_build_file = self.exists("pom.xml").await || self.exists("build.gradle").await;
        let has_spring_config = self
            .exists(&format!("{}/application.yml", SPRING_RESOURCES))
            .await
            || self
                .exists(&format!("{}/application.yaml", SPRING_RESOURCES))
                .await;

        if has_build_file && has_spring_config {
            ProjectType::SpringBoot
        } else if self.exists("package.json").await {
            ProjectType::NodeJs
        } else if self.exists("artisan").await && self.exists("composer.json").await {
            ProjectType::Laravel
        } else if self.exists("manage.py").await || self.exists("settings.py").await {
            ProjectType::Django
        } else {
            ProjectType::Generic
        }
    }

    /// Config files for a project type, as paths relative to the root.
    pub async fn find_config_files(&self, project_type: ProjectType) -> Vec<String> {
        match project_type {
            ProjectType::SpringBoot => self.spring_config_files().await,
            ProjectType::NodeJs => self.existing(NODE_ENV_FILES).await,
            ProjectType::Laravel => self.existing(LARAVEL_FILES).await,
            ProjectType::Django => self.django_settings_files().await,
            ProjectType::Generic => self.existing(GENERIC_FILES).await,
        }
    }

    async fn parse_environments(
        &self,
        project_type: ProjectType,
        config_files: &[String],
    ) -> Vec<ProjectEnvironment> {
        let mut environments = Vec::new();
        for file in config_files {
            let path = self.root.join(file);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file, error = %e, "Failed to read config file");
                    continue;
                }
            };

            match parse_config_file(project_type, file, &content) {
                Ok(found) => {
                    debug!(file = %file, count = found.len(), "Parsed config file");
                    environments.extend(found);
                }
                Err(e) => warn!(file = %file, error = %e, "Failed to parse config file"),
            }
        }
        unique_names(environments)
    }

    async fn spring_config_files(&self) -> Vec<String> {
        let mut files = self
            .existing(&[
                "src/main/resources/application.yml",
                "src/main/resources/application.yaml",
                "src/main/resources/application.properties",
            ])
            .await;

        let mut dir = match tokio::fs::read_dir(self.root.join(SPRING_RESOURCES)).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "Failed to list Spring resources directory");
                return files;
            }
        };

        let mut profile_files = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    if let Some(name) = entry.file_name().to_str() {
                        if name.starts_with("application-") {
                            profile_files.push(name.to_string());
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read Spring resources entry");
                    break;
                }
            }
        }

        for suffix in [".yml", ".yaml", ".properties"] {
            let mut group: Vec<&String> = profile_files
                .iter()
                .filter(|name| name.ends_with(suffix))
                .collect();
            group.sort();
            files.extend(
                group
                    .into_iter()
                    .map(|name| format!("{}/{}", SPRING_RESOURCES, name)),
            );
        }
        files
    }

    /// Keep the candidates that exist, in the given order.
    async fn existing(&self, candidates: &[&str]) -> Vec<String> {
        let mut found = Vec::new();
        for candidate in candidates {
            if self.exists(candidate).await {
                found.push((*candidate).to_string());
            }
        }
        found
    }

    async fn django_settings_files(&self) -> Vec<String> {
        let root = self.root.clone();
        let walk = tokio::task::spawn_blocking(move || find_django_settings(&root)).await;
        match walk {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Django settings search failed");
                Vec::new()
            }
        }
    }

    async fn exists(&self, relative: &str) -> bool {
        tokio::fs::try_exists(self.root.join(relative))
            .await
            .unwrap_or(false)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Dispatch a file to the parser for its project type and extension.
fn parse_config_file(
    project_type: ProjectType,
    file: &str,
    content: &str,
) -> DbResult<Vec<ProjectEnvironment>> {
    match project_type {
        ProjectType::SpringBoot if file.ends_with(".properties") => {
            Ok(parsers::spring_properties(content, file))
        }
        ProjectType::SpringBoot => parsers::spring_yaml(content, file),
        ProjectType::NodeJs | ProjectType::Laravel if is_env_file(file) => {
            Ok(parsers::env_file(content, file))
        }
        // config/database.php is listed but carries no literal values
        ProjectType::NodeJs | ProjectType::Laravel => Ok(Vec::new()),
        ProjectType::Django => Ok(parsers::django_settings(content, file)),
        ProjectType::Generic if is_env_file(file) => Ok(parsers::env_file(content, file)),
        ProjectType::Generic => parsers::generic_config(content, file),
    }
}

fn is_env_file(file: &str) -> bool {
    Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name == ".env" || name.starts_with(".env."))
}

/// Bounded walk for `settings*.py`, skipping hidden and virtualenv directories.
fn find_django_settings(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .max_depth(DJANGO_MAX_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !DJANGO_SKIP_DIRS.contains(&&*name)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("settings") && name.ends_with(".py")
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Rename environments whose name is already taken to `name-2`, `name-3`, ...
///
/// Lookups go by name, so every environment needs its own.
fn unique_names(environments: Vec<ProjectEnvironment>) -> Vec<ProjectEnvironment> {
    let mut taken = HashSet::new();
    environments
        .into_iter()
        .map(|mut env| {
            if !taken.contains(&env.name) {
                taken.insert(env.name.clone());
                return env;
            }
            let mut n = 2;
            let renamed = loop {
                let candidate = format!("{}-{}", env.name, n);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                n += 1;
            };
            warn!(
                name = %env.name,
                renamed = %renamed,
                source = %env.source,
                "Duplicate environment name"
            );
            if let Some(rest) = env.display_name.strip_prefix(env.name.as_str()) {
                env.display_name = format!("{}{}", renamed, rest);
            }
            taken.insert(renamed.clone());
            env.name = renamed;
            env
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, content: &str) {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_generic_when_empty() {
        let dir = TempDir::new().unwrap();
        let info = ProjectDetector::new(dir.path()).detect().await.unwrap();
        assert_eq!(info.project_type, ProjectType::Generic);
        assert!(info.environments.is_empty());
        assert!(info.config_files.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_environment_names_are_suffixed() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pom.xml", "<project/>");
        write(
            &dir,
            "src/main/resources/application.yml",
            "spring:\n  datasource:\n    url: jdbc:mysql://yml-db/shop\n",
        );
        write(
            &dir,
            "src/main/resources/application.properties",
            "spring.datasource.url=jdbc:mysql://props-db/shop\n",
        );

        let info = ProjectDetector::new(dir.path()).detect().await.unwrap();
        let names: Vec<&str> = info.environments.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["default", "default-2"]);
        let second = info.find_environment("default-2").unwrap();
        assert_eq!(second.config.host, "props-db");
        assert_eq!(second.display_name, "default-2 (Spring Boot)");
    }

    #[test]
    fn test_unique_names_skips_taken_suffix() {
        let env = |name: &str| {
            ProjectEnvironment::detected(
                name,
                format!("{} (test)", name),
                crate::models::MySqlConnectionConfig::new("h", 3306, "u", "", None),
                "x",
            )
        };
        let renamed = unique_names(vec![env("a"), env("a-2"), env("a")]);
        let names: Vec<&str> = renamed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a-2", "a-3"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let detector = ProjectDetector::new(dir.path().join("missing"));
        assert!(matches!(
            detector.detect().await,
            Err(DbError::Detection { .. })
        ));
    }

    #[tokio::test]
    async fn test_project_type_precedence() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pom.xml", "<project/>");
        write(&dir, "package.json", "{}");
        let detector = ProjectDetector::new(dir.path());
        // pom.xml alone is not enough for Spring Boot
        assert_eq!(detector.detect_project_type().await, ProjectType::NodeJs);

        write(&dir, "src/main/resources/application.yml", "");
        assert_eq!(
            detector.detect_project_type().await,
            ProjectType::SpringBoot
        );
    }

    #[tokio::test]
    async fn test_laravel_needs_artisan_and_composer() {
        let dir = TempDir::new().unwrap();
        write(&dir, "artisan", "");
        let detector = ProjectDetector::new(dir.path());
        assert_eq!(detector.detect_project_type().await, ProjectType::Generic);
        write(&dir, "composer.json", "{}");
        assert_eq!(detector.detect_project_type().await, ProjectType::Laravel);
    }

    #[tokio::test]
    async fn test_spring_config_file_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "build.gradle", "");
        for name in [
            "application.yml",
            "application.properties",
            "application-test.properties",
            "application-prod.yml",
            "application-dev.yml",
            "application-qa.yaml",
            "logback.xml",
        ] {
            write(&dir, &format!("src/main/resources/{}", name), "");
        }
        let detector = ProjectDetector::new(dir.path());
        let files = detector.find_config_files(ProjectType::SpringBoot).await;
        let names: Vec<_> = files
            .iter()
            .map(|f| f.trim_start_matches("src/main/resources/"))
            .collect();
        assert_eq!(
            names,
            vec![
                "application.yml",
                "application.properties",
                "application-dev.yml",
                "application-prod.yml",
                "application-qa.yaml",
                "application-test.properties",
            ]
        );
    }

    #[tokio::test]
    async fn test_node_env_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", "{}");
        write(&dir, ".env", "DB_DATABASE=app\n");
        write(
            &dir,
            ".env.production",
            "DB_HOST=prod-db\nDB_DATABASE=app\nDB_PASSWORD=x\n",
        );
        write(&dir, ".env.test", "DB_HOST=localhost\n");

        let info = ProjectDetector::new(dir.path()).detect().await.unwrap();
        assert_eq!(info.project_type, ProjectType::NodeJs);
        assert_eq!(info.config_files, vec![".env", ".env.test", ".env.production"]);
        let names: Vec<_> = info.environments.iter().map(|e| e.name.as_str()).collect();
        // .env.test has no database
        assert_eq!(names, vec!["local", "production"]);
        assert_eq!(info.environments[1].config.host, "prod-db");
        assert_eq!(info.environments[1].source, ".env.production");
    }

    #[tokio::test]
    async fn test_bad_file_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        write(&dir, "config.yml", "database: [unclosed");
        write(
            &dir,
            "config.json",
            r#"{"mysql": {"host": "db", "database": "main"}}"#,
        );
        let info = ProjectDetector::new(dir.path()).detect().await.unwrap();
        assert_eq!(info.environments.len(), 1);
        assert_eq!(info.environments[0].name, "mysql");
    }

    #[test]
    fn test_find_django_settings_skips_ignored_dirs() {
        let dir = TempDir::new().unwrap();
        write(&dir, "manage.py", "");
        write(&dir, "mysite/settings.py", "");
        write(&dir, "mysite/settings_prod.py", "");
        write(&dir, "venv/lib/settings.py", "");
        write(&dir, ".hidden/settings.py", "");
        write(&dir, "a/b/c/d/e/settings.py", "");

        let files = find_django_settings(dir.path());
        assert_eq!(files, vec!["mysite/settings.py", "mysite/settings_prod.py"]);
    }

    #[test]
    fn test_is_env_file() {
        assert!(is_env_file(".env"));
        assert!(is_env_file(".env.local"));
        assert!(!is_env_file("config/database.php"));
        assert!(!is_env_file("config.json"));
    }
}
