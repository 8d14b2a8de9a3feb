//! Project and environment models produced by the detector.

use crate::models::MySqlConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of project found at the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    SpringBoot,
    NodeJs,
    Laravel,
    Django,
    Generic,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpringBoot => "spring-boot",
            Self::NodeJs => "node-js",
            Self::Laravel => "laravel",
            Self::Django => "django",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an environment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    Detected,
    Manual,
}

impl EnvironmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Detected => "auto-detected",
            Self::Manual => "manual",
        }
    }
}

/// A named set of connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEnvironment {
    /// Lookup key, e.g. `dev`, `local`, `default`
    pub name: String,
    pub display_name: String,
    pub config: MySqlConnectionConfig,
    /// Relative config path, or `manual`
    pub source: String,
    pub kind: EnvironmentKind,
}

impl ProjectEnvironment {
    /// Environment detected from a project config file.
    pub fn detected(
        name: impl Into<String>,
        display_name: impl Into<String>,
        config: MySqlConnectionConfig,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            config,
            source: source.into(),
            kind: EnvironmentKind::Detected,
        }
    }

    /// Environment for a connection opened with explicit parameters.
    pub fn manual(name: Option<String>, config: MySqlConnectionConfig) -> Self {
        Self {
            name: name.unwrap_or_else(|| "manual".to_string()),
            display_name: format!("manual ({})", config.display_target()),
            config,
            source: "manual".to_string(),
            kind: EnvironmentKind::Manual,
        }
    }
}

/// Result of scanning a project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_type: ProjectType,
    pub root_path: PathBuf,
    pub environments: Vec<ProjectEnvironment>,
    /// Relative to `root_path`
    pub config_files: Vec<String>,
}

impl ProjectInfo {
    pub fn find_environment(&self, name: &str) -> Option<&ProjectEnvironment> {
        self.environments.iter().find(|env| env.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_names() {
        assert_eq!(ProjectType::SpringBoot.to_string(), "spring-boot");
        assert_eq!(ProjectType::NodeJs.to_string(), "node-js");
        assert_eq!(
            serde_json::to_string(&ProjectType::Laravel).unwrap(),
            "\"laravel\""
        );
    }

    #[test]
    fn test_manual_environment_defaults() {
        let config = MySqlConnectionConfig::new("localhost", 3306, "root", "", Some("app".into()));
        let env = ProjectEnvironment::manual(None, config);
        assert_eq!(env.name, "manual");
        assert_eq!(env.display_name, "manual (localhost:3306/app)");
        assert_eq!(env.source, "manual");
        assert_eq!(env.kind, EnvironmentKind::Manual);
    }

    #[test]
    fn test_find_environment() {
        let config = MySqlConnectionConfig::new("localhost", 3306, "root", "", None);
        let info = ProjectInfo {
            project_type: ProjectType::Generic,
            root_path: PathBuf::from("/tmp/project"),
            environments: vec![ProjectEnvironment::detected(
                "dev",
                "dev (config.json)",
                config,
                "config.json",
            )],
            config_files: vec!["config.json".into()],
        };
        assert!(info.find_environment("dev").is_some());
        assert!(info.find_environment("prod").is_none());
    }
}
