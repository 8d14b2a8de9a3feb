//! Parsers that turn project config files into environments.
//!
//! Every function here is pure: the detector reads the file and hands the
//! content over together with the file name and its path relative to the root.

use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_MYSQL_PORT, MySqlConnectionConfig, ProjectEnvironment};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_USER: &str = "root";

static JDBC_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"jdbc:mysql://([^:/]+):?(\d+)?/([^?]+)").unwrap());
static SPRING_PROFILE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"application-(.+)\.(yml|yaml|properties)").unwrap());
static ENV_SUFFIX_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.env\.(.+)").unwrap());
static DJANGO_ENGINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]ENGINE['"]\s*:\s*['"]([^'"]+)['"]"#).unwrap());
static DJANGO_SETTING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"](NAME|USER|PASSWORD|HOST|PORT)['"]\s*:\s*(?:['"]([^'"]*)['"]|(\d+))"#)
        .unwrap()
});

/// Host, port and database extracted from a JDBC URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdbcTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
}

/// Parse `jdbc:mysql://host[:port]/database[?params]`.
pub fn parse_jdbc_url(url: &str) -> Option<JdbcTarget> {
    let caps = JDBC_URL.captures(url)?;
    let host = caps.get(1)?.as_str().to_string();
    let port = caps
        .get(2)
        .and_then(|p| p.as_str().parse().ok())
        .unwrap_or(DEFAULT_MYSQL_PORT);
    let database = caps.get(3)?.as_str().to_string();
    Some(JdbcTarget {
        host,
        port,
        database,
    })
}

/// Parse `key=value` lines, skipping blanks and `#` comments.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parse a dotenv file. Like [`parse_properties`] but strips one pair of
/// matching surrounding quotes from values.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    parse_properties(content)
        .into_iter()
        .map(|(key, value)| (key, strip_quotes(&value).to_string()))
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Derive the environment name from a config file name.
///
/// `application-dev.yml` gives `dev`, `.env.production` gives `production`,
/// `application.yml` gives `default` and `.env` gives `local`.
pub fn environment_name(path: &str) -> String {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);

    if let Some(caps) = SPRING_PROFILE_FILE.captures(file_name) {
        return caps[1].to_string();
    }
    if let Some(caps) = ENV_SUFFIX_FILE.captures(file_name) {
        return caps[1].to_string();
    }
    match file_name {
        "application.yml" | "application.yaml" | "application.properties" => {
            "default".to_string()
        }
        ".env" => "local".to_string(),
        other => Path::new(other)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(other)
            .to_string(),
    }
}

/// Parse YAML into JSON value trees so every format shares one walker.
///
/// Each `---`-separated document yields one tree; empty documents are skipped.
pub fn parse_yaml(content: &str, source: &str) -> DbResult<Vec<JsonValue>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = JsonValue::deserialize(document)
            .map_err(|e| DbError::detection(source, e.to_string()))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// Profile a YAML document is activated for, if any.
fn spring_profile(document: &JsonValue) -> Option<String> {
    let spring = document.get("spring")?;
    scalar(
        spring
            .pointer("/config/activate/on-profile")
            .or_else(|| spring.get("profiles")),
    )
}

/// Stringify a scalar; empty strings and non-scalars count as absent.
fn scalar(value: Option<&JsonValue>) -> Option<String> {
    let s = match value? {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn first_of<'a>(map: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

fn spring_environment(
    url: Option<&str>,
    user: Option<String>,
    password: Option<String>,
    name: String,
    source: &str,
) -> Option<ProjectEnvironment> {
    let target = parse_jdbc_url(url?)?;
    if target.host.is_empty() {
        return None;
    }
    let config = MySqlConnectionConfig::new(
        target.host,
        target.port,
        user.unwrap_or_else(|| DEFAULT_USER.to_string()),
        password.unwrap_or_default(),
        Some(target.database),
    );
    Some(ProjectEnvironment::detected(
        name.clone(),
        format!("{} (Spring Boot)", name),
        config,
        source,
    ))
}

/// Read `spring.datasource` from an `application*.yml` file.
///
/// A multi-document file yields one environment per document with a
/// datasource, named after the document's profile when it declares one.
pub fn spring_yaml(content: &str, source: &str) -> DbResult<Vec<ProjectEnvironment>> {
    let mut found = Vec::new();
    for document in parse_yaml(content, source)? {
        let Some(ds) = document.get("spring").and_then(|s| s.get("datasource")) else {
            continue;
        };
        let url = scalar(ds.get("url")).or_else(|| scalar(ds.get("jdbc-url")));
        let user = scalar(ds.get("username")).or_else(|| scalar(ds.get("user")));
        let password = scalar(ds.get("password"));
        let name = spring_profile(&document).unwrap_or_else(|| environment_name(source));
        found.extend(spring_environment(url.as_deref(), user, password, name, source));
    }
    Ok(found)
}

/// Read `spring.datasource.*` keys from an `application*.properties` file.
pub fn spring_properties(content: &str, source: &str) -> Vec<ProjectEnvironment> {
    let props = parse_properties(content);
    let url = first_of(
        &props,
        &["spring.datasource.url", "spring.datasource.jdbc-url"],
    );
    let user = first_of(
        &props,
        &["spring.datasource.username", "spring.datasource.user"],
    )
    .map(str::to_string);
    let password = first_of(&props, &["spring.datasource.password"]).map(str::to_string);

    spring_environment(url, user, password, environment_name(source), source)
        .into_iter()
        .collect()
}

/// Read `DB_*` / `MYSQL_*` variables from a dotenv file.
///
/// Nothing is emitted unless a database name is present.
pub fn env_file(content: &str, source: &str) -> Vec<ProjectEnvironment> {
    let vars = parse_env(content);
    let Some(database) = first_of(&vars, &["DB_DATABASE", "MYSQL_DATABASE", "DB_NAME"]) else {
        return Vec::new();
    };

    let host = first_of(&vars, &["DB_HOST", "MYSQL_HOST"]).unwrap_or(DEFAULT_HOST);
    let port = first_of(&vars, &["DB_PORT", "MYSQL_PORT"])
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_MYSQL_PORT);
    let user = first_of(&vars, &["DB_USERNAME", "MYSQL_USER", "DB_USER"]).unwrap_or(DEFAULT_USER);
    let password = first_of(&vars, &["DB_PASSWORD", "MYSQL_PASSWORD"]).unwrap_or_default();

    let name = environment_name(source);
    let config = MySqlConnectionConfig::new(host, port, user, password, Some(database.into()));
    vec![ProjectEnvironment::detected(
        name.clone(),
        format!("{} ({})", name, config.display_target()),
        config,
        source,
    )]
}

/// Parse `config.json` / `config.yml` and collect every object that looks
/// like a database block.
pub fn generic_config(content: &str, source: &str) -> DbResult<Vec<ProjectEnvironment>> {
    let documents = if source.ends_with(".json") {
        vec![serde_json::from_str(content).map_err(|e| DbError::detection(source, e.to_string()))?]
    } else if source.ends_with(".yml") || source.ends_with(".yaml") {
        parse_yaml(content, source)?
    } else {
        return Ok(Vec::new());
    };

    let mut found = Vec::new();
    let mut path = Vec::new();
    for document in &documents {
        find_database_blocks(document, &mut path, &mut found);
    }

    Ok(found
        .into_iter()
        .map(|(name, config)| {
            ProjectEnvironment::detected(
                name.clone(),
                format!("{} ({})", name, source),
                config,
                source,
            )
        })
        .collect())
}

/// Depth-first walk in document order. Matched objects are still descended into.
fn find_database_blocks(
    value: &JsonValue,
    path: &mut Vec<String>,
    found: &mut Vec<(String, MySqlConnectionConfig)>,
) {
    match value {
        JsonValue::Object(map) => {
            let host = scalar(map.get("host"));
            let database = scalar(map.get("database")).or_else(|| scalar(map.get("db")));
            if let (Some(host), Some(database)) = (host, database) {
                let port = scalar(map.get("port"))
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_MYSQL_PORT);
                let user = scalar(map.get("user"))
                    .or_else(|| scalar(map.get("username")))
                    .unwrap_or_else(|| DEFAULT_USER.to_string());
                let password = scalar(map.get("password")).unwrap_or_default();
                let name = if path.is_empty() {
                    "default".to_string()
                } else {
                    path.join(".")
                };
                found.push((
                    name,
                    MySqlConnectionConfig::new(host, port, user, password, Some(database)),
                ));
            }
            for (key, child) in map {
                path.push(key.clone());
                find_database_blocks(child, path, found);
                path.pop();
            }
        }
        JsonValue::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                find_database_blocks(child, path, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Extract a MySQL `DATABASES` entry from a Django settings module.
pub fn django_settings(content: &str, source: &str) -> Vec<ProjectEnvironment> {
    let is_mysql = DJANGO_ENGINE
        .captures_iter(content)
        .any(|caps| caps[1].contains("mysql"));
    if !is_mysql {
        return Vec::new();
    }

    // First literal per key wins
    let mut settings: HashMap<String, String> = HashMap::new();
    for caps in DJANGO_SETTING.captures_iter(content) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        settings.entry(caps[1].to_string()).or_insert(value);
    }

    let Some(database) = first_of(&settings, &["NAME"]) else {
        return Vec::new();
    };
    let host = first_of(&settings, &["HOST"]).unwrap_or(DEFAULT_HOST);
    let port = first_of(&settings, &["PORT"])
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_MYSQL_PORT);
    let user = first_of(&settings, &["USER"]).unwrap_or(DEFAULT_USER);
    let password = first_of(&settings, &["PASSWORD"]).unwrap_or_default();

    let name = environment_name(source);
    vec![ProjectEnvironment::detected(
        name.clone(),
        format!("{} (Django)", name),
        MySqlConnectionConfig::new(host, port, user, password, Some(database.into())),
        source,
    )]
}
