// dqcheck-core/src/domain/source.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Csv {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delimiter: Option<char>,
        #[serde(default = "default_true")]
        has_header: bool,
    },
    Excel {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet: Option<String>,
    },
    Database {
        connection: DatabaseConnection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        table: String,
    },
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::Csv {
            path: path.into(),
            delimiter: None,
            has_header: true,
        }
    }

    /// Lines above the first data row, as a spreadsheet user would count them.
    /// Excel sheets are read with a header; database rows keep the same
    /// numbering so exports line up.
    pub fn header_rows(&self) -> u64 {
        match self {
            Self::Csv { has_header, .. } => u64::from(*has_header),
            Self::Excel { .. } | Self::Database { .. } => 1,
        }
    }

    /// Short label for logs and run records. Never includes credentials.
    pub fn label(&self) -> String {
        match self {
            Self::Csv { path, .. } => format!("csv:{}", path.display()),
            Self::Excel { path, sheet } => match sheet {
                Some(s) => format!("excel:{}#{}", path.display(), s),
                None => format!("excel:{}", path.display()),
            },
            Self::Database {
                connection,
                schema,
                table,
            } => {
                let target = connection
                    .database
                    .clone()
                    .or_else(|| connection.path.as_ref().map(|p| p.display().to_string()))
                    .unwrap_or_default();
                match schema {
                    Some(s) => format!("{}:{}/{}.{}", connection.engine, target, s, table),
                    None => format!("{}:{}/{}", connection.engine, target, table),
                }
            }
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[serde(alias = "duck")]
    DuckDb,
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DuckDb => "duckdb",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        };
        f.write_str(name)
    }
}

/// File engines use `path`; server engines use host/port/database/user/password.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub engine: DatabaseEngine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("engine", &self.engine)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
