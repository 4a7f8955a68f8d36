use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection_manager::{ConnectRequest, SaveConnectionRequest};
use crate::profiles::ConnectionProfile;

pub const FIELD_DB_TYPE: &str = "dbType";
pub const FIELD_HOST: &str = "host";
pub const FIELD_PORT: &str = "port";
pub const FIELD_DATABASE: &str = "database";
pub const FIELD_USERNAME: &str = "username";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_NAME: &str = "connectionName";
pub const FIELD_FOLDER: &str = "folder";

pub const CONNECTION_FIELDS: [&str; 8] = [
    FIELD_DB_TYPE,
    FIELD_HOST,
    FIELD_PORT,
    FIELD_DATABASE,
    FIELD_USERNAME,
    FIELD_PASSWORD,
    FIELD_NAME,
    FIELD_FOLDER,
];

pub const DEFAULT_FOLDER: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DbType {
    Postgresql,
    Mysql,
    Sqlserver,
    Oracle,
    Custom(String),
}

impl DbType {
    #[must_use]
    pub fn builtin() -> [Self; 4] {
        [Self::Postgresql, Self::Mysql, Self::Sqlserver, Self::Oracle]
    }

    /// Empty input means "nothing selected".
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self::from(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
            Self::Custom(name) => name,
        }
    }

    #[must_use]
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgresql => Some(5432),
            Self::Mysql => Some(3306),
            Self::Sqlserver => Some(1433),
            Self::Oracle => Some(1521),
            Self::Custom(_) => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Postgresql => "PostgreSQL",
            Self::Mysql => "MySQL",
            Self::Sqlserver => "SQL Server",
            Self::Oracle => "Oracle",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for DbType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Self::Postgresql,
            "mysql" => Self::Mysql,
            "sqlserver" => Self::Sqlserver,
            "oracle" => Self::Oracle,
            _ => Self::Custom(value),
        }
    }
}

impl From<DbType> for String {
    fn from(value: DbType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw named input values, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    values: BTreeMap<String, String>,
}

impl FormFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Missing fields read as empty.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn clear(&mut self, name: &str) {
        self.values.remove(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please fill in all required fields ({})", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Port must be a number between 1 and 65535, got `{0}`")]
    InvalidPort(String),
    #[error("Please enter a connection name")]
    MissingName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionForm {
    pub db_type: String,
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub name: String,
    pub folder: String,
}

impl ConnectionForm {
    /// Reads the connection form. Everything but the password is trimmed.
    #[must_use]
    pub fn from_fields(fields: &FormFields) -> Self {
        let trimmed = |name: &str| fields.get(name).trim().to_string();
        Self {
            db_type: trimmed(FIELD_DB_TYPE),
            host: trimmed(FIELD_HOST),
            port: trimmed(FIELD_PORT),
            database: trimmed(FIELD_DATABASE),
            username: trimmed(FIELD_USERNAME),
            password: fields.get(FIELD_PASSWORD).to_string(),
            name: trimmed(FIELD_NAME),
            folder: trimmed(FIELD_FOLDER),
        }
    }

    pub fn apply_to(&self, fields: &mut FormFields) {
        fields.set(FIELD_DB_TYPE, self.db_type.clone());
        fields.set(FIELD_HOST, self.host.clone());
        fields.set(FIELD_PORT, self.port.clone());
        fields.set(FIELD_DATABASE, self.database.clone());
        fields.set(FIELD_USERNAME, self.username.clone());
        fields.set(FIELD_PASSWORD, self.password.clone());
        fields.set(FIELD_NAME, self.name.clone());
        fields.set(FIELD_FOLDER, self.folder.clone());
    }

    /// Populates from a saved profile. The password always comes back blank.
    #[must_use]
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        Self {
            db_type: profile.db_type.to_string(),
            host: profile.host.clone(),
            port: if profile.port == 0 {
                String::new()
            } else {
                profile.port.to_string()
            },
            database: profile.database.clone(),
            username: profile.username.clone(),
            password: String::new(),
            name: profile.name.clone(),
            folder: profile.folder.clone(),
        }
    }

    #[must_use]
    pub fn db_type(&self) -> Option<DbType> {
        DbType::parse(&self.db_type)
    }

    /// Fields a connect attempt cannot proceed without.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            (FIELD_HOST, &self.host),
            (FIELD_PORT, &self.port),
            (FIELD_DATABASE, &self.database),
            (FIELD_USERNAME, &self.username),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn to_connect_request(&self) -> Result<ConnectRequest, FormError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(FormError::MissingFields(missing));
        }

        Ok(ConnectRequest {
            db_type: self.db_type.clone(),
            host: self.host.clone(),
            port: parse_port(&self.port)?,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    pub fn to_save_request(&self) -> Result<SaveConnectionRequest, FormError> {
        if self.name.is_empty() {
            return Err(FormError::MissingName);
        }

        let port = if self.port.is_empty() {
            None
        } else {
            Some(parse_port(&self.port)?)
        };

        Ok(SaveConnectionRequest {
            name: self.name.clone(),
            folder: if self.folder.is_empty() {
                DEFAULT_FOLDER.to_string()
            } else {
                self.folder.clone()
            },
            db_type: self.db_type.clone(),
            host: self.host.clone(),
            port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, FormError> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(FormError::InvalidPort(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConnectionForm, DbType, FormError, FormFields, DEFAULT_FOLDER, FIELD_DATABASE,
        FIELD_DB_TYPE, FIELD_HOST, FIELD_NAME, FIELD_PASSWORD, FIELD_PORT, FIELD_USERNAME,
    };
    use crate::profiles::ConnectionProfile;

    fn postgres_fields() -> FormFields {
        FormFields::new()
            .with(FIELD_DB_TYPE, "postgresql")
            .with(FIELD_HOST, " db.local ")
            .with(FIELD_PORT, "5432")
            .with(FIELD_DATABASE, "app")
            .with(FIELD_USERNAME, "admin")
            .with(FIELD_PASSWORD, " secret ")
    }

    #[test]
    fn builtin_types_map_to_default_ports() {
        assert_eq!(DbType::Postgresql.default_port(), Some(5432));
        assert_eq!(DbType::Mysql.default_port(), Some(3306));
        assert_eq!(DbType::Sqlserver.default_port(), Some(1433));
        assert_eq!(DbType::Oracle.default_port(), Some(1521));
        assert_eq!(DbType::Custom("h2".to_string()).default_port(), None);
        assert_eq!(DbType::parse(""), None);
        assert_eq!(DbType::parse("MySQL"), Some(DbType::Mysql));
    }

    #[test]
    fn form_trims_everything_but_password() {
        let form = ConnectionForm::from_fields(&postgres_fields());

        assert_eq!(form.host, "db.local");
        assert_eq!(form.password, " secret ");
        assert_eq!(form.db_type(), Some(DbType::Postgresql));
    }

    #[test]
    fn connect_request_requires_core_fields() {
        let fields = postgres_fields().with(FIELD_HOST, "").with(FIELD_USERNAME, "  ");
        let error = ConnectionForm::from_fields(&fields)
            .to_connect_request()
            .expect_err("missing fields should fail");

        assert_eq!(error, FormError::MissingFields(vec!["host", "username"]));
        assert!(error.to_string().starts_with("Please fill in all required fields"));
    }

    #[test]
    fn connect_request_rejects_bad_port() {
        let fields = postgres_fields().with(FIELD_PORT, "70000");
        let error = ConnectionForm::from_fields(&fields)
            .to_connect_request()
            .expect_err("port out of range should fail");

        assert_eq!(error, FormError::InvalidPort("70000".to_string()));
    }

    #[test]
    fn save_request_requires_name_and_defaults_folder() {
        let form = ConnectionForm::from_fields(&postgres_fields());
        assert_eq!(form.to_save_request(), Err(FormError::MissingName));

        let form = ConnectionForm::from_fields(&postgres_fields().with(FIELD_NAME, "prod"));
        let request = form.to_save_request().expect("named form should save");
        assert_eq!(request.folder, DEFAULT_FOLDER);
        assert_eq!(request.port, Some(5432));
    }

    #[test]
    fn profile_population_blanks_password() {
        let mut profile =
            ConnectionProfile::new("p1", "prod", DbType::Mysql, "10.0.0.5", 3306);
        profile.password = Some("leaked".to_string());

        let form = ConnectionForm::from_profile(&profile);
        let mut fields = FormFields::new().with(FIELD_PASSWORD, "typed");
        form.apply_to(&mut fields);

        assert_eq!(fields.get(FIELD_PASSWORD), "");
        assert_eq!(fields.get(FIELD_DB_TYPE), "mysql");
        assert_eq!(fields.get(FIELD_PORT), "3306");
    }
}
