use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::forms::{DbType, DEFAULT_FOLDER};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    pub db_type: DbType,
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionProfile {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        db_type: DbType,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            folder: DEFAULT_FOLDER.to_string(),
            db_type,
            host: host.into(),
            port,
            database: String::new(),
            username: String::new(),
            password: None,
        }
    }

    #[must_use]
    pub fn display_label(&self) -> String {
        format!("{} ({} - {})", self.name, self.db_type, self.host)
    }
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawPort::Number(port)) => Ok(port),
        Some(RawPort::Text(text)) if text.trim().is_empty() => Ok(0),
        Some(RawPort::Text(text)) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Client-side copy of the saved-connection list. Passwords are never held.
#[derive(Debug, Clone, Default)]
pub struct SavedConnections {
    profiles: Vec<ConnectionProfile>,
    loaded: bool,
    stale: bool,
}

impl SavedConnections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cache with a fresh server listing, keyed by id and
    /// sorted by name.
    pub fn replace_all(&mut self, profiles: Vec<ConnectionProfile>) {
        let mut by_id = BTreeMap::new();
        for (index, mut profile) in profiles.into_iter().enumerate() {
            profile.password = None;
            let key = if profile.id.is_empty() {
                format!("#{index}")
            } else {
                profile.id.clone()
            };
            by_id.insert(key, profile);
        }

        let mut profiles: Vec<_> = by_id.into_values().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        self.profiles = profiles;
        self.loaded = true;
        self.stale = false;
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        !self.loaded || self.stale
    }

    #[must_use]
    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, id: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    #[must_use]
    pub fn filter_by_type(&self, db_type: Option<&DbType>) -> Vec<ConnectionProfile> {
        self.profiles
            .iter()
            .filter(|profile| db_type.map_or(true, |db_type| &profile.db_type == db_type))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionProfile, SavedConnections};
    use crate::forms::DbType;

    #[test]
    fn deserializes_server_shape_with_string_port() {
        let raw = r#"{
            "id": "c1",
            "name": "reporting",
            "dbType": "postgresql",
            "host": "pg.internal",
            "port": "5433",
            "database": "reports",
            "username": "ro"
        }"#;

        let profile: ConnectionProfile = serde_json::from_str(raw).expect("profile should parse");
        assert_eq!(profile.port, 5433);
        assert_eq!(profile.folder, "default");
        assert_eq!(profile.db_type, DbType::Postgresql);
        assert_eq!(profile.display_label(), "reporting (postgresql - pg.internal)");
    }

    #[test]
    fn replace_all_dedupes_sorts_and_strips_passwords() {
        let mut saved = SavedConnections::new();
        assert!(saved.is_stale());

        let mut zed = ConnectionProfile::new("2", "zed", DbType::Mysql, "m", 3306);
        zed.password = Some("pw".to_string());
        let alpha = ConnectionProfile::new("1", "alpha", DbType::Postgresql, "p", 5432);
        let alpha_again = ConnectionProfile::new("1", "alpha-renamed", DbType::Postgresql, "p", 5432);

        saved.replace_all(vec![zed, alpha, alpha_again]);

        let names: Vec<_> = saved.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha-renamed", "zed"]);
        assert!(saved.profiles().iter().all(|p| p.password.is_none()));
        assert!(!saved.is_stale());

        saved.mark_stale();
        assert!(saved.is_stale());
    }

    #[test]
    fn filter_by_type_limits_choices() {
        let mut saved = SavedConnections::new();
        saved.replace_all(vec![
            ConnectionProfile::new("1", "pg", DbType::Postgresql, "p", 5432),
            ConnectionProfile::new("2", "my", DbType::Mysql, "m", 3306),
        ]);

        let mysql = saved.filter_by_type(Some(&DbType::Mysql));
        assert_eq!(mysql.len(), 1);
        assert_eq!(mysql[0].name, "my");
        assert_eq!(saved.filter_by_type(None).len(), 2);
    }
}
