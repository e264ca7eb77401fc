use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Id of the signed-in student or counselor, if any.
    pub current_user: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres instance")?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);
        let current_user = std::env::var("WELLNESS_USER")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self {
            database_url,
            max_connections,
            current_user,
        })
    }

    /// A `--as` flag on the command line wins over `WELLNESS_USER`.
    pub fn with_user_override(mut self, user: Option<String>) -> Self {
        if let Some(user) = user.filter(|u| !u.trim().is_empty()) {
            self.current_user = Some(user.trim().to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(user: Option<&str>) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/wellness".into(),
            max_connections: 5,
            current_user: user.map(str::to_string),
        }
    }

    #[test]
    fn command_line_user_overrides_environment() {
        let cfg = config(Some("s-env")).with_user_override(Some("c-cli".into()));
        assert_eq!(cfg.current_user.as_deref(), Some("c-cli"));
    }

    #[test]
    fn blank_override_keeps_environment_user() {
        let cfg = config(Some("s-env")).with_user_override(Some("  ".into()));
        assert_eq!(cfg.current_user.as_deref(), Some("s-env"));
        let cfg = config(None).with_user_override(None);
        assert!(cfg.current_user.is_none());
    }
}
