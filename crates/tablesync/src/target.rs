//! Where a migration runs.

use tokio_postgres::{Client, Config, NoTls};

use crate::{Error, Result};

/// Environment variable [`ConnectionTarget::from_env`] reads.
pub const DATABASE_URL: &str = "DATABASE_URL";

/// A parsed connection string that names a database.
///
/// Accepts both libpq key/value strings (`host=localhost dbname=app`) and
/// URLs (`postgres://user@localhost/app`).
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    config: Config,
    catalog: String,
}

impl ConnectionTarget {
    /// Parse a connection string.
    ///
    /// ```
    /// use tablesync::ConnectionTarget;
    ///
    /// let target = ConnectionTarget::parse("postgres://app@localhost:5432/orders").unwrap();
    /// assert_eq!(target.catalog_name(), "orders");
    ///
    /// assert!(ConnectionTarget::parse("host=localhost").is_err());
    /// ```
    pub fn parse(connection_string: &str) -> Result<Self> {
        if connection_string.trim().is_empty() {
            return Err(Error::MissingConnectionTarget);
        }

        let config: Config = connection_string
            .parse()
            .map_err(|e: tokio_postgres::Error| Error::InvalidConnectionTarget(e.to_string()))?;

        let catalog = match config.get_dbname() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(Error::MissingCatalogName),
        };

        Ok(Self { config, catalog })
    }

    /// Read the target from `DATABASE_URL`, loading a `.env` file first if
    /// there is one.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let url = std::env::var(DATABASE_URL).map_err(|_| Error::MissingConnectionTarget)?;
        Self::parse(&url)
    }

    /// The database migrations run against.
    pub fn catalog_name(&self) -> &str {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Same server and credentials, pointed at `database` instead.
    pub fn with_database(&self, database: &str) -> Config {
        let mut config = self.config.clone();
        config.dbname(database);
        config
    }

    /// Open a session on the target database.
    pub async fn connect(&self) -> Result<Client> {
        connect(&self.config).await
    }
}

/// Connect and drive the connection on a background task.
pub(crate) async fn connect(config: &Config) -> Result<Client> {
    let (client, connection) = config.connect(NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "database connection error");
        }
    });

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_key_value() {
        let target =
            ConnectionTarget::parse("host=localhost user=postgres dbname=dmm_test").unwrap();
        assert_eq!(target.catalog_name(), "dmm_test");
        assert_eq!(target.config().get_user(), Some("postgres"));
    }

    #[test]
    fn test_parse_url() {
        let target = ConnectionTarget::parse("postgres://postgres:secret@db:5433/shop").unwrap();
        assert_eq!(target.catalog_name(), "shop");
        assert_eq!(target.config().get_ports(), &[5433]);
    }

    #[test]
    fn test_blank_is_missing() {
        for input in ["", "   ", "\n"] {
            assert!(matches!(
                ConnectionTarget::parse(input),
                Err(Error::MissingConnectionTarget)
            ));
        }
    }

    #[test]
    fn test_unparsable() {
        let err = ConnectionTarget::parse("host=localhost port=notaport dbname=x").unwrap_err();
        assert!(matches!(err, Error::InvalidConnectionTarget(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_missing_catalog() {
        assert!(matches!(
            ConnectionTarget::parse("host=localhost user=postgres"),
            Err(Error::MissingCatalogName)
        ));
        assert!(matches!(
            ConnectionTarget::parse("postgres://localhost"),
            Err(Error::MissingCatalogName)
        ));
    }

    // The only test in this crate that touches the process environment.
    #[test]
    fn test_from_env() {
        let url = "postgres://postgres@localhost:5432/from_env_test";
        // SAFETY: no other test reads or writes DATABASE_URL.
        unsafe { std::env::set_var(DATABASE_URL, url) };
        let target = ConnectionTarget::from_env();
        unsafe { std::env::remove_var(DATABASE_URL) };

        assert_eq!(target.unwrap().catalog_name(), "from_env_test");
        assert!(matches!(
            ConnectionTarget::from_env(),
            Err(Error::MissingConnectionTarget)
        ));
    }

    #[test]
    fn test_with_database() {
        let target = ConnectionTarget::parse("host=localhost dbname=app").unwrap();
        let admin = target.with_database("postgres");
        assert_eq!(admin.get_dbname(), Some("postgres"));
        assert_eq!(target.catalog_name(), "app");
    }
}
