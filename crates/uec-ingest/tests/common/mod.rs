//! Common utilities for consumer integration tests
//!
//! - PostgreSQL container with the schema from `migrations/` applied
//! - Temporary log directories with plain and gzip log files
//! - JSON line builders for both event families
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{LogDir, TestPostgres};
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn test_something() {
//!     let pg = TestPostgres::start().await.unwrap();
//!     let logs = LogDir::new();
//!     logs.write("cn-20230101-000000.log", &[common::cn_line("u1")]);
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};
use uec_ingest::config::{ConsumerConfig, Settings};
use uec_ingest::EventType;

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the consumer schema applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn status_of(&self, filename: &str) -> Result<Option<String>> {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM files WHERE filename = $1")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }
}

// ============================================================================
// Log file fixtures
// ============================================================================

/// Temporary directory holding log files for one test
pub struct LogDir {
    dir: TempDir,
}

impl LogDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, lines: &[String]) {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(self.dir.path().join(name), content).expect("Failed to write log file");
    }

    pub fn write_gz(&self, name: &str, lines: &[String]) {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for line in lines {
            writeln!(encoder, "{}", line).expect("Failed to compress line");
        }
        let bytes = encoder.finish().expect("Failed to finish gzip stream");
        std::fs::write(self.dir.path().join(name), bytes).expect("Failed to write log file");
    }

    pub fn write_raw(&self, name: &str, bytes: &[u8]) {
        std::fs::write(self.dir.path().join(name), bytes).expect("Failed to write log file");
    }

    pub fn config(&self, event_type: EventType, lp_max_batch: usize) -> ConsumerConfig {
        let yaml = format!(
            r#"
centralnotice:
  directory: "{dir}"
  file_glob: "cn-*.log*"
  extract_sample_rate_regex: '-sampled(\d+)'
  detail_languages: [en, de]
  detail_projects_regex: '.*wiki$'
landingpage:
  directory: "{dir}"
  file_glob: "lp-*.log*"
  lp_max_batch: {lp_max_batch}
"#,
            dir = self.dir.path().display(),
            lp_max_batch = lp_max_batch,
        );

        Settings::from_yaml_str(&yaml)
            .and_then(|s| s.consumer_config(event_type))
            .expect("Failed to build consumer config")
    }
}

/// A shown, non-bot CentralNotice impression
pub fn cn_line(uuid: &str) -> String {
    json!({
        "uuid": uuid,
        "dt": "2023-01-01T10:15:00Z",
        "wiki": "enwiki",
        "userAgent": {"is_bot": false},
        "event": {
            "statusCode": "6",
            "uselang": "en",
            "db": "enwiki",
            "banner": "B2223_en6C_dsk",
            "campaign": "C2223_en6C",
            "country": "US",
        },
    })
    .to_string()
}

/// A CentralNotice impression from a bot
pub fn cn_bot_line(uuid: &str) -> String {
    cn_line(uuid).replace(r#""is_bot":false"#, r#""is_bot":true"#)
}

/// A donatewiki landing page view
pub fn lp_line(uuid: &str, utm_source: &str, second: u32, contact_id: &str) -> String {
    json!({
        "uuid": uuid,
        "dt": format!("2023-01-01T10:15:{:02}Z", second),
        "wiki": "donatewiki",
        "userAgent": {"is_bot": false},
        "event": {
            "landingpage": "Special:LandingPage",
            "template": "Lp-layout-default",
            "appeal": "Appeal-JimmyQuote",
            "utm_source": utm_source,
            "utm_campaign": "C2223_en6C",
            "utm_medium": "sitenotice",
            "contact_id": contact_id,
            "country": "DE",
            "language": "de",
        },
    })
    .to_string()
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,uec_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
