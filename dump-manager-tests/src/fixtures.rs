//! Test fixtures and sample data
//!
//! Provides pre-built dumps, stored objects and config templates.

use chrono::NaiveDate;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// A plausible mysqldump output with `rows` insert statements
pub fn mysql_dump(rows: usize) -> Vec<u8> {
    let mut dump = String::from(
        "-- MySQL dump 10.13  Distrib 8.0.36, for Linux (x86_64)\n\
         --\n\
         -- Host: localhost    Database: wordpress\n\
         -- ------------------------------------------------------\n",
    );
    for i in 0..rows {
        dump.push_str(&format!(
            "INSERT INTO `wp_posts` VALUES ({},'Post {}','publish','2025-01-{:02}');\n",
            i,
            i,
            i % 28 + 1
        ));
    }
    dump.push_str("-- Dump completed on 2025-01-20  2:00:01\n");
    dump.into_bytes()
}

/// A plausible pg_dump output with `rows` insert statements
pub fn postgres_dump(rows: usize) -> Vec<u8> {
    let mut dump = String::from(
        "--\n\
         -- PostgreSQL database dump\n\
         --\n\n\
         SET statement_timeout = 0;\n",
    );
    for i in 0..rows {
        dump.push_str(&format!(
            "INSERT INTO public.orders VALUES ({}, 'order-{}', {});\n",
            i,
            i,
            i * 17
        ));
    }
    dump.push_str("--\n-- PostgreSQL database dump complete\n--\n");
    dump.into_bytes()
}

/// Output of a dump that failed after writing only its error
pub fn tiny_dump() -> Vec<u8> {
    b"mysqldump: Got error: 1045: Access denied\n"[..40].to_vec()
}

/// Gzip `data` as the pipeline would store it
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("Failed to compress fixture");
    encoder.finish().expect("Failed to finish fixture")
}

/// Parse a `YYYY-MM-DD` date
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("Invalid fixture date")
}

/// Keys of the reference retention scenario, evaluated on 2025-01-20
///
/// Returns `(key, kept)` pairs.
pub fn retention_scenario_keys(site: &str) -> Vec<(String, bool)> {
    vec![
        (format!("backups/2025/01/13/{}.sql.gz", site), true),
        (format!("backups/2025/01/05/{}.sql.gz", site), true),
        (format!("backups/2024/12/01/{}.sql.gz", site), true),
        (format!("backups/2024/11/10/{}.sql.gz", site), false),
    ]
}

/// Minimal valid config TOML template
///
/// Placeholders: `{work_dir}`, `{log_dir}`, `{store_root}`.
pub fn minimal_config_toml() -> &'static str {
    r#"
[global]
work_dir = "{work_dir}"
log_directory = "{log_dir}"

[storage]
type = "local"
root = "{store_root}"

[[sites]]
name = "blog"
container = "blog-db"
bucket = "acme-backups"
"#
}

/// Config with several sites, one disabled
pub fn multi_site_config_toml() -> &'static str {
    r#"
[global]
work_dir = "{work_dir}"
log_directory = "{log_dir}"
default_timeout_seconds = 600

[storage]
type = "local"
root = "{store_root}"

[notifications]
notify_on = ["failure"]

[[sites]]
name = "blog"
container = "blog-db"
bucket = "acme-backups"

[[sites]]
name = "shop"
container = "shop-postgres"
bucket = "acme-backups"
engine = "postgres"
timeout_seconds = 1800

[[sites]]
name = "legacy"
container = "legacy-db"
bucket = "legacy-backups"
enabled = false
"#
}

/// Fill the placeholders of a config template
pub fn render_config(template: &str, work_dir: &str, log_dir: &str, store_root: &str) -> String {
    template
        .replace("{work_dir}", work_dir)
        .replace("{log_dir}", log_dir)
        .replace("{store_root}", store_root)
}
