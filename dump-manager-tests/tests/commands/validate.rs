//! Tests for the 'validate' and 'list' commands
//!
//! Both only load the configuration; no site is touched.

use dump_manager::config::{load_config, resolve_sites, validate_config, ConfigError};
use test_utils::{ConfigBuilder, ResultAssertions, TestContext};

#[test]
fn test_validate_written_config() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .add_site("blog")
            .add_postgres_site("shop")
            .add_disabled_site("legacy"),
    );
    let path = ctx.write_config().unwrap();

    let loaded = load_config(&path).assert_ok();
    assert_eq!(loaded.sites.len(), 3);

    let ids: Vec<_> = resolve_sites(&loaded).into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["blog".to_string(), "shop".to_string()]);
}

#[test]
fn test_validate_invalid_toml() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.toml", "invalid { toml content");

    load_config(&path).assert_err_contains("ParseError");
}

#[test]
fn test_validate_duplicate_site() {
    let config = ConfigBuilder::new().add_site("blog").add_site("blog").build();

    assert!(matches!(
        validate_config(&config),
        Err(ConfigError::DuplicateSite(ref name)) if name == "blog"
    ));
}

#[test]
fn test_validate_no_sites() {
    let config = ConfigBuilder::new().build();
    validate_config(&config).assert_err_contains("No sites defined");
}

#[test]
fn test_validate_hidden_site_name() {
    let config = ConfigBuilder::new().add_site(".blog").build();
    validate_config(&config).assert_err();
}

#[test]
fn test_validate_s3_without_root() {
    let config = ConfigBuilder::minimal()
        .with_s3(Some("https://s3.eu-central-003.backblazeb2.com"), "eu-central-003")
        .build();
    validate_config(&config).assert_ok();
}
