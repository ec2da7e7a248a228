// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use tempfile::tempdir;

fn cli(api_key: Option<&str>) -> Config {
    Config {
        api_key: api_key.map(str::to_owned),
        endpoint: None,
        org_id: None,
        ws_url: None,
        source_id: None,
        durable_buffer: false,
        log_format: "text".into(),
        log_level: "info".into(),
        command: None,
    }
}

#[test]
#[serial]
fn resolve_fails_without_an_api_key_anywhere() -> anyhow::Result<()> {
    let home = tempdir()?;
    std::env::set_var("HOME", home.path());
    let resolved = cli(None).resolve();
    assert!(resolved.is_err());
    Ok(())
}

#[test]
#[serial]
fn cli_flag_takes_precedence_over_file() -> anyhow::Result<()> {
    let home = tempdir()?;
    std::env::set_var("HOME", home.path());

    let file = ConfigFile { api_key: Some("file-key".into()), endpoint: Some("https://file.example".into()), ..Default::default() };
    file.save()?;

    let resolved = cli(Some("flag-key")).resolve()?;
    assert_eq!(resolved.api_key, "flag-key");
    assert_eq!(resolved.endpoint, "https://file.example");
    Ok(())
}

#[test]
#[serial]
fn endpoint_falls_back_to_built_in_default() -> anyhow::Result<()> {
    let home = tempdir()?;
    std::env::set_var("HOME", home.path());

    let resolved = cli(Some("flag-key")).resolve()?;
    assert_eq!(resolved.endpoint, DEFAULT_ENDPOINT);
    Ok(())
}

#[test]
#[serial]
fn source_id_is_generated_once_and_persisted() -> anyhow::Result<()> {
    let home = tempdir()?;
    std::env::set_var("HOME", home.path());

    let first = cli(Some("flag-key")).resolve()?;
    assert!(first.source_id.starts_with("source-"));

    let second = cli(Some("flag-key")).resolve()?;
    assert_eq!(first.source_id, second.source_id);
    Ok(())
}

#[test]
fn validate_rejects_unknown_log_format() {
    let mut config = cli(Some("k"));
    config.log_format = "yaml".into();
    assert!(config.validate().is_err());
}

#[test]
fn validate_accepts_known_log_levels_and_formats() {
    let config = cli(Some("k"));
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn run_init_persists_api_key_and_org_id_without_prompting_when_supplied() -> anyhow::Result<()> {
    let home = tempdir()?;
    std::env::set_var("HOME", home.path());

    let mut config = cli(Some("flag-key"));
    config.org_id = Some("org-1".into());
    run_init(&config)?;

    let file = ConfigFile::load();
    assert_eq!(file.api_key, Some("flag-key".to_owned()));
    assert_eq!(file.org_id, Some("org-1".to_owned()));
    Ok(())
}
