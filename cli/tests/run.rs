use std::{fs, path::Path};

use aplus::{cli::Cli, config::Config, load_config, run};
use aplus_engine::{
    output::{MetadataRecord, Status},
    pipeline::{EXIT_INVALID_INPUT, EXIT_MODULE_FAILED},
};
use clap::Parser;

const TITLE: &str = "Tiny Land Triangle Climbing Frame";

fn no_env(_: &str) -> Option<String> {
    None
}

async fn run_to_end(cli: Cli, config: Config, env: impl Fn(&str) -> Option<String>) -> u8 {
    run(cli, config, env, std::future::pending()).await
}

fn write_images(dir: &Path) {
    fs::write(dir.join("product.jpg"), b"jpeg bytes").unwrap();
    fs::write(dir.join("logo.png"), b"png bytes").unwrap();
}

fn cli(dir: &Path, extra: &[&str]) -> Cli {
    let product = dir.join("product.jpg");
    let logo = dir.join("logo.png");
    let outdir = dir.join("test");

    let mut args = vec![
        "aplus".to_string(),
        "--product-image".into(),
        product.display().to_string(),
        "--logo-image".into(),
        logo.display().to_string(),
        "--outdir".into(),
        outdir.display().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    Cli::try_parse_from(args).unwrap()
}

#[tokio::test]
async fn missing_product_image_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logo.png"), b"png bytes").unwrap();

    let code = run_to_end(cli(dir.path(), &["--title", TITLE]), Config::default(), |_| {
        Some("key".into())
    })
    .await;

    assert_eq!(code, EXIT_INVALID_INPUT);
    assert!(!dir.path().join("test").exists());
}

#[tokio::test]
async fn missing_title_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());

    let code = run_to_end(cli(dir.path(), &[]), Config::default(), no_env).await;

    assert_eq!(code, EXIT_INVALID_INPUT);
    assert!(!dir.path().join("test").exists());
}

#[tokio::test]
async fn both_title_flags_are_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());
    let title_path = dir.path().join("title.txt");
    fs::write(&title_path, TITLE).unwrap();

    let title_path = title_path.display().to_string();
    let code = run_to_end(
        cli(dir.path(), &["--title", TITLE, "--title-path", &title_path]),
        Config::default(),
        |_| Some("key".into()),
    )
    .await;

    assert_eq!(code, EXIT_INVALID_INPUT);
}

#[tokio::test]
async fn missing_credential_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());

    let code = run_to_end(cli(dir.path(), &["--title", TITLE]), Config::default(), no_env).await;

    assert_eq!(code, EXIT_INVALID_INPUT);
    assert!(!dir.path().join("test").exists());
}

#[tokio::test]
async fn unknown_module_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());

    let code = run_to_end(
        cli(dir.path(), &["--title", TITLE, "--module", "no-such-module"]),
        Config::default(),
        |_| Some("key".into()),
    )
    .await;

    assert_eq!(code, EXIT_INVALID_INPUT);
}

#[tokio::test]
async fn unreachable_provider_fails_the_module() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());
    let config = Config {
        openai_api_key: Some("sk-test".into()),
        // Nothing listens on the discard port.
        openai_base_url: Some("http://127.0.0.1:9/v1".into()),
        max_retries: 0,
        ..Config::default()
    };

    let code = run_to_end(
        cli(dir.path(), &["--title", TITLE, "--module", "brand-story"]),
        config,
        no_env,
    )
    .await;

    assert_eq!(code, EXIT_MODULE_FAILED);
    let outdir = dir.path().join("test");
    let record: MetadataRecord =
        serde_json::from_slice(&fs::read(outdir.join("brand-story.json")).unwrap()).unwrap();
    assert_eq!(record.status, Status::Failed);
    assert!(record.prompt.contains(TITLE));
    assert!(record.error.is_some());
    assert!(!outdir.join("brand-story.png").exists());
}

#[tokio::test]
async fn interrupted_run_records_every_unfinished_module() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path());
    let config = Config {
        openai_api_key: Some("sk-test".into()),
        ..Config::default()
    };

    let code = run(
        cli(dir.path(), &["--title", TITLE, "--module", "features"]),
        config,
        no_env,
        std::future::ready(()),
    )
    .await;

    assert_eq!(code, EXIT_MODULE_FAILED);
    let record: MetadataRecord = serde_json::from_slice(
        &fs::read(dir.path().join("test").join("features.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.error.as_deref(), Some("Interrupted before completion"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config(Some(&dir.path().join("missing.ron"))).is_err());

    let path = dir.path().join("aplus.ron");
    fs::write(&path, "(max_retries: 5)").unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.max_retries, 5);
}
