use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use aplus_engine::{
    ImgModBox,
    image_model::retry::RetryPolicy,
    input::{ProductInput, TitleSource, load_input, load_instructions},
    output::OutputWriter,
    pipeline::{EXIT_INVALID_INPUT, Pipeline, RunSummary},
    prompt::{
        BrandStyle, ModulePrompt, build_prompts, default_templates, select_templates,
        validate_templates,
    },
};
use color_eyre::{
    Result,
    eyre::{WrapErr as _, ensure, eyre},
};
use log::{LevelFilter, debug, error, info};
use serde::de::DeserializeOwned;

use crate::{cli::Cli, config::Config};

pub mod cli;
pub mod config;

const CONFIG_FILE_NAME: &str = "aplus.ron";

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(CONFIG_FILE_NAME))
}

/// An explicitly given config file has to exist. The default one is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Ok(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    debug!("Loading config from {}", path.display());
    load_ron_file(&path).wrap_err_with(|| format!("Couldn't load config {}", path.display()))
}

/// Our own crates log at info (debug with `verbose`), everything else at warn. `RUST_LOG` is
/// applied on top.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module("aplus", level)
        .filter_module("aplus_engine", level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if builder.try_init().is_err() {
        debug!("Logger was already initialized");
    }
}

/// Runs the whole generator and returns the process exit code. `env` looks up environment
/// variables and is only consulted for credentials. Once `interrupt` completes, unfinished modules
/// are abandoned and reported as failed.
pub async fn run(
    cli: Cli,
    config: Config,
    env: impl Fn(&str) -> Option<String>,
    interrupt: impl Future<Output = ()>,
) -> u8 {
    let start = Instant::now();

    let (pipeline, input, prompts) = match prepare(&cli, &config, env) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("{e:?}");
            return EXIT_INVALID_INPUT;
        }
    };

    let summary = pipeline.run_until(&input, prompts, interrupt).await;
    print_summary(&summary);
    info!(
        "{} of {} module(s) written to {} in {:.1?}",
        summary.succeeded().count(),
        summary.outcomes.len(),
        pipeline.outdir().display(),
        start.elapsed()
    );

    summary.exit_code()
}

fn prepare(
    cli: &Cli,
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(Pipeline, ProductInput, Vec<ModulePrompt>)> {
    let title = TitleSource::from_flags(cli.title.clone(), cli.title_path.clone())?;
    let input = load_input(&cli.product_image, &cli.logo_image, title)?;
    info!("Loaded inputs for \"{}\"", input.title);

    let model = make_model(cli, config, env)?;

    let templates = config.templates.clone().unwrap_or_else(default_templates);
    validate_templates(&templates)?;
    let templates = select_templates(&templates, &cli.modules)?;

    let mut extra = config.style_instructions.clone();
    if let Some(path) = &cli.instructions_path {
        let instructions = load_instructions(path)?;
        extra = Some(match extra {
            Some(configured) => format!("{configured}\n{instructions}"),
            None => instructions,
        });
    }
    let style = BrandStyle::default().with_extra(extra);
    let prompts = build_prompts(&input, &templates, &style);

    let timeout_secs = cli.timeout_secs.unwrap_or(config.timeout_secs);
    ensure!(timeout_secs > 0, "The timeout has to be at least one second");
    let retry = RetryPolicy {
        timeout: Duration::from_secs(timeout_secs),
        ..RetryPolicy::default()
    }
    .with_max_retries(cli.max_retries.unwrap_or(config.max_retries));

    let pipeline = Pipeline::new(model, OutputWriter::new(&cli.outdir), retry)
        .with_concurrency(cli.concurrency.unwrap_or(config.concurrency))
        .with_size(cli.size.or(config.size).unwrap_or_default());

    Ok((pipeline, input, prompts))
}

fn make_model(
    cli: &Cli,
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ImgModBox> {
    let model = cli.model.or(config.model).unwrap_or_default();
    let provider = model.provider();

    let key = config.api_key(provider, env).ok_or_else(|| {
        eyre!(
            "No API key for {provider}. Set {} or add it to the config file",
            provider.api_key_vars().join(" or ")
        )
    })?;

    model
        .make(key, config.base_url(provider))
        .wrap_err("Couldn't set up the HTTP client")
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(written) => println!("✔ {} {}", outcome.module_id, written.image_path.display()),
            Err(e) => println!("✘ {} {e}", outcome.module_id),
        }
    }
}
