use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use yapi_uploader::config::{self, FileSessionStore};
use yapi_uploader::model;
use yapi_uploader::notify::LogNotifier;
use yapi_uploader::uploader::progress_tracker::{new_progress, request_cancel};
use yapi_uploader::uploader::upload_batch::process_upload_batch;
use yapi_uploader::uploader::yapi_client::{ConnectionTest, YapiClient, YapiUploader};

#[derive(Parser, Debug)]
#[command(
    name = "yapi-uploader",
    version,
    about = "Uploads extracted API definitions to a Yapi documentation server"
)]
struct Args {
    /// JSON file holding the API definitions to upload
    file: PathBuf,

    /// Yapi project id (overrides the configured default)
    #[arg(long)]
    project_id: Option<i64>,

    /// Yapi server URL, e.g. https://yapi.example.com
    #[arg(long, env = "YAPI_SERVER")]
    server: Option<String>,

    /// Yapi account (email)
    #[arg(long, env = "YAPI_ACCOUNT")]
    account: Option<String>,

    /// Yapi password
    #[arg(long, env = "YAPI_PASSWORD")]
    password: Option<String>,

    /// Alternate settings file
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse();

    let settings_path = match args.settings {
        Some(path) => path,
        None => config::default_settings_path()?,
    };
    let mut settings = config::load_settings(&settings_path)?;
    if let Some(server) = args.server {
        settings.url = server;
    }
    if let Some(account) = args.account {
        settings.account = account;
    }
    if let Some(password) = args.password {
        settings.password = password;
    }
    if let Some(project_id) = args.project_id {
        settings.project_id = Some(project_id);
    }

    config::validate_settings(&settings).with_context(|| {
        format!(
            "settings are incomplete; pass --server/--account/--password or edit {}",
            settings_path.display()
        )
    })?;
    let project_id = settings
        .project_id
        .context("no project id; pass --project-id or set it in the settings file")?;

    let apis = model::load_definitions(&args.file)
        .with_context(|| format!("failed to read API definitions from {}", args.file.display()))?;
    log::info!(
        "Loaded {} API definitions from {}",
        apis.len(),
        args.file.display()
    );

    let client = YapiClient::new(
        &settings.url,
        &settings.account,
        &settings.password,
        settings.cookies.clone(),
        settings.cookies_ttl,
    )?;

    // Credentials are checked up front so a bad password fails the run
    // before any definitions are touched.
    match client.test_connection().await {
        ConnectionTest::Ok => log::info!("Authenticated against {}", settings.url),
        ConnectionTest::AuthFailed(reason) => bail!(
            "authentication with {} failed: {}; update the account or password",
            settings.url,
            reason
        ),
        ConnectionTest::NetworkError(reason) => {
            bail!("cannot reach {}: {}", settings.url, reason)
        }
    }

    let progress = new_progress(apis.len());
    {
        let progress = progress.clone();
        ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, cancelling upload after the current item");
            request_cancel(&progress);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let uploader = YapiUploader::new(client);
    let store = FileSessionStore::new(settings_path);

    let report = {
        let progress = progress.clone();
        tokio::spawn(async move {
            process_upload_batch(
                &uploader,
                project_id,
                &apis,
                &progress,
                &LogNotifier,
                &store,
            )
            .await
        })
        .await
        .context("upload task failed")?
    };

    log::info!(
        "Batch {} finished: {} succeeded, {} failed{}",
        report.batch_id,
        report.succeeded,
        report.failed.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    if report.failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}
