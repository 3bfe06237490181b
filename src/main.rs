use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use clap::Parser;
use halo_publish::{
    config::Config,
    deploy::{easyimage, halo},
    host::LocalFileStore,
    progress::{self, Notifier},
    publish::Publisher,
};
use tracing::{error, info};

/// Publish markdown documents to a Halo blog.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    #[clap(short, long, env = "HALO_PUBLISH_CONFIG")]
    config: PathBuf,
    /// Overrides `halo.token` from the config file.
    #[clap(long, env = "HALO_TOKEN", hide_env_values = true)]
    halo_token: Option<String>,
    /// Overrides `image_host.token` from the config file.
    #[clap(long, env = "HALO_IMAGE_TOKEN", hide_env_values = true)]
    image_token: Option<String>,
    /// Check remote images before embedding them.
    #[clap(long)]
    validate_remote_images: bool,
    /// Only log; no progress output.
    #[clap(short, long)]
    quiet: bool,
    #[clap(required = true)]
    documents: Vec<PathBuf>,
}

async fn load_config(opts: &Opts) -> anyhow::Result<Config> {
    let config = tokio::fs::read_to_string(&opts.config)
        .await
        .with_context(|| "read config")?;
    let mut config: Config = serde_yaml::from_str(&config)
        .with_context(|| format!("parse config from {}", opts.config.display()))?;
    if let Some(token) = &opts.halo_token {
        config.halo.token = token.clone();
    }
    if let Some(token) = &opts.image_token {
        config.image_host.token = token.clone();
    }
    if opts.validate_remote_images {
        config.images.validate_remote = true;
    }
    config.validate().map_err(|msg| anyhow!("{msg}"))?;
    Ok(config)
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = load_config(&opts).await?;
    let notifier: Arc<dyn Notifier> = if opts.quiet {
        Arc::new(progress::NullNotifier)
    } else {
        progress::create_notifier()
    };
    let publisher = Publisher::new(
        &config,
        halo::Client::new(&config.halo),
        easyimage::Client::new(&config.image_host),
        LocalFileStore,
        notifier.clone(),
    );
    let mut failed = 0;
    for document in &opts.documents {
        match publisher.publish(document).await {
            Ok(report) => info!(
                path = %document.display(),
                post = %report.post_name,
                outcome = ?report.outcome,
                warnings = report.warnings.len(),
                "published"
            ),
            Err(_) => failed += 1,
        }
    }
    notifier.finish();
    if failed > 0 {
        return Err(anyhow!("{failed} of {} documents failed", opts.documents.len()));
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(opts)) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
