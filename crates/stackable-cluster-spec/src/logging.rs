//! `tracing` setup for tools reading or writing cluster specs.
use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {directory:?}"))]
    InitializeFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("failed to install the global tracing subscriber"))]
    InstallSubscriber { source: TryInitError },
}

/// Where log output goes. Can be flattened into a clap-based CLI with the `clap` feature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct LoggingOptions {
    /// Disable log output on stderr.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Also write logs to files in DIRECTORY, keeping the six most recent ones.
    #[cfg_attr(feature = "clap", arg(long, env, value_name = "DIRECTORY"))]
    pub file_log_directory: Option<PathBuf>,
}

impl LoggingOptions {
    /// One layer per enabled output, each filtered through the environment variable `env`.
    ///
    /// If `env` is not set, the maximum log level is INFO.
    pub fn layers(&self, env: &str, app_name: &str) -> Result<Vec<BoxedLayer>, Error> {
        let mut layers = Vec::new();

        if !self.console_log_disabled {
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter(env))
                    .boxed(),
            );
        }

        if let Some(directory) = &self.file_log_directory {
            let file_appender = RollingFileAppender::builder()
                .filename_prefix(app_name)
                .filename_suffix("log")
                .max_log_files(6)
                .build(directory)
                .context(InitializeFileAppenderSnafu { directory })?;

            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender)
                    .with_filter(env_filter(env))
                    .boxed(),
            );
        }

        Ok(layers)
    }
}

/// Installs the global `tracing` subscriber for a tool.
///
/// We force users to provide a variable name so it can be different per tool.
/// We encourage it to be the tool name plus `_LOG`, e.g. `CLUSTER_SPEC_LOG`.
pub fn initialize_logging(env: &str, app_name: &str, options: &LoggingOptions) -> Result<(), Error> {
    Registry::default()
        .with(options.layers(env, app_name)?)
        .try_init()
        .context(InstallSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match &options.file_log_directory {
        Some(directory) => tracing::info!(directory = %directory.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}

fn env_filter(env: &str) -> EnvFilter {
    EnvFilter::try_from_env(env).unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()))
}
