use std::{io::Write, path::PathBuf};

use clap::Parser;
use snafu::{ResultExt, Snafu};
use stackable_cluster_spec::{
    ClusterKind, ClusterResource, ValidationErrors,
    cli::{self, SpecOptions},
    logging::{self, LoggingOptions},
    resource,
};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to build the schema registry"))]
    BuildRegistry { source: cli::Error },

    #[snafu(display("failed to read {path:?}"))]
    ReadResource {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to decode {path:?}"))]
    DecodeResource {
        source: resource::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to apply defaults to {path:?}"))]
    ApplyDefaults {
        source: resource::Error,
        path: PathBuf,
    },

    #[snafu(display("{path:?} is not a valid {kind}"))]
    InvalidResource {
        source: ValidationErrors,
        path: PathBuf,
        kind: ClusterKind,
    },

    #[snafu(display("failed to encode {path:?}"))]
    EncodeResource {
        source: resource::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write to stdout"))]
    WriteOutput { source: std::io::Error },
}

/// Checks DaskCluster, RayCluster and SparkCluster resources and prints them in canonical
/// JSON form, one per line.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    /// Apply the admission defaults before validating.
    #[arg(long)]
    apply_defaults: bool,

    /// JSON files holding one cluster resource each.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    #[command(flatten)]
    spec: SpecOptions,

    #[command(flatten)]
    logging: LoggingOptions,
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    logging::initialize_logging("CLUSTER_SPEC_LOG", "cluster-spec", &opts.logging)
        .context(InitializeLoggingSnafu)?;

    let registry = opts.spec.registry().context(BuildRegistrySnafu)?;
    let codec = opts.spec.codec(&registry);
    let mut stdout = std::io::stdout().lock();

    for path in &opts.files {
        let bytes = std::fs::read(path).context(ReadResourceSnafu { path })?;
        let mut resource =
            ClusterResource::from_json(&bytes, &codec).context(DecodeResourceSnafu { path })?;

        if opts.apply_defaults {
            resource
                .apply_defaults(&registry)
                .context(ApplyDefaultsSnafu { path })?;
        }

        let errors = resource.validate(&registry);
        if !errors.is_empty() {
            return Err(ValidationErrors::from(errors)).context(InvalidResourceSnafu {
                path,
                kind: resource.kind(),
            });
        }
        tracing::info!(path = %path.display(), kind = %resource.kind(), "resource is valid");

        let body = resource
            .to_request_body(&codec)
            .context(EncodeResourceSnafu { path })?;
        stdout
            .write_all(&body)
            .and_then(|()| writeln!(stdout))
            .context(WriteOutputSnafu)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn flattened_options() {
        let opts = Opts::parse_from([
            "cluster-spec",
            "--apply-defaults",
            "--strict-decoding",
            "--console-log-disabled",
            "ray.json",
            "spark.json",
        ]);

        assert!(opts.apply_defaults);
        assert!(opts.spec.strict_decoding);
        assert!(opts.logging.console_log_disabled);
        assert_eq!(opts.files, [PathBuf::from("ray.json"), PathBuf::from("spark.json")]);
    }
}
