//! Settings shared by tools that read or write cluster specs.
//!
//! With the `clap` feature enabled, [`SpecOptions`] can be flattened into a clap-based CLI.
//! Every flag can also be provided through the environment.
//!
//! ```no_run
//! use clap::Parser;
//! use stackable_cluster_spec::cli::SpecOptions;
//!
//! #[derive(clap::Parser)]
//! struct Opts {
//!     #[command(flatten)]
//!     spec: SpecOptions,
//! }
//!
//! # fn main() -> Result<(), stackable_cluster_spec::cli::Error> {
//! let opts = Opts::parse();
//! let registry = opts.spec.registry()?;
//! let codec = opts.spec.codec(&registry);
//! # Ok(())
//! # }
//! ```
use std::path::PathBuf;

use snafu::{ResultExt, Snafu};

use crate::{
    codec::Codec,
    schema::{DefinitionsError, EmbeddedWithError, SchemaDefinitions, SchemaRegistry},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to load schema definitions from {path:?}"))]
    LoadDefinitions {
        source: DefinitionsError,
        path: PathBuf,
    },

    #[snafu(display("failed to build schema registry"))]
    BuildRegistry { source: EmbeddedWithError },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct SpecOptions {
    /// Reject unknown fields when decoding specs instead of preserving them.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub strict_decoding: bool,

    /// Schema definition files layered over the embedded definitions, e.g. to teach the
    /// client about fields of newer custom resource versions.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "FILE", value_delimiter = ',')
    )]
    pub schema_definitions: Vec<PathBuf>,
}

impl SpecOptions {
    /// Builds a registry from the embedded definitions and all
    /// [`schema_definitions`](Self::schema_definitions) files, in order.
    pub fn registry(&self) -> Result<SchemaRegistry> {
        let mut extra = Vec::new();

        for path in &self.schema_definitions {
            let definitions =
                SchemaDefinitions::from_yaml_file(path).context(LoadDefinitionsSnafu { path })?;

            if definitions.kinds().is_empty() {
                tracing::warn!(path = %path.display(), "schema definition file declares no kinds");
            } else {
                tracing::info!(
                    path = %path.display(),
                    kinds = definitions.kinds().len(),
                    "loaded schema definitions"
                );
            }
            extra.extend(definitions);
        }

        SchemaRegistry::embedded_with(extra).context(BuildRegistrySnafu)
    }

    pub fn codec<'r>(&self, registry: &'r SchemaRegistry) -> Codec<'r> {
        Codec::new(registry).strict(self.strict_decoding)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use super::*;

    #[cfg(feature = "clap")]
    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[command(flatten)]
        spec: SpecOptions,
    }

    #[cfg(feature = "clap")]
    #[test]
    fn verify_cli() {
        use clap::CommandFactory;

        Cli::command().debug_assert();
    }

    #[cfg(feature = "clap")]
    #[test]
    fn parse_flags() {
        use clap::Parser;

        let cli = Cli::parse_from([
            "spec-tool",
            "--strict-decoding",
            "--schema-definitions",
            "a.yaml,b.yaml",
        ]);

        assert_eq!(cli.spec, SpecOptions {
            strict_decoding: true,
            schema_definitions: vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")],
        });
    }

    #[test]
    fn default_options_use_embedded_definitions() {
        let registry = SpecOptions::default().registry().expect("embedded definitions");
        assert_eq!(&registry, SchemaRegistry::embedded());

        let codec = SpecOptions::default().codec(&registry);
        assert!(!codec.is_strict());
    }

    #[test]
    fn layered_definitions_extend_cluster_kinds() {
        let mut file = tempfile::NamedTempFile::new().expect("temporary file");
        file.write_all(
            indoc! {"
                - kind: RayClusterWorker
                  fields:
                    - { name: gpu_type, type: string }
            "}
            .as_bytes(),
        )
        .expect("writable");

        let options = SpecOptions {
            strict_decoding: true,
            schema_definitions: vec![file.path().to_owned()],
        };
        let registry = options.registry().expect("valid definitions");

        let worker = registry
            .lookup("RayClusterWorker", "gpu_type")
            .expect("layered field");
        assert_eq!(worker.wire_name, "gpuType");

        let spec = options
            .codec(&registry)
            .decode(br#"{"worker": {"gpuType": "a100"}}"#, "RayClusterSpec")
            .expect("known field");
        assert_eq!(
            spec.get_node("worker").and_then(|worker| worker.get_str("gpu_type")),
            Some("a100")
        );
    }

    #[test]
    fn missing_definition_file() {
        let options = SpecOptions {
            strict_decoding: false,
            schema_definitions: vec![PathBuf::from("/does/not/exist.yaml")],
        };

        assert!(matches!(
            options.registry(),
            Err(Error::LoadDefinitions { .. })
        ));
    }
}
