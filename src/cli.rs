use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::builder::BindingContextBuilder;
use crate::error::{BindingError, Result};
use crate::mode::SchemaMode;
use crate::model::ClassRef;
use crate::output::{
    DetailsReport, FragmentReport, OutputFormat, Report, ResolveReport, SchemaReport,
};
use crate::resolver::Seed;

/// Resolve binding contexts and schemas for a class model
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-binder")]
#[command(about = "Resolve XML binding contexts and compile their schemas for a class catalog")]
#[command(version)]
pub struct Cli {
    /// Catalog describing packages, classes and registrations
    #[arg(long = "catalog", default_value = "catalog.toml")]
    pub catalog: PathBuf,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// NEVER, ALWAYS, MARSHAL, UNMARSHAL or EXTERNAL_XSD
    #[arg(long = "schema-mode")]
    pub schema_mode: Option<SchemaMode>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Roots searched for classpath and relative schema locations
    #[arg(long = "classpath", action = clap::ArgAction::Append)]
    pub classpath: Vec<PathBuf>,

    #[arg(long = "format", value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the classes reachable from the given classes
    Resolve {
        #[arg(required = true)]
        classes: Vec<String>,
    },
    /// Show the canonical binding details; no classes means everything registered
    Details { classes: Vec<String> },
    /// Compile the schema for the given classes
    Schema {
        classes: Vec<String>,
        /// Also print the generated fragments and fetched documents
        #[arg(long = "fragments")]
        fragments: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn seed_for(builder: &BindingContextBuilder, names: &[String]) -> Result<Seed<'static>> {
    if names.is_empty() {
        return Ok(Seed::Empty);
    }
    let classes = names
        .iter()
        .map(|name| {
            builder.class_loader().load_class(name).ok_or_else(|| {
                BindingError::InvalidArgument(format!("class {} is not in the catalog", name))
            })
        })
        .collect::<Result<Vec<ClassRef>>>()?;
    Ok(Seed::Classes(classes))
}

impl Command {
    pub async fn execute(&self, builder: &BindingContextBuilder) -> Result<Report> {
        match self {
            Command::Resolve { classes } => {
                let seed = seed_for(builder, classes)?;
                let mut resolved: Vec<String> = builder
                    .resolver()
                    .resolve(&seed, builder.class_loader())
                    .into_iter()
                    .map(|class| class.qualified_name().to_string())
                    .collect();
                resolved.sort();
                builder.resolve(&seed);

                Ok(Report::Resolve(ResolveReport {
                    classes: resolved,
                    registered: builder
                        .registered_keys()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                }))
            }
            Command::Details { classes } => {
                let details = builder.resolve(&seed_for(builder, classes)?);
                Ok(Report::Details(DetailsReport::from(&details)))
            }
            Command::Schema { classes, fragments } => {
                let details = builder.resolve(&seed_for(builder, classes)?);
                let fragments = if *fragments {
                    let sources = builder.schema_sources(&details).await?;
                    Some(
                        sources
                            .into_iter()
                            .map(|source| FragmentReport {
                                namespace: source.namespace,
                                system_id: source.system_id,
                                document: String::from_utf8_lossy(&source.document).into_owned(),
                            })
                            .collect(),
                    )
                } else {
                    None
                };
                let schema = builder.compute_schema(&details).await?;

                Ok(Report::Schema(SchemaReport {
                    details: DetailsReport::from(&details),
                    namespaces: schema.namespaces().iter().cloned().collect(),
                    system_ids: schema.system_ids().to_vec(),
                    fragments,
                    cache: builder.cache_stats().await,
                }))
            }
        }
    }
}
