//! Human and JSON rendering of command results.

use std::io::IsTerminal;

use clap::ValueEnum;
use serde::Serialize;

use crate::cache::BuilderCacheStats;
use crate::details::BindingDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Classes reached from the requested seed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    pub classes: Vec<String>,
    /// Registry keys after resolution, including discovered entries
    pub registered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailsReport {
    pub classes: Vec<String>,
    pub context_path: Option<String>,
    pub schema_location: String,
}

impl From<&BindingDetails> for DetailsReport {
    fn from(details: &BindingDetails) -> Self {
        Self {
            classes: details
                .classes()
                .map(|class| class.qualified_name().to_string())
                .collect(),
            context_path: details.context_path(),
            schema_location: details.schema_location(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentReport {
    pub namespace: String,
    pub system_id: String,
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaReport {
    pub details: DetailsReport,
    pub namespaces: Vec<String>,
    pub system_ids: Vec<String>,
    /// Present when fragments were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragments: Option<Vec<FragmentReport>>,
    pub cache: BuilderCacheStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Report {
    Resolve(ResolveReport),
    Details(DetailsReport),
    Schema(SchemaReport),
}

pub struct Output {
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            show_colors: std::io::stdout().is_terminal(),
        }
    }

    pub fn plain(format: OutputFormat) -> Self {
        Self {
            format,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format(&self, report: &Report) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report),
            OutputFormat::Human => Ok(self.format_human(report)),
        }
    }

    fn format_human(&self, report: &Report) -> String {
        match report {
            Report::Resolve(report) => {
                let mut out = self.heading("Resolved classes");
                push_list(&mut out, &report.classes);
                out.push_str(&self.heading("Registered"));
                push_list(&mut out, &report.registered);
                out
            }
            Report::Details(details) => self.format_details(details),
            Report::Schema(report) => {
                let mut out = self.format_details(&report.details);
                out.push_str(&self.heading("Schema namespaces"));
                let namespaces: Vec<String> = report
                    .namespaces
                    .iter()
                    .map(|ns| if ns.is_empty() { "<none>".to_string() } else { ns.clone() })
                    .collect();
                push_list(&mut out, &namespaces);
                out.push_str(&self.heading("Sources"));
                push_list(&mut out, &report.system_ids);
                if let Some(fragments) = &report.fragments {
                    for fragment in fragments {
                        out.push_str(&self.heading(&format!(
                            "{} ({})",
                            fragment.system_id, fragment.namespace
                        )));
                        out.push_str(&fragment.document);
                        if !fragment.document.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                }
                out.push_str(&format!(
                    "Cache: {} context(s) built, {} schema(s) built\n",
                    report.cache.contexts.builds, report.cache.schemas.builds
                ));
                out
            }
        }
    }

    fn format_details(&self, details: &DetailsReport) -> String {
        let mut out = self.heading("Classes");
        push_list(&mut out, &details.classes);
        out.push_str(&format!(
            "{} {}\n",
            self.colorize("Context path:", "36"),
            details.context_path.as_deref().unwrap_or("-")
        ));
        let location = if details.schema_location.is_empty() {
            "-"
        } else {
            details.schema_location.as_str()
        };
        out.push_str(&format!(
            "{} {}\n",
            self.colorize("Schema location:", "36"),
            location
        ));
        out
    }

    fn heading(&self, title: &str) -> String {
        format!("{}\n", self.colorize(&format!("{}:", title), "1"))
    }
}

fn push_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("  (none)\n");
    }
    for item in items {
        out.push_str(&format!("  {}\n", item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> DetailsReport {
        DetailsReport {
            classes: vec!["loose.Item".to_string()],
            context_path: Some("shop".to_string()),
            schema_location: "urn:shop shop.xsd".to_string(),
        }
    }

    #[test]
    fn test_human_details() {
        let text = Output::plain(OutputFormat::Human)
            .format(&Report::Details(details()))
            .unwrap();
        assert!(text.contains("  loose.Item\n"));
        assert!(text.contains("Context path: shop\n"));
        assert!(text.contains("Schema location: urn:shop shop.xsd\n"));
    }

    #[test]
    fn test_json_is_tagged() {
        let text = Output::plain(OutputFormat::Json)
            .format(&Report::Details(details()))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["command"], "details");
        assert_eq!(value["context_path"], "shop");
    }

    #[test]
    fn test_empty_lists() {
        let text = Output::plain(OutputFormat::Human)
            .format(&Report::Resolve(ResolveReport {
                classes: vec![],
                registered: vec![],
            }))
            .unwrap();
        assert_eq!(text.matches("(none)").count(), 2);
    }
}
