//! Markdown report writer for analysis results.
//!
//! Persisting results is a caller concern; this module is the one built-in
//! sink — a human-readable markdown summary under a notes directory. The
//! write is atomic (temp file then rename) so a crash mid-write never leaves
//! a truncated report behind.

use crate::analyze::AnalysisOutput;
use crate::error::ScanError;
use crate::schema::{FieldValue, TargetSchema};
use std::path::{Path, PathBuf};
use tracing::info;

/// Render an analysis result as a markdown document.
pub fn render_report(output: &AnalysisOutput, schema: &TargetSchema) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {} report\n\n", heading_name(&schema.name)));
    md.push_str(&format!("- **Model:** {}\n", output.model));
    md.push_str(&format!("- **Duration:** {} ms\n", output.duration_ms));
    if let (Some(w), Some(h)) = (output.image_width, output.image_height) {
        md.push_str(&format!("- **Analyzed image:** {w}×{h}\n"));
    }
    md.push('\n');

    for (name, value) in output.result.iter() {
        match value {
            FieldValue::Str(s) => {
                md.push_str(&format!("## {}\n\n{}\n\n", heading_name(name), s));
            }
            FieldValue::Bool(b) => {
                md.push_str(&format!(
                    "- **{}:** {}\n",
                    heading_name(name),
                    if *b { "Yes" } else { "No" }
                ));
            }
            FieldValue::Int(n) => {
                md.push_str(&format!("- **{}:** {}\n", heading_name(name), n));
            }
            FieldValue::Float(f) => {
                md.push_str(&format!("- **{}:** {:.2}\n", heading_name(name), f));
            }
            FieldValue::StrList(items) => {
                md.push_str(&format!("## {}\n\n", heading_name(name)));
                if items.is_empty() {
                    md.push_str("*(none)*\n");
                } else {
                    for item in items {
                        md.push_str(&format!("- {item}\n"));
                    }
                }
                md.push('\n');
            }
            FieldValue::Records(records) => {
                md.push_str(&format!("## {}\n\n", heading_name(name)));
                for record in records {
                    let line: Vec<String> = record
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, value_display(v)))
                        .collect();
                    md.push_str(&format!("- {}\n", line.join(", ")));
                }
                md.push('\n');
            }
        }
    }

    if !md.ends_with('\n') {
        md.push('\n');
    }
    md
}

/// Write the report to `{dir}/{stem}.md`, creating `dir` as needed.
///
/// Atomic: the content lands in a `.md.tmp` sibling first and is renamed
/// into place, so readers never observe a partial report.
pub async fn write_report(
    output: &AnalysisOutput,
    schema: &TargetSchema,
    dir: impl AsRef<Path>,
    stem: &str,
) -> Result<PathBuf, ScanError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ScanError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let path = dir.join(format!("{stem}.md"));
    let tmp_path = path.with_extension("md.tmp");
    let content = render_report(output, schema);

    tokio::fs::write(&tmp_path, &content)
        .await
        .map_err(|e| ScanError::Io {
            path: path.clone(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| ScanError::Io {
            path: path.clone(),
            source: e,
        })?;

    info!("Wrote report: {}", path.display());
    Ok(path)
}

/// "image_context" → "Image context".
fn heading_name(field: &str) -> String {
    let mut chars = field.replace('_', " ").chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    chars.into_iter().collect()
}

fn value_display(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => s.clone(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Int(n) => n.to_string(),
        FieldValue::Float(f) => format!("{f:.2}"),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::security_assessment;

    fn sample_output() -> AnalysisOutput {
        let schema = security_assessment();
        let reply = serde_json::json!({
            "image_context": "two people in a parking garage",
            "has_weapon": true,
            "has_people": true,
            "confidence": 92,
            "scene_type": "Indoor",
            "potential_threats": ["concealed weapon"],
            "detected_objects": ["car", "handgun"]
        });
        AnalysisOutput {
            result: schema.validate(&reply).unwrap(),
            raw_reply: reply.to_string(),
            model: "llava:7b".into(),
            duration_ms: 1234,
            retries: 0,
            image_width: Some(640),
            image_height: Some(480),
        }
    }

    #[test]
    fn report_contains_findings() {
        let md = render_report(&sample_output(), &security_assessment());
        assert!(md.starts_with("# Security assessment report"));
        assert!(md.contains("**Has weapon:** Yes"));
        assert!(md.contains("**Has people:** Yes"));
        assert!(md.contains("**Confidence:** 92"));
        assert!(md.contains("- concealed weapon"));
        assert!(md.contains("- handgun"));
        assert!(md.contains("two people in a parking garage"));
    }

    #[test]
    fn empty_lists_render_placeholder() {
        let schema = security_assessment();
        let reply = serde_json::json!({
            "image_context": "empty street",
            "has_weapon": false,
            "has_people": false,
            "confidence": 80
        });
        let output = AnalysisOutput {
            result: schema.validate(&reply).unwrap(),
            raw_reply: reply.to_string(),
            model: "llava:7b".into(),
            duration_ms: 10,
            retries: 0,
            image_width: None,
            image_height: None,
        };
        let md = render_report(&output, &schema);
        assert!(md.contains("*(none)*"));
        assert!(!md.contains("Analyzed image"));
    }

    #[tokio::test]
    async fn write_report_is_atomic_and_named_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(
            &sample_output(),
            &security_assessment(),
            dir.path().join("notes"),
            "garage-cam-01",
        )
        .await
        .unwrap();
        assert!(path.ends_with("garage-cam-01.md"));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("# Security assessment report"));
        // No temp file left behind.
        assert!(!path.with_extension("md.tmp").exists());
    }
}
