use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scriptbridge_wire::{TypeTag, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What a `run` invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub result_type: TypeTag,
    pub value: Value,
    pub console: Option<String>,
    pub plot: Option<PlotReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotReport {
    pub path: PathBuf,
    pub bytes: usize,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    result_type: String,
    value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    console: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot_bytes: Option<usize>,
}

impl<'a> From<&'a RunReport> for RunOutput<'a> {
    fn from(report: &'a RunReport) -> Self {
        Self {
            result_type: type_label(report.result_type),
            value: value_to_json(&report.value),
            console: report.console.as_deref(),
            plot_path: report
                .plot
                .as_ref()
                .map(|plot| plot.path.display().to_string()),
            plot_bytes: report.plot.as_ref().map(|plot| plot.bytes),
        }
    }
}

pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&RunOutput::from(report)).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["type".to_string(), type_label(report.result_type)])
                .add_row(vec!["value".to_string(), value_text(&report.value)]);
            if let Some(console) = &report.console {
                table.add_row(vec!["console".to_string(), console.trim_end().to_string()]);
            }
            if let Some(plot) = &report.plot {
                table.add_row(vec![
                    "plot".to_string(),
                    format!("{} ({} bytes)", plot.path.display(), plot.bytes),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} value={}",
                type_label(report.result_type),
                value_text(&report.value)
            );
            if let Some(console) = &report.console {
                print!("{console}");
            }
            if let Some(plot) = &report.plot {
                println!("plot={} bytes={}", plot.path.display(), plot.bytes);
            }
        }
        OutputFormat::Raw => {
            if let Some(console) = &report.console {
                print_raw(console.as_bytes());
            }
            if !report.value.type_tag().is_void() {
                print_raw(format!("{}\n", value_text(&report.value)).as_bytes());
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn type_label(tag: TypeTag) -> String {
    tag.name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("custom({})", tag.get()))
}

fn value_text(value: &Value) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    match value {
        Value::Void => String::new(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::IntVec(v) => join(v),
        Value::FloatVec(v) => join(v),
        Value::Str(s) => s.clone(),
        Value::Custom(custom) => format!("<{}>", custom.type_tag()),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Void => serde_json::Value::Null,
        Value::Int(v) => serde_json::Value::from(*v),
        Value::Float(v) => serde_json::Value::from(f64::from(*v)),
        Value::IntVec(v) => serde_json::Value::from(v.clone()),
        Value::FloatVec(v) => v.iter().map(|x| serde_json::Value::from(f64::from(*x))).collect(),
        Value::Str(s) => serde_json::Value::from(s.as_str()),
        Value::Custom(custom) => serde_json::Value::from(format!("<{}>", custom.type_tag())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let report = RunReport {
            result_type: TypeTag::FLOAT32_VEC,
            value: Value::FloatVec(vec![0.5, f32::NAN]),
            console: Some("hi\n".into()),
            plot: None,
        };
        let json = serde_json::to_value(RunOutput::from(&report)).expect("report should serialize");
        assert_eq!(json["result_type"], "vector<float32>");
        assert_eq!(json["value"], serde_json::json!([0.5, null]));
        assert_eq!(json["console"], "hi\n");
        assert!(json.get("plot_path").is_none());
    }

    #[test]
    fn labels_and_text() {
        assert_eq!(type_label(TypeTag::INT32), "int32");
        assert_eq!(type_label(TypeTag(7)), "custom(7)");
        assert_eq!(value_text(&Value::IntVec(vec![1, 2])), "1 2");
        assert_eq!(value_text(&Value::Void), "");
    }
}
