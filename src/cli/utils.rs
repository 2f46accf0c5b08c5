use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Print `data` as JSON, or run `text` for the human-readable rendering.
pub fn output<T, F>(output_format: OutputFormat, data: &T, text: F) -> anyhow::Result<()>
where
    T: Serialize,
    F: FnOnce(),
{
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "success": true, "data": data }))?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response: Value = json!({ "success": false, "error": message });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => eprintln!("Error: {}", message),
    }
    Ok(())
}

/// `count` as a percentage of `total`, one decimal place.
pub fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}
