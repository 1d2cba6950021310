use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// Writes any dashboard view as a single JSON document.
pub fn export_json<T: Serialize>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploylens::query::ViewStatus;

    #[test]
    fn test_export_json_compact() {
        let mut output = Vec::new();
        export_json(&ViewStatus::Ready(3), false, &mut output).unwrap();
        let json = String::from_utf8(output).unwrap();
        assert_eq!(json.trim(), r#"{"status":"ready","detail":3}"#);
    }

    #[test]
    fn test_export_json_pretty() {
        let mut output = Vec::new();
        export_json(&ViewStatus::Failed("boom".into()), true, &mut output).unwrap();
        let json = String::from_utf8(output).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("  \"detail\": \"boom\""));
    }
}
