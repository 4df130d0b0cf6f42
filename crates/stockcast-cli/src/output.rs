use std::io::{self, Write};

use serde_json::Value;
use stockcast_core::Envelope;

use crate::error::CliError;

pub fn render(envelope: &Envelope<Value>, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_envelope(&mut handle, envelope, pretty)?;
    handle.flush()?;
    Ok(())
}

fn write_envelope<W: Write>(
    writer: &mut W,
    envelope: &Envelope<Value>,
    pretty: bool,
) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    writeln!(writer, "{payload}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockcast_core::{EnvelopeMeta, ProviderId};

    #[test]
    fn compact_output_is_one_json_line() {
        let meta = EnvelopeMeta::new("request-12345", vec![ProviderId::Yahoo], 3, false)
            .expect("valid meta");
        let envelope = Envelope::new(meta, json!({"symbol": "AAPL"}), Vec::new());

        let mut buffer = Vec::new();
        write_envelope(&mut buffer, &envelope, false).expect("writes");
        let text = String::from_utf8(buffer).expect("utf8");

        assert_eq!(text.lines().count(), 1);
        let parsed: Value = serde_json::from_str(text.trim()).expect("valid json");
        assert_eq!(parsed["data"]["symbol"], "AAPL");
        assert_eq!(parsed["meta"]["source_chain"], json!(["yahoo"]));
        assert!(parsed.get("errors").is_none());
    }
}
