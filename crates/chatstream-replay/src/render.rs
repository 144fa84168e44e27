use std::fmt::Write as _;

use chatstream_core::{MessageStatus, ParseOutcome, Part, Snapshot, ToolCallPart};

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for message in &snapshot.messages {
        let status = match &message.status {
            MessageStatus::Streaming => "streaming".to_string(),
            MessageStatus::Complete => "complete".to_string(),
            MessageStatus::Failed { reason } => format!("failed: {reason}"),
        };
        let _ = writeln!(out, "[{} {}] {status}", message.role, message.id);
        for part in &message.parts {
            render_part(&mut out, snapshot, part);
        }
    }
    if !snapshot.diagnostics.is_empty() {
        let _ = writeln!(out, "diagnostics:");
        for diagnostic in &snapshot.diagnostics {
            let subject = diagnostic
                .tool_call_id
                .as_deref()
                .or(diagnostic.message_id.as_deref())
                .or(diagnostic.approval_id.as_deref())
                .unwrap_or("-");
            let _ = writeln!(out, "  {} [{subject}] {}", diagnostic.kind, diagnostic.detail);
        }
    }
    out
}

fn render_part(out: &mut String, snapshot: &Snapshot, part: &Part) {
    match part {
        Part::Text(text) => {
            let _ = writeln!(out, "  text: {}", text.content);
        }
        Part::Thinking(thinking) => {
            let _ = writeln!(out, "  thinking: {}", thinking.content);
        }
        Part::ToolCall(call) => {
            let state = serde_json::to_value(call.state)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            let _ = writeln!(out, "  tool_call {} {} ({state}): {}", call.id, call.name, input(call));
            if let Some(approval) = &call.approval {
                let decision = match approval.decision {
                    None => "pending",
                    Some(true) => "approved",
                    Some(false) => "denied",
                };
                let _ = writeln!(out, "    approval {}: {decision}", approval.id);
            }
        }
        Part::ToolResult(result) => {
            let linked = if snapshot.tool_call(&result.tool_call_id).is_some() {
                ""
            } else {
                " (no call)"
            };
            let state = if result.is_complete() { "complete" } else { "streaming" };
            let error = if result.is_error { " error" } else { "" };
            let _ = writeln!(
                out,
                "  tool_result {}{linked} ({state}{error}): {}",
                result.tool_call_id, result.content
            );
        }
    }
}

// Parsed input when available, else the repaired preview, else raw text.
fn input(call: &ToolCallPart) -> String {
    match call.resolved_input() {
        ParseOutcome::Value(value) => value.to_string(),
        ParseOutcome::Incomplete if call.malformed => format!("raw {:?}", call.raw_arguments()),
        ParseOutcome::Incomplete => call
            .preview_input()
            .map(|value| format!("partial {value}"))
            .unwrap_or_else(|| format!("raw {:?}", call.raw_arguments())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstream_core::{Chunk, Conversation, EngineConfig, Role};
    use serde_json::json;

    #[test]
    fn renders_parts_approvals_and_diagnostics() {
        let mut conv = Conversation::new(EngineConfig::default());
        for chunk in [
            Chunk::message_start("m1", Role::Assistant),
            Chunk::text("m1", "Deleting"),
            Chunk::tool_call_start("t1", "delete_file"),
            Chunk::tool_call_end("t1", Some(json!({"path": "/tmp/x"}))),
            Chunk::ApprovalRequested {
                tool_call_id: "t1".into(),
                approval_id: Some("ap-1".into()),
            },
            Chunk::message_end("m1"),
            Chunk::message_end("m404"),
        ] {
            let _ = conv.apply(chunk);
        }
        let text = render(&conv.snapshot());
        assert!(text.contains("[assistant m1] complete"));
        assert!(text.contains("  text: Deleting"));
        assert!(text.contains("tool_call t1 delete_file (approval_requested): {\"path\":\"/tmp/x\"}"));
        assert!(text.contains("approval ap-1: pending"));
        assert!(text.contains("protocol_violation [m404]"));
    }

    #[test]
    fn streaming_arguments_render_as_partial_preview() {
        let mut conv = Conversation::new(EngineConfig::default());
        for chunk in [
            Chunk::message_start("m1", Role::Assistant),
            Chunk::tool_call_start("t1", "search"),
            Chunk::tool_call_args("t1", "{\"q\":\"rust"),
        ] {
            conv.apply(chunk).expect("apply");
        }
        let text = render(&conv.snapshot());
        assert!(text.contains("[assistant m1] streaming"));
        assert!(text.contains("(streaming): partial {\"q\":\"rust\"}"));
    }
}
