//! Schema subcommand: print message and enum declarations.

use crate::config::format_value;
use crate::format::OutputFormat;
use crate::schema::{EnumDescriptor, FieldDescriptor, MessageDescriptor, SchemaRegistry};
use clap::Args;
use std::fmt::Write as _;

/// Arguments for the schema subcommand
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Message or enum to describe (default: every message)
    #[arg(value_name = "MESSAGE")]
    pub message: Option<String>,
}

/// Describe one type, or every message when `name` is `None`.
pub fn describe(
    schema: &SchemaRegistry,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<String, String> {
    let Some(name) = name else {
        let messages: Vec<&MessageDescriptor> = schema.messages().collect();
        return Ok(match format {
            OutputFormat::Text => messages
                .iter()
                .map(|m| message_text(m))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Json => to_json(&messages),
        });
    };

    if let Some(message) = schema.message(name) {
        return Ok(match format {
            OutputFormat::Text => message_text(message),
            OutputFormat::Json => to_json(message),
        });
    }
    if let Some(enum_type) = schema.enum_type(name) {
        return Ok(match format {
            OutputFormat::Text => enum_text(enum_type),
            OutputFormat::Json => to_json(enum_type),
        });
    }
    Err(format!("unknown message or enum '{}'", name))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string())
}

fn message_text(message: &MessageDescriptor) -> String {
    let mut out = format!("message {} {{\n", message.name);
    let groups = message.oneof_groups();

    for field in message.fields.iter().filter(|f| f.oneof.is_none()) {
        let _ = writeln!(out, "  {}", field_line(field));
    }
    for group in groups {
        let marker = if message.is_selector(group) {
            " // task selector"
        } else {
            ""
        };
        let _ = writeln!(out, "  oneof {} {{{}", group, marker);
        for field in message.oneof_members(group) {
            let _ = writeln!(out, "    {}", field_line(field));
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

fn field_line(field: &FieldDescriptor) -> String {
    let label = if field.is_repeated() {
        "repeated "
    } else if field.required {
        "required "
    } else if field.oneof.is_none() {
        "optional "
    } else {
        ""
    };
    let mut options = Vec::new();
    if let Some(default) = &field.default {
        options.push(format!("default = {}", format_value(default)));
    }
    if let Some(bounds) = &field.bounds {
        options.push(format!("range = [{}, {}]", bounds.min, bounds.max));
    }
    if field.repeated_merge == crate::schema::RepeatedMerge::Append {
        options.push("merge = append".to_string());
    }
    let options = if options.is_empty() {
        String::new()
    } else {
        format!(" [{}]", options.join(", "))
    };
    format!(
        "{}{} {} = {}{};",
        label,
        field.field_type.display_name(),
        field.name,
        field.tag,
        options
    )
}

fn enum_text(enum_type: &EnumDescriptor) -> String {
    let mut out = format!("enum {} {{\n", enum_type.name);
    for (symbol, number) in &enum_type.values {
        let _ = writeln!(out, "  {} = {};", symbol, number);
    }
    out.push_str("}\n");
    out
}
