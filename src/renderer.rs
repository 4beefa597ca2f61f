//! Variable substitution for notification titles and bodies.
//!
//! Templates use the `{{ .Vars.name }}` action syntax the template service
//! stores. Trim markers (`{{- ` and ` -}}`) strip adjacent whitespace and
//! `{{/* ... */}}` is a comment. Any other action is a parse error.
//!
//! A variable the job did not supply renders as empty text. Values are
//! inserted verbatim; unlike Go's `html/template`, nothing is HTML-escaped,
//! since push payloads are plain text.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    error::RenderError,
    models::template::{NotificationTemplate, RenderedTemplate},
};

const VARS_PREFIX: &str = ".Vars.";

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Variable(&'a str),
}

pub fn render_template(
    template: &NotificationTemplate,
    variables: &HashMap<String, String>,
) -> Result<RenderedTemplate, RenderError> {
    debug!(variable_count = variables.len(), "Rendering template");

    let title = render("title", &template.title, variables)?;
    let body = render("body", &template.body, variables)?;

    Ok(RenderedTemplate { title, body })
}

pub fn render(
    field: &'static str,
    source: &str,
    variables: &HashMap<String, String>,
) -> Result<String, RenderError> {
    let segments = parse(field, source)?;
    let mut output = String::with_capacity(source.len());

    for segment in segments {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Variable(name) => match variables.get(name) {
                Some(value) => output.push_str(value),
                None => warn!(
                    field,
                    missing_variable = name,
                    "Template references unknown variable, rendering it empty"
                ),
            },
        }
    }

    Ok(output)
}

fn parse<'a>(field: &'static str, source: &'a str) -> Result<Vec<Segment<'a>>, RenderError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_leading = false;

    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        if trim_leading {
            text = text.trim_start();
        }

        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| parse_error(field, "unclosed action"))?;
        let mut inner = &after_open[..close];

        if let Some(stripped) = inner.strip_prefix('-') {
            if stripped.starts_with(char::is_whitespace) {
                text = text.trim_end();
                inner = stripped;
            }
        }

        trim_leading = false;
        if let Some(stripped) = inner.strip_suffix('-') {
            if stripped.ends_with(char::is_whitespace) {
                trim_leading = true;
                inner = stripped;
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        let action = inner.trim();
        if action.starts_with("/*") {
            if action.len() < 4 || !action.ends_with("*/") {
                return Err(parse_error(field, "unclosed comment"));
            }
        } else {
            segments.push(Segment::Variable(parse_action(field, action)?));
        }

        rest = &after_open[close + 2..];
    }

    let tail = if trim_leading { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        segments.push(Segment::Text(tail));
    }

    Ok(segments)
}

fn parse_action<'a>(field: &'static str, action: &'a str) -> Result<&'a str, RenderError> {
    if action.is_empty() {
        return Err(parse_error(field, "empty action"));
    }

    let Some(name) = action.strip_prefix(VARS_PREFIX) else {
        return Err(parse_error(field, &format!("unsupported action '{}'", action)));
    };

    if !is_identifier(name) {
        return Err(parse_error(
            field,
            &format!("invalid variable reference '{}'", action),
        ));
    }

    Ok(name)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn parse_error(field: &'static str, reason: &str) -> RenderError {
    RenderError::Parse {
        field,
        reason: reason.to_string(),
    }
}
