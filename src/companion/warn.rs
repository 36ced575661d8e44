use crate::error::DiagCode;

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Structured diagnostic for a non-fatal failure.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic<'a> {
    pub code: DiagCode,
    pub stage: &'a str,
    pub action: &'a str,
    pub session: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

impl Diagnostic<'_> {
    pub fn render(&self) -> String {
        format!(
            "COMPANION_WARN code={} stage={} action={} session={} reason={} err={}",
            self.code.as_str(),
            sanitize_value(self.stage),
            sanitize_value(self.action),
            sanitize_value(self.session),
            sanitize_value(self.reason),
            sanitize_value(self.err),
        )
    }
}

pub fn emit(diag: Diagnostic<'_>) {
    eprintln!("{}", diag.render());
}
