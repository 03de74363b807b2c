use std::fmt;

/// Template compile failure: the caller aborts at startup with this
/// message, which carries up to 30 bytes of context around the fault.
#[derive(Debug, Clone, thiserror::Error)]
pub struct CompileError {
    message: String,
    context: Option<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
        }
    }

    /// Attaches up to 30 bytes of template context around the fault,
    /// truncating on a char boundary.
    pub fn with_context(mut self, template: &str, around: usize) -> Self {
        let start = around.saturating_sub(15);
        let end = (around + 15).min(template.len());
        let mut start = start.min(template.len());
        while start > 0 && !template.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = end.min(template.len());
        while end < template.len() && !template.is_char_boundary(end) {
            end += 1;
        }
        self.context = Some(template[start..end].to_string());
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}: near \"{}\"", self.message, ctx),
            None => write!(f, "{}", self.message),
        }
    }
}
