/// Cleans client-supplied text (request text, feedback) before it reaches
/// the registry or a prompt.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_message_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_message_length: 100_000,
        }
    }
}

impl Sanitizer {
    pub fn new(max_message_length: usize) -> Self {
        Self { max_message_length }
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Strip control characters (newlines and tabs survive) and enforce the
    /// length limit.
    pub fn sanitize(&self, input: &str) -> SanitizeResult {
        if input.len() > self.max_message_length {
            return SanitizeResult::Rejected(format!(
                "input exceeds {} bytes",
                self.max_message_length
            ));
        }

        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
            .collect();

        if cleaned.trim().is_empty() {
            return SanitizeResult::Rejected("input is empty".to_string());
        }

        if cleaned != input {
            SanitizeResult::Cleaned(cleaned)
        } else {
            SanitizeResult::Clean(cleaned)
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum SanitizeResult {
    /// Input was already clean.
    Clean(String),
    /// Control characters were removed.
    Cleaned(String),
    /// Input was rejected, with the reason.
    Rejected(String),
}

impl SanitizeResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, SanitizeResult::Rejected(_))
    }

    /// The usable text, or the rejection reason.
    pub fn into_result(self) -> Result<String, String> {
        match self {
            SanitizeResult::Clean(s) | SanitizeResult::Cleaned(s) => Ok(s),
            SanitizeResult::Rejected(reason) => Err(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_input() {
        let s = Sanitizer::default();
        let result = s.sanitize("Plan a trip to Madinah\nfor 14 days");
        assert!(matches!(result, SanitizeResult::Clean(_)));
    }

    #[test]
    fn test_control_chars_stripped() {
        let s = Sanitizer::default();
        let result = s.sanitize("Plan\x00 a\x1b trip");
        assert_eq!(result, SanitizeResult::Cleaned("Plan a trip".to_string()));
    }

    #[test]
    fn test_length_rejection() {
        let s = Sanitizer::new(10);
        assert!(s.sanitize("This is too long for the limit").is_rejected());
    }

    #[test]
    fn test_only_control_chars_rejected() {
        let s = Sanitizer::default();
        assert_eq!(
            s.sanitize("\x00\x01").into_result(),
            Err("input is empty".to_string())
        );
        assert!(s.sanitize("   ").is_rejected());
    }
}
