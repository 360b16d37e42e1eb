//! Text filter over the process table

use crate::record::ProcessRecord;

/// Case-insensitive substring match on the name, or substring match on the
/// decimal pid. Blank text matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessFilter {
    text: String,
    lowered: String,
}

impl ProcessFilter {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let lowered = text.to_lowercase();
        Self { text, lowered }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn matches(&self, pid: u32, name: &str) -> bool {
        if self.is_blank() {
            return true;
        }
        name.to_lowercase().contains(&self.lowered) || pid.to_string().contains(&self.text)
    }

    pub fn matches_record(&self, record: &ProcessRecord) -> bool {
        self.matches(record.pid(), record.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pid_or_name_substring() {
        let filter = ProcessFilter::new("34");
        assert!(filter.matches(1341, "x"));
        assert!(filter.matches(99, "y34z"));
        assert!(!filter.matches(99, "y3z"));
    }

    #[test]
    fn test_name_match_ignores_case() {
        let filter = ProcessFilter::new("FireFox");
        assert!(filter.matches(10, "firefox-esr"));
        assert!(filter.matches(11, "FIREFOX"));
        assert!(!filter.matches(12, "chrome"));
    }

    #[test]
    fn test_blank_filter_matches_everything() {
        assert!(ProcessFilter::default().matches(1, "init"));
        assert!(ProcessFilter::new("   ").matches(2, "kthreadd"));
    }
}
