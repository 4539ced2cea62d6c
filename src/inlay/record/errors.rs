//! Ordered validation error bag, one entry per (attribute, message) pair.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub attribute: String,
    pub message: String,
}

/// Collects validation messages in the order they were added. Nested failures
/// from embedded members use indexed attribute paths such as
/// `projects[1].title`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    entries: Vec<ErrorEntry>,
}

impl Errors {
    pub fn add(&mut self, attribute: &str, message: &str) {
        self.entries.push(ErrorEntry {
            attribute: attribute.to_string(),
            message: message.to_string(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// Messages recorded for one attribute path.
    pub fn on(&self, attribute: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.attribute == attribute)
            .map(|entry| entry.message.as_str())
            .collect()
    }

    /// `"title can't be blank"`-style sentences, in insertion order.
    pub fn full_messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| format!("{} {}", entry.attribute, entry.message))
            .collect()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_messages_in_insertion_order() {
        let mut errors = Errors::default();
        errors.add("title", "can't be blank");
        errors.add("count", "is not a number");
        errors.add("title", "is too short");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.on("title"), vec!["can't be blank", "is too short"]);
        assert_eq!(
            errors.full_messages(),
            vec![
                "title can't be blank",
                "count is not a number",
                "title is too short"
            ]
        );
    }

    #[test]
    fn clear_empties_the_bag() {
        let mut errors = Errors::default();
        errors.add("title", "can't be blank");
        errors.clear();
        assert!(errors.is_empty());
    }
}
