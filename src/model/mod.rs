// File: ./src/model/mod.rs
pub mod checklist;
pub mod due;
pub mod reminder;

pub use checklist::ChecklistLine;
pub use due::DueDate;
pub use reminder::{ListDescriptor, NewReminder, ReminderRecord};

/// Normalizes a title for matching: whitespace runs collapse to one space, ends are trimmed.
pub fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::title_key;

    #[test]
    fn test_title_key_collapses_whitespace() {
        assert_eq!(title_key("  Buy \t milk  "), "Buy milk");
        assert_eq!(title_key("Buy milk"), "Buy milk");
        assert_eq!(title_key("Line\nbreak"), "Line break");
    }
}
