// File: ./src/model/reminder.rs
use super::checklist::ChecklistLine;
use super::due::DueDate;
use super::title_key;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named list of reminders. One list corresponds to one watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDescriptor {
    pub id: String,
    pub name: String,
}

impl ListDescriptor {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// One item owned by the reminders store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub due: Option<DueDate>,
    pub last_modified: DateTime<Utc>,
    pub list_name: String,

    #[serde(default)]
    pub notes: Option<String>,
    // 0 = none, 1 = highest .. 9 = lowest
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    /// Trigger time of the reminder's alert, if it has one.
    #[serde(default)]
    pub alarm: Option<NaiveDateTime>,
}

impl ReminderRecord {
    /// Normalized title used to pair this record with a checklist line.
    pub fn key(&self) -> String {
        title_key(&self.title)
    }

    /// Sets the completion flag and keeps `completion_date` consistent with it.
    pub fn set_completed(&mut self, completed: bool) {
        if self.completed == completed {
            return;
        }
        self.completed = completed;
        self.completion_date = if completed { Some(Utc::now()) } else { None };
    }

    /// Makes sure a timed due date has an alert. Returns true if the record changed.
    pub fn ensure_alarm(&mut self) -> bool {
        if let Some(DueDate::At(at)) = self.due
            && self.alarm.is_none()
        {
            self.alarm = Some(at);
            return true;
        }
        false
    }

    /// The checklist line that represents this record in a file.
    pub fn to_checklist_line(&self) -> ChecklistLine {
        ChecklistLine::new(&self.key(), self.completed, self.due)
    }
}

/// Fields needed to create a record; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub title: String,
    pub completed: bool,
    pub due: Option<DueDate>,
    pub alarm: Option<NaiveDateTime>,
}

impl NewReminder {
    pub fn new(title: &str, completed: bool, due: Option<DueDate>) -> Self {
        let alarm = match due {
            Some(DueDate::At(at)) => Some(at),
            _ => None,
        };
        Self {
            title: title.to_string(),
            completed,
            due,
            alarm,
        }
    }

    pub fn from_line(line: &ChecklistLine) -> Self {
        Self::new(&line.text, line.completed, line.due)
    }

    /// Materializes the draft into a record on `list`.
    pub fn into_record(self, list: &ListDescriptor, now: DateTime<Utc>) -> ReminderRecord {
        ReminderRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title,
            completed: self.completed,
            due: self.due,
            last_modified: now,
            list_name: list.name.clone(),
            notes: None,
            priority: 0,
            completion_date: if self.completed { Some(now) } else { None },
            alarm: self.alarm,
        }
    }
}
