use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkStatus {
    Attended,
    Missed,
}

/// One tracked course. A date lives in at most one of the two day sets;
/// `apply_mark` is the only transition and preserves that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub attended_days: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub missed_days: BTreeSet<NaiveDate>,
}

impl Course {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            attended_days: BTreeSet::new(),
            missed_days: BTreeSet::new(),
        }
    }

    /// Set the status of `date`, clearing it from the opposite set. Marking
    /// an already-marked date with the same status re-commits it unchanged.
    pub fn apply_mark(&mut self, date: NaiveDate, status: MarkStatus) {
        match status {
            MarkStatus::Attended => {
                self.missed_days.remove(&date);
                self.attended_days.insert(date);
            }
            MarkStatus::Missed => {
                self.attended_days.remove(&date);
                self.missed_days.insert(date);
            }
        }
    }

    pub fn sets_disjoint(&self) -> bool {
        self.attended_days.is_disjoint(&self.missed_days)
    }

    /// Attended share of all tracked days, rounded to the nearest integer.
    pub fn percentage(&self) -> u32 {
        let total = self.attended_days.len() + self.missed_days.len();
        if total == 0 {
            return 0;
        }
        (100.0 * self.attended_days.len() as f64 / total as f64).round() as u32
    }
}

/// One semester row of the CGPA calculator. Both numeric fields are kept as
/// the user typed them; a row with either field blank is a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Semester {
    pub id: String,
    #[serde(default)]
    pub sgpa: String,
    #[serde(default)]
    pub credits: String,
}

impl Semester {
    pub fn blank() -> Self {
        Self {
            id: format!("sem-{}", uuid::Uuid::new_v4()),
            sgpa: String::new(),
            credits: String::new(),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.sgpa.trim().is_empty() || self.credits.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CgpaData {
    #[serde(default)]
    pub semesters: Vec<Semester>,
}

impl CgpaData {
    /// Drop draft rows before persisting; drafts are view state, not data.
    pub fn filtered_for_save(&self) -> CgpaData {
        CgpaData {
            semesters: self
                .semesters
                .iter()
                .filter(|s| !s.is_draft())
                .cloned()
                .collect(),
        }
    }

    /// The UI always shows at least one semester card, so an empty collection
    /// gains a synthesized blank row. The placeholder is never persisted.
    pub fn with_placeholder(mut self) -> CgpaData {
        if self.semesters.is_empty() {
            self.semesters.push(Semester::blank());
        }
        self
    }
}
