// src/engine/answers.rs

use std::collections::{BTreeSet, HashMap, HashSet};

/// In-memory answer record for one running attempt: question id ->
/// submitted value, plus the mark-for-review set and per-question
/// eliminated option labels.
///
/// Created empty at session start, mutated only by direct student
/// interaction, and flushed into the persisted result at completion.
#[derive(Debug, Clone, Default)]
pub struct AnswerSheet {
    answers: HashMap<i64, String>,
    marked: HashSet<i64>,
    eliminated: HashMap<i64, BTreeSet<String>>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an answer. Writing the same value twice leaves the sheet
    /// identical to writing it once.
    pub fn set_answer(&mut self, question_id: i64, value: String) {
        self.answers.insert(question_id, value);
    }

    /// Remove the stored answer entirely; the question reads as
    /// unanswered afterwards, never as an empty string.
    pub fn clear_answer(&mut self, question_id: i64) {
        self.answers.remove(&question_id);
    }

    pub fn answer(&self, question_id: i64) -> Option<&str> {
        self.answers.get(&question_id).map(String::as_str)
    }

    pub fn is_answered(&self, question_id: i64) -> bool {
        self.answers.contains_key(&question_id)
    }

    /// Flip the review mark; returns the new state.
    pub fn toggle_mark(&mut self, question_id: i64) -> bool {
        if self.marked.remove(&question_id) {
            false
        } else {
            self.marked.insert(question_id);
            true
        }
    }

    pub fn is_marked(&self, question_id: i64) -> bool {
        self.marked.contains(&question_id)
    }

    /// Strike an option label through, or undo the strike. Eliminating
    /// the currently selected option also deletes the stored answer.
    /// Returns whether the label is now eliminated.
    pub fn toggle_elimination(&mut self, question_id: i64, label: &str) -> bool {
        let struck = self.eliminated.entry(question_id).or_default();
        if struck.remove(label) {
            return false;
        }
        struck.insert(label.to_string());
        if self.answer(question_id) == Some(label) {
            self.clear_answer(question_id);
        }
        true
    }

    pub fn is_eliminated(&self, question_id: i64, label: &str) -> bool {
        self.eliminated
            .get(&question_id)
            .is_some_and(|s| s.contains(label))
    }

    pub fn answers(&self) -> &HashMap<i64, String> {
        &self.answers
    }

    /// Marked question ids in stable order, for the persisted snapshot.
    pub fn marked_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.marked.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_the_same_answer_twice_is_idempotent() {
        let mut sheet = AnswerSheet::new();
        sheet.set_answer(7, "B".to_string());
        let once = sheet.answers().clone();
        sheet.set_answer(7, "B".to_string());
        assert_eq!(sheet.answers(), &once);
    }

    #[test]
    fn clearing_removes_the_entry_entirely() {
        let mut sheet = AnswerSheet::new();
        sheet.set_answer(3, "A".to_string());
        sheet.clear_answer(3);
        assert!(!sheet.is_answered(3));
        assert_eq!(sheet.answer(3), None);
        assert!(sheet.answers().is_empty());
    }

    #[test]
    fn eliminating_selected_option_clears_the_answer() {
        let mut sheet = AnswerSheet::new();
        sheet.set_answer(5, "C".to_string());
        assert!(sheet.toggle_elimination(5, "C"));
        assert!(!sheet.is_answered(5));
        assert!(sheet.is_eliminated(5, "C"));
    }

    #[test]
    fn eliminating_other_options_keeps_the_answer() {
        let mut sheet = AnswerSheet::new();
        sheet.set_answer(5, "C".to_string());
        sheet.toggle_elimination(5, "A");
        assert_eq!(sheet.answer(5), Some("C"));
    }

    #[test]
    fn elimination_toggles_off() {
        let mut sheet = AnswerSheet::new();
        assert!(sheet.toggle_elimination(9, "D"));
        assert!(!sheet.toggle_elimination(9, "D"));
        assert!(!sheet.is_eliminated(9, "D"));
    }

    #[test]
    fn marks_toggle_and_list_in_order() {
        let mut sheet = AnswerSheet::new();
        assert!(sheet.toggle_mark(4));
        assert!(sheet.toggle_mark(2));
        assert!(!sheet.toggle_mark(4));
        assert_eq!(sheet.marked_ids(), vec![2]);
    }
}
