// src/engine/session.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    engine::{
        EngineError,
        answers::AnswerSheet,
        navigator::{MODULE_SLOTS, ModuleNavigator, Position},
        timer::{ModuleDurations, ModuleTimer},
        view::{self, SessionView},
    },
    models::question::{Question, QuestionFormat},
};

/// The frozen product of a finished attempt: the ordered question
/// snapshot, the answer record, and the review marks. Everything the
/// scorer and the persisted result need; the live session is discarded
/// once this is taken.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub questions: Vec<Question>,
    pub answers: HashMap<i64, String>,
    pub marked: Vec<i64>,
    pub started_at: DateTime<Utc>,
}

/// One running attempt: loaded modules, navigator, answer sheet and the
/// per-module countdown, threaded through pure transition functions.
/// Every public operation takes the current instant so timer expiry is
/// applied before the action and transitions stay deterministic.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub attempt_id: Uuid,
    pub user_id: i64,
    pub test_id: i64,

    /// Set when the attempt runs inside a proctored session.
    pub proctor_session_id: Option<i64>,
    pub participant_id: Option<i64>,

    modules: [Vec<Question>; MODULE_SLOTS],
    navigator: ModuleNavigator,
    sheet: AnswerSheet,
    timer: ModuleTimer,
    durations: ModuleDurations,
    started_at: DateTime<Utc>,
}

impl TestSession {
    /// Groups the fetched questions by module slot, sorts each module by
    /// question number and enters the first non-empty module with its
    /// countdown armed. Fails with `EmptyTest` when nothing is loadable.
    pub fn start(
        user_id: i64,
        test_id: i64,
        questions: Vec<Question>,
        durations: ModuleDurations,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let mut modules: [Vec<Question>; MODULE_SLOTS] = std::array::from_fn(|_| Vec::new());
        for q in questions {
            let slot = (q.module as usize).saturating_sub(1);
            if slot < MODULE_SLOTS {
                modules[slot].push(q);
            }
        }
        for module in &mut modules {
            module.sort_by_key(|q| q.number);
        }

        let lengths = [
            modules[0].len(),
            modules[1].len(),
            modules[2].len(),
            modules[3].len(),
        ];
        let navigator = ModuleNavigator::new(lengths)?;

        let mut timer = ModuleTimer::new();
        if let Some(slot) = navigator.current_module() {
            timer.start(durations.for_slot(slot), now);
        }

        Ok(Self {
            attempt_id: Uuid::new_v4(),
            user_id,
            test_id,
            proctor_session_id: None,
            participant_id: None,
            modules,
            navigator,
            sheet: AnswerSheet::new(),
            timer,
            durations,
            started_at: now,
        })
    }

    pub fn in_proctored_session(mut self, session_id: i64, participant_id: i64) -> Self {
        self.proctor_session_id = Some(session_id);
        self.participant_id = Some(participant_id);
        self
    }

    /// Apply timer expiry before any interaction: reaching zero is the
    /// same transition as an explicit module finish. Stopping the timer
    /// here makes the forced finish one-shot; a stopped timer cannot
    /// expire again.
    fn poll(&mut self, now: DateTime<Utc>) {
        if matches!(self.navigator.position(), Position::Question { .. })
            && self.timer.is_expired(now)
        {
            let _ = self.navigator.finish_module();
            self.timer.stop();
        }
    }

    pub fn position(&self) -> Position {
        self.navigator.position()
    }

    pub fn is_finished(&self) -> bool {
        self.navigator.position() == Position::Finished
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.navigator.position() {
            Position::Question { module, index } => self.modules[module].get(index),
            _ => None,
        }
    }

    /// Store an answer for the displayed question. Multiple-choice
    /// values must be one of the question's option labels.
    pub fn answer(&mut self, value: String, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.poll(now);
        let question = self.current_question().ok_or(EngineError::WrongState)?;
        if question.format == QuestionFormat::MultipleChoice
            && !question.options.contains_key(&value)
        {
            return Err(EngineError::UnknownOption);
        }
        let id = question.id;
        self.sheet.set_answer(id, value);
        Ok(())
    }

    /// Clear the displayed question's answer; it reads as unanswered.
    pub fn clear_answer(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.poll(now);
        let id = self.current_question().ok_or(EngineError::WrongState)?.id;
        self.sheet.clear_answer(id);
        Ok(())
    }

    /// Toggle the review mark on the displayed question.
    pub fn toggle_mark(&mut self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        self.poll(now);
        let id = self.current_question().ok_or(EngineError::WrongState)?.id;
        Ok(self.sheet.toggle_mark(id))
    }

    /// Strike an option through on the displayed question; striking the
    /// selected option clears the stored answer.
    pub fn toggle_elimination(
        &mut self,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        self.poll(now);
        let question = self.current_question().ok_or(EngineError::WrongState)?;
        if question.format != QuestionFormat::MultipleChoice
            || !question.options.contains_key(label)
        {
            return Err(EngineError::UnknownOption);
        }
        let id = question.id;
        Ok(self.sheet.toggle_elimination(id, label))
    }

    pub fn next(&mut self, now: DateTime<Utc>) {
        self.poll(now);
        self.navigator.next();
    }

    pub fn back(&mut self, now: DateTime<Utc>) {
        self.poll(now);
        self.navigator.back();
    }

    pub fn jump(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.poll(now);
        self.navigator.jump(index)
    }

    /// Explicitly finish the module: freeze the timer and enter review.
    pub fn finish_module(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.poll(now);
        self.navigator.finish_module()?;
        self.timer.stop();
        Ok(())
    }

    /// Re-enter a question of the module under review. The countdown
    /// stays frozen; it was stopped at module end.
    pub fn revisit(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.poll(now);
        self.navigator.revisit(index)
    }

    /// Confirm the review screen: advance to the next non-empty module
    /// (arming its countdown) or finish the attempt.
    pub fn confirm_review(&mut self, now: DateTime<Utc>) -> Result<Position, EngineError> {
        self.poll(now);
        let position = self.navigator.confirm()?;
        match position {
            Position::Question { module, .. } => {
                self.timer.start(self.durations.for_slot(module), now);
            }
            _ => self.timer.stop(),
        }
        Ok(position)
    }

    /// Project the current state into the rendered pane.
    pub fn view(&mut self, now: DateTime<Utc>) -> SessionView {
        self.poll(now);
        view::project(
            self.attempt_id,
            &self.modules,
            &self.navigator,
            &self.sheet,
            &self.timer,
            now,
        )
    }

    /// Take the frozen outcome. Only available once `Finished`.
    pub fn outcome(&self) -> Result<SessionOutcome, EngineError> {
        if !self.is_finished() {
            return Err(EngineError::WrongState);
        }
        let questions: Vec<Question> = self.modules.iter().flatten().cloned().collect();
        Ok(SessionOutcome {
            questions,
            answers: self.sheet.answers().clone(),
            marked: self.sheet.marked_ids(),
            started_at: self.started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use std::collections::BTreeMap;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn choice(id: i64, module: i16, number: i32, answer: &str) -> Question {
        let mut options = BTreeMap::new();
        for label in ["A", "B", "C", "D"] {
            options.insert(label.to_string(), format!("Option {label}"));
        }
        Question {
            id,
            test_id: 1,
            module,
            number,
            format: QuestionFormat::MultipleChoice,
            prompt: format!("Question {number}"),
            stimulus: None,
            image_url: None,
            image_width: None,
            image_pos: None,
            options: Json(options),
            answer: answer.to_string(),
            domain: "Algebra".to_string(),
            skill: "Linear equations".to_string(),
            points: 1,
            explanation: None,
            created_at: None,
        }
    }

    fn durations() -> ModuleDurations {
        ModuleDurations::from_minutes(32, 35)
    }

    fn two_module_session() -> TestSession {
        let questions = vec![
            choice(1, 1, 1, "A"),
            choice(2, 1, 2, "B"),
            choice(3, 3, 1, "C"),
        ];
        TestSession::start(10, 1, questions, durations(), at(0)).unwrap()
    }

    #[test]
    fn questions_are_sorted_within_modules() {
        let questions = vec![choice(2, 1, 2, "B"), choice(1, 1, 1, "A")];
        let session = TestSession::start(10, 1, questions, durations(), at(0)).unwrap();
        assert_eq!(session.current_question().unwrap().id, 1);
    }

    #[test]
    fn no_questions_is_a_load_error() {
        let err = TestSession::start(10, 1, vec![], durations(), at(0)).unwrap_err();
        assert_eq!(err, EngineError::EmptyTest);
    }

    #[test]
    fn timer_expiry_forces_review_exactly_once() {
        let mut session = two_module_session();
        session.answer("A".to_string(), at(5)).unwrap();

        // Well past the 32-minute verbal countdown.
        let late = at(40 * 60);
        session.next(late);
        assert_eq!(session.position(), Position::Review { module: 0 });

        // The forced finish stopped the clock; later interactions stay
        // on the review screen instead of re-triggering expiry.
        session.revisit(1, at(41 * 60)).unwrap();
        assert_eq!(
            session.position(),
            Position::Question {
                module: 0,
                index: 1
            }
        );
    }

    #[test]
    fn expiry_blocks_the_pending_answer_write() {
        let mut session = two_module_session();
        let err = session
            .answer("A".to_string(), at(40 * 60))
            .unwrap_err();
        assert_eq!(err, EngineError::WrongState);
    }

    #[test]
    fn confirm_restarts_the_countdown_for_the_next_module() {
        let mut session = two_module_session();
        session.finish_module(at(60)).unwrap();
        session.confirm_review(at(90)).unwrap();

        // Entered the quantitative module: fresh 35-minute countdown,
        // calculator available.
        let view = session.view(at(90));
        assert_eq!(view.timer, "35:00");
        assert!(view.calculator_enabled);
    }

    #[test]
    fn multiple_choice_answers_are_label_checked() {
        let mut session = two_module_session();
        let err = session.answer("E".to_string(), at(1)).unwrap_err();
        assert_eq!(err, EngineError::UnknownOption);
    }

    #[test]
    fn outcome_only_after_finish_and_snapshot_is_ordered() {
        let mut session = two_module_session();
        assert_eq!(session.outcome().unwrap_err(), EngineError::WrongState);

        session.answer("A".to_string(), at(1)).unwrap();
        session.finish_module(at(2)).unwrap();
        session.confirm_review(at(3)).unwrap();
        session.answer("C".to_string(), at(4)).unwrap();
        session.finish_module(at(5)).unwrap();
        assert_eq!(session.confirm_review(at(6)).unwrap(), Position::Finished);

        let outcome = session.outcome().unwrap();
        let ids: Vec<i64> = outcome.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(outcome.answers.len(), 2);
    }
}
