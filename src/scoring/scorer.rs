// src/scoring/scorer.rs

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    models::question::{Question, QuestionFormat},
    scoring::scale::ScaleTable,
};

/// Raw and scaled outcome for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionScore {
    pub raw: i32,
    pub total: i32,
    pub scaled: i32,
}

/// Complete score for an attempt. Verbal spans modules 1-2,
/// quantitative modules 3-4; the total is the sum of the two scaled
/// section scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub verbal: SectionScore,
    pub quant: SectionScore,
    pub total_scaled: i32,
}

/// Correct/total tally per content domain, for reports and analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DomainTally {
    pub domain: String,
    pub correct: i32,
    pub total: i32,
}

/// Normalize free-text answers for comparison: uppercase, collapse
/// whitespace, trim.
pub fn normalize_text(text: &str) -> String {
    text.to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the recorded answer matches the key. A missing or
/// mismatched entry counts incorrect, never as an error.
pub fn is_correct(question: &Question, answers: &HashMap<i64, String>) -> bool {
    let Some(given) = answers.get(&question.id) else {
        return false;
    };
    match question.format {
        QuestionFormat::MultipleChoice => given == &question.answer,
        QuestionFormat::FillIn => normalize_text(given) == normalize_text(&question.answer),
    }
}

/// Score an attempt. Pure: identical inputs always produce identical
/// outputs, and no I/O happens here.
pub fn score(
    questions: &[Question],
    answers: &HashMap<i64, String>,
    table: &ScaleTable,
) -> ScoreSummary {
    let mut verbal = (0, 0);
    let mut quant = (0, 0);

    for question in questions {
        let bucket = if question.is_quantitative() {
            &mut quant
        } else {
            &mut verbal
        };
        bucket.1 += 1;
        if is_correct(question, answers) {
            bucket.0 += 1;
        }
    }

    let verbal = SectionScore {
        raw: verbal.0,
        total: verbal.1,
        scaled: table.scaled(verbal.0, verbal.1),
    };
    let quant = SectionScore {
        raw: quant.0,
        total: quant.1,
        scaled: table.scaled(quant.0, quant.1),
    };

    ScoreSummary {
        verbal,
        quant,
        total_scaled: verbal.scaled + quant.scaled,
    }
}

/// Correct/total per domain, in domain name order.
pub fn domain_tallies(questions: &[Question], answers: &HashMap<i64, String>) -> Vec<DomainTally> {
    let mut tallies: BTreeMap<&str, (i32, i32)> = BTreeMap::new();
    for question in questions {
        let entry = tallies.entry(question.domain.as_str()).or_default();
        entry.1 += 1;
        if is_correct(question, answers) {
            entry.0 += 1;
        }
    }
    tallies
        .into_iter()
        .map(|(domain, (correct, total))| DomainTally {
            domain: domain.to_string(),
            correct,
            total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use std::collections::BTreeMap;

    fn question(id: i64, module: i16, number: i32, format: QuestionFormat, answer: &str) -> Question {
        let options = match format {
            QuestionFormat::MultipleChoice => {
                let mut map = BTreeMap::new();
                for label in ["A", "B", "C", "D"] {
                    map.insert(label.to_string(), format!("Option {label}"));
                }
                map
            }
            QuestionFormat::FillIn => BTreeMap::new(),
        };
        Question {
            id,
            test_id: 1,
            module,
            number,
            format,
            prompt: String::new(),
            stimulus: None,
            image_url: None,
            image_width: None,
            image_pos: None,
            options: Json(options),
            answer: answer.to_string(),
            domain: if module >= 3 { "Algebra" } else { "Craft and Structure" }.to_string(),
            skill: String::new(),
            points: 1,
            explanation: None,
            created_at: None,
        }
    }

    /// Module sizes [2, 0, 1, 1]: Q1 right, Q2 wrong, the quantitative
    /// single answered right, the last left blank.
    fn worked_example() -> (Vec<Question>, HashMap<i64, String>) {
        let questions = vec![
            question(1, 1, 1, QuestionFormat::MultipleChoice, "A"),
            question(2, 1, 2, QuestionFormat::MultipleChoice, "B"),
            question(3, 3, 1, QuestionFormat::MultipleChoice, "C"),
            question(4, 4, 1, QuestionFormat::FillIn, "12"),
        ];
        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());
        answers.insert(2, "C".to_string());
        answers.insert(3, "C".to_string());
        (questions, answers)
    }

    #[test]
    fn sections_split_and_blanks_count_incorrect() {
        let (questions, answers) = worked_example();
        let summary = score(&questions, &answers, &ScaleTable::default());

        assert_eq!(summary.verbal.raw, 1);
        assert_eq!(summary.verbal.total, 2);
        assert_eq!(summary.quant.raw, 1);
        assert_eq!(summary.quant.total, 2);
        assert_eq!(
            summary.total_scaled,
            summary.verbal.scaled + summary.quant.scaled
        );
    }

    #[test]
    fn scoring_is_deterministic() {
        let (questions, answers) = worked_example();
        let table = ScaleTable::default();
        let first = score(&questions, &answers, &table);
        let second = score(&questions, &answers, &table);
        assert_eq!(first, second);
    }

    #[test]
    fn fill_in_comparison_is_normalized() {
        let q = question(9, 4, 2, QuestionFormat::FillIn, "x = 4");
        let mut answers = HashMap::new();
        answers.insert(9, "  X =   4 ".to_string());
        assert!(is_correct(&q, &answers));
    }

    #[test]
    fn multiple_choice_comparison_is_strict() {
        let q = question(9, 1, 1, QuestionFormat::MultipleChoice, "A");
        let mut answers = HashMap::new();
        answers.insert(9, "a".to_string());
        assert!(!is_correct(&q, &answers));
    }

    #[test]
    fn domain_tallies_group_and_count() {
        let (questions, answers) = worked_example();
        let tallies = domain_tallies(&questions, &answers);
        assert_eq!(tallies.len(), 2);
        let algebra = tallies.iter().find(|t| t.domain == "Algebra").unwrap();
        assert_eq!((algebra.correct, algebra.total), (1, 2));
    }
}
