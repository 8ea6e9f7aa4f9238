//! Activity content payloads.
//!
//! Content is a tagged union keyed by the activity type, so a quiz can only
//! ever carry quiz questions. Structural checks that every payload of a
//! variant must pass live here; configurable rules live in `schema`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Quiz,
    Simulation,
    Roleplay,
    Dragdrop,
    Interactive,
    Reading,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        ActivityType::Quiz,
        ActivityType::Simulation,
        ActivityType::Roleplay,
        ActivityType::Dragdrop,
        ActivityType::Interactive,
        ActivityType::Reading,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Quiz => "quiz",
            ActivityType::Simulation => "simulation",
            ActivityType::Roleplay => "roleplay",
            ActivityType::Dragdrop => "dragdrop",
            ActivityType::Interactive => "interactive",
            ActivityType::Reading => "reading",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizContent {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStep {
    pub id: String,
    pub prompt: String,
    pub expected_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationContent {
    pub scenario: String,
    pub steps: Vec<SimulationStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleplayContent {
    pub scenario: String,
    pub character: String,
    pub prompts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragItem {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragDropContent {
    #[serde(default)]
    pub instructions: String,
    pub items: Vec<DragItem>,
    /// Item ids in the expected sequence.
    pub correct_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlankField {
    pub id: String,
    pub label: String,
    pub accepted_answers: Vec<String>,
}

/// Fill-in-the-blank form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveContent {
    #[serde(default)]
    pub instructions: String,
    pub blanks: Vec<BlankField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingContent {
    pub body: String,
    #[serde(default)]
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityContent {
    Quiz(QuizContent),
    Simulation(SimulationContent),
    Roleplay(RoleplayContent),
    Dragdrop(DragDropContent),
    Interactive(InteractiveContent),
    Reading(ReadingContent),
}

impl ActivityContent {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            ActivityContent::Quiz(_) => ActivityType::Quiz,
            ActivityContent::Simulation(_) => ActivityType::Simulation,
            ActivityContent::Roleplay(_) => ActivityType::Roleplay,
            ActivityContent::Dragdrop(_) => ActivityType::Dragdrop,
            ActivityContent::Interactive(_) => ActivityType::Interactive,
            ActivityContent::Reading(_) => ActivityType::Reading,
        }
    }

    /// Structural errors every payload of this variant must be free of.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            ActivityContent::Quiz(quiz) => {
                check_unique_ids(
                    quiz.questions.iter().map(|q| q.id.as_str()),
                    "question",
                    &mut errors,
                );
                for question in &quiz.questions {
                    if question.prompt.trim().is_empty() {
                        errors.push(format!("Question '{}' has no prompt", question.id));
                    }
                    if question.options.len() < 2 {
                        errors.push(format!(
                            "Question '{}' needs at least two options",
                            question.id
                        ));
                    }
                    if question.correct_index >= question.options.len() {
                        errors.push(format!(
                            "Question '{}' answer index {} is out of range",
                            question.id, question.correct_index
                        ));
                    }
                }
            }
            ActivityContent::Simulation(sim) => {
                check_unique_ids(sim.steps.iter().map(|s| s.id.as_str()), "step", &mut errors);
                for step in &sim.steps {
                    if step.expected_action.trim().is_empty() {
                        errors.push(format!("Step '{}' has no expected action", step.id));
                    }
                }
            }
            ActivityContent::Roleplay(roleplay) => {
                if roleplay.prompts.iter().any(|p| p.trim().is_empty()) {
                    errors.push("Roleplay prompts must not be empty".to_string());
                }
            }
            ActivityContent::Dragdrop(dragdrop) => {
                check_unique_ids(dragdrop.items.iter().map(|i| i.id.as_str()), "item", &mut errors);
                let items: HashSet<&str> = dragdrop.items.iter().map(|i| i.id.as_str()).collect();
                let order: HashSet<&str> =
                    dragdrop.correct_order.iter().map(String::as_str).collect();
                if items != order || dragdrop.correct_order.len() != dragdrop.items.len() {
                    errors.push("Correct order must list every item exactly once".to_string());
                }
            }
            ActivityContent::Interactive(form) => {
                check_unique_ids(form.blanks.iter().map(|b| b.id.as_str()), "blank", &mut errors);
                for blank in &form.blanks {
                    if blank.accepted_answers.iter().all(|a| a.trim().is_empty()) {
                        errors.push(format!("Blank '{}' has no accepted answer", blank.id));
                    }
                }
            }
            ActivityContent::Reading(reading) => {
                if reading.body.trim().is_empty() {
                    errors.push("Reading body must not be empty".to_string());
                }
            }
        }
        errors
    }
}

fn check_unique_ids<'a>(ids: impl Iterator<Item = &'a str>, what: &str, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            errors.push(format!("Every {what} needs an id"));
        } else if !seen.insert(id) {
            errors.push(format!("Duplicate {what} id '{id}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(correct_index: usize) -> ActivityContent {
        ActivityContent::Quiz(QuizContent {
            questions: vec![QuizQuestion {
                id: "q1".into(),
                prompt: "Which hash proves an image was not altered?".into(),
                options: vec!["MD5/SHA-256 of the image".into(), "File name".into()],
                correct_index,
                explanation: String::new(),
            }],
        })
    }

    #[test]
    fn content_is_tagged_by_type() {
        let json = serde_json::to_value(quiz(0)).unwrap();
        assert_eq!(json["type"], "quiz");
        let back: ActivityContent = serde_json::from_value(json).unwrap();
        assert_eq!(back.activity_type(), ActivityType::Quiz);
    }

    #[test]
    fn quiz_answer_index_must_be_in_range() {
        assert!(quiz(1).structural_errors().is_empty());
        let errors = quiz(2).structural_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("out of range"));
    }

    #[test]
    fn dragdrop_order_must_be_permutation() {
        let items = vec![
            DragItem { id: "seize".into(), label: "Seize device".into() },
            DragItem { id: "image".into(), label: "Create forensic image".into() },
        ];
        let ok = ActivityContent::Dragdrop(DragDropContent {
            instructions: String::new(),
            items: items.clone(),
            correct_order: vec!["seize".into(), "image".into()],
        });
        assert!(ok.structural_errors().is_empty());

        let bad = ActivityContent::Dragdrop(DragDropContent {
            instructions: String::new(),
            items,
            correct_order: vec!["seize".into(), "seize".into()],
        });
        assert_eq!(bad.structural_errors().len(), 1);
    }

    #[test]
    fn blank_needs_an_answer() {
        let form = ActivityContent::Interactive(InteractiveContent {
            instructions: String::new(),
            blanks: vec![BlankField {
                id: "section".into(),
                label: "Certificate required under section".into(),
                accepted_answers: vec![" ".into()],
            }],
        });
        assert_eq!(form.structural_errors(), vec!["Blank 'section' has no accepted answer"]);
    }
}
