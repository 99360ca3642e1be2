//! System instruction that puts the agent in character.

use crate::coach::Scenario;

/// Build the persona block for `scenario`, spoken in `language`.
///
/// Every scenario field is interpolated verbatim.
pub fn build_system_instruction(scenario: &Scenario, language: &str) -> String {
    let difficulty = if scenario.difficulty.trim().is_empty() {
        "Medium"
    } else {
        scenario.difficulty.as_str()
    };

    format!(
        "You are playing ({counterpart}) in a professional training roleplay.\n\
         The user is: ({role}).\n\
         Situation: {description}.\n\
         Your goal: ({objective}), pursued in a way that challenges the user.\n\
         Difficulty level: {difficulty}.\n\
         \n\
         Instructions:\n\
         1. Speak only in {language}.\n\
         2. Be engaged and very realistic. Interrupt the user when it suits the character.\n\
         3. Never break character. You are not an AI assistant, you are the character.\n\
         4. Keep your replies fairly short so the conversation can flow.",
        counterpart = scenario.counterpart,
        role = scenario.role,
        description = scenario.description,
        objective = scenario.objective,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiation() -> Scenario {
        Scenario {
            title: "Supplier renewal".into(),
            description: "Price dispute".into(),
            role: "Negotiator".into(),
            objective: "Reach 10% discount".into(),
            counterpart: "Supplier".into(),
            difficulty: "Medium".into(),
            key_points: vec![],
        }
    }

    #[test]
    fn instruction_contains_every_scenario_field() {
        let text = build_system_instruction(&negotiation(), "English");
        for needle in [
            "Supplier",
            "Negotiator",
            "Price dispute",
            "Reach 10% discount",
            "Medium",
            "Speak only in English",
        ] {
            assert!(text.contains(needle), "missing {needle:?}");
        }
    }

    #[test]
    fn missing_difficulty_reads_as_medium() {
        let scenario = Scenario {
            difficulty: "  ".into(),
            ..negotiation()
        };
        assert!(build_system_instruction(&scenario, "Arabic").contains("Difficulty level: Medium."));
    }
}
