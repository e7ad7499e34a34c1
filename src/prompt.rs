// Prompt construction for the meal planner
//
// Pure string building: the handler collects the two food lists and this
// module turns them into the (system, user) message pair sent to the model.

/// Fixed dining-hall availability list embedded in every prompt.
pub const AVAILABLE_OPTIONS: &str = "bananas, apples, oranges, tangerines, milk, chocolate milk, cereal, white bread, \
     sourdough bread, ham, turkey ham, egg salad, water, orange juice, pineapple juice, \
     lemonade, apple juice, coke, sprite, vitamin water, seltzer water";

/// System message providing context for the dietary planner.
pub const SYSTEM_PROMPT: &str =
    "You are a dietary planner for a college student based on dining hall food options.";

/// Converts a list of strings into a single concatenated string.
/// Elements are appended directly, with no separator.
fn to_str(items: &[String]) -> String {
    items.concat()
}

/// Build the (system, user) message pair for a meal-plan request.
/// No validation: empty lists produce a prompt with empty segments.
pub fn build_meal_plan_prompt(all_food: &[String], pref_foods: &[String]) -> (String, String) {
    let all_food_str = to_str(all_food);
    let pref_foods_str = to_str(pref_foods);

    let user_input = format!(
        "I want you to create a meal plan, including portion size suggestions, \
         for me for my next meal based on the following food options: {all_food_str} and {AVAILABLE_OPTIONS}. \
         Out of everything available, I prefer the following food options: {pref_foods_str}; \
         Please make a meal plan for each of these three meals for me to have a balanced diet. \
         If the diet based on my preferred food options is unbalanced, suggest other foods I should incorporate \
         from the available options."
    );

    (SYSTEM_PROMPT.to_string(), user_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_deterministic() {
        let all_food = vec!["rice".to_string(), "beans".to_string()];
        let pref_foods = vec!["chicken".to_string()];

        let first = build_meal_plan_prompt(&all_food, &pref_foods);
        let second = build_meal_plan_prompt(&all_food, &pref_foods);
        assert_eq!(first, second);
    }

    #[test]
    fn test_prompt_contains_foods_and_availability() {
        let all_food = vec!["rice".to_string()];
        let pref_foods = vec!["chicken".to_string()];

        let (system, user) = build_meal_plan_prompt(&all_food, &pref_foods);
        assert_eq!(system, SYSTEM_PROMPT);
        assert!(user.contains("rice"));
        assert!(user.contains("chicken"));
        assert!(user.contains(AVAILABLE_OPTIONS));
    }

    #[test]
    fn test_concatenation_has_no_separator() {
        let all_food = vec!["rice".to_string(), "beans".to_string()];
        let (_, user) = build_meal_plan_prompt(&all_food, &[]);
        assert!(user.contains("ricebeans"));
    }

    #[test]
    fn test_empty_lists_do_not_panic() {
        let (system, user) = build_meal_plan_prompt(&[], &[]);
        assert!(!system.is_empty());
        assert!(user.contains("food options:  and"));
    }
}
