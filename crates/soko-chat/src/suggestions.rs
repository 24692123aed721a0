/// Canned openers offered to buyers in an empty or quiet chat.
pub const MESSAGE_SUGGESTIONS: [&str; 10] = [
    "Is this still available?",
    "What's the best price you can offer?",
    "Can I see more photos?",
    "Where can we meet?",
    "Is this negotiable?",
    "What's the condition?",
    "Do you have more in stock?",
    "Can you deliver?",
    "What's your location?",
    "Is this authentic?",
];

pub fn message_suggestions() -> Vec<String> {
    MESSAGE_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}
