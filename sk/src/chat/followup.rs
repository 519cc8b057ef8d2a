//! Follow-up question injected after a reply that does not ask one

use rand::seq::IndexedRandom;
use tracing::debug;

/// Generic questions used when no keyword matches
pub const FOLLOW_UP_QUESTIONS: [&str; 8] = [
    "What's most important to you right now in this decision?",
    "How do you feel about the timeline for making this choice?",
    "What would happen if you delayed this decision?",
    "Which of your concerns feels most pressing?",
    "What additional information would be most helpful?",
    "How might this decision affect other areas of your life?",
    "What's your gut feeling telling you so far?",
    "Are there any options you haven't fully considered yet?",
];

/// Keyword-specific questions, checked in order against the lowercased context
const KEYWORD_QUESTIONS: [(&[&str], &str); 3] = [
    (&["buy", "purchase"], "What's your timeline for making this purchase?"),
    (&["job", "career"], "How important is work-life balance in this decision?"),
    (&["move", "relocat"], "What's drawing you to consider this change?"),
];

/// True when the reply has content and does not already end in a question
pub fn needs_follow_up(reply: &str) -> bool {
    let reply = reply.trim();
    !reply.is_empty() && !reply.ends_with('?')
}

/// Pick a follow-up question for this decision context
pub fn follow_up_question(context: &str) -> &'static str {
    let context = context.to_lowercase();
    if let Some((_, question)) = KEYWORD_QUESTIONS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| context.contains(k)))
    {
        debug!(%question, "follow_up_question: keyword match");
        return *question;
    }

    let mut rng = rand::rng();
    FOLLOW_UP_QUESTIONS.choose(&mut rng).copied().unwrap_or(FOLLOW_UP_QUESTIONS[0])
}
