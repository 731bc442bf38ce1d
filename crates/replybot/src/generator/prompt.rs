use replybot_protocol::{ChatHistory, MessageRecord};

const PREAMBLE: &str = "You are an AI assistant that replies like the user.\n\
Given the following recent messages, generate a reply in the style of the user (you).\n";

/// Build the completion prompt from recent history and the incoming text.
///
/// Only the last `context` records are included. When the newest record is
/// the incoming message itself it is left out, since it is appended as the
/// final `Them:` line anyway.
pub fn build_prompt(history: &ChatHistory, incoming: &str, context: usize) -> String {
    let duplicate = history
        .last()
        .is_some_and(|last| !last.is_own() && last.text == incoming);
    let mut window = history.tail(context + usize::from(duplicate));
    if duplicate {
        window = window.split_last().map_or(window, |(_, rest)| rest);
    }

    let mut prompt = String::from(PREAMBLE);
    for record in window {
        prompt.push_str(speaker(record));
        prompt.push_str(": ");
        prompt.push_str(&record.text);
        prompt.push('\n');
    }
    prompt.push_str("Them: ");
    prompt.push_str(incoming);
    prompt.push_str("\nMe:");
    prompt
}

fn speaker(record: &MessageRecord) -> &'static str {
    if record.is_own() { "Me" } else { "Them" }
}
