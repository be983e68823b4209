//! System commands (§4.4 step 1): a small fixed set of slash-style inputs
//! that bypass the planner entirely.

/// A command recognized before the planner is ever consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    /// `/think` — surface the player's current situation without spending a
    /// planner call.
    Think,
    /// `/say <text>` — speak aloud without triggering intent classification.
    Say(String),
    /// `/go <destination>` — shortcut straight to `navigate`.
    Go(String),
    /// `/talk <name>` — shortcut straight to `npc_dialogue`.
    Talk(String),
    /// `/wait <minutes>` — shortcut straight to `update_time`.
    Wait(u32),
    Time,
    Where,
    End,
}

/// Parse a leading `/command` out of free text. Returns `None` for
/// ordinary narrative input, which goes to the planner instead.
pub fn parse(text: &str) -> Option<SystemCommand> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let head = parts.next()?.to_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    match head.as_str() {
        "think" => Some(SystemCommand::Think),
        "say" => Some(SystemCommand::Say(arg.to_string())),
        "go" if !arg.is_empty() => Some(SystemCommand::Go(arg.to_string())),
        "talk" if !arg.is_empty() => Some(SystemCommand::Talk(arg.to_string())),
        "wait" => arg.parse::<u32>().ok().map(SystemCommand::Wait),
        "time" => Some(SystemCommand::Time),
        "where" => Some(SystemCommand::Where),
        "end" => Some(SystemCommand::End),
        _ => None,
    }
}
