//! Reply text extraction from multi-part model answers.

/// Reply returned to the user when Gemini produced no candidate.
pub const EMPTY_REPLY: &str = "<empty>";

/// Join the non-empty text parts of one candidate with `". "`.
pub fn join_parts<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

/// Substitute [`EMPTY_REPLY`] for a missing candidate.
pub fn or_empty(reply: Option<String>) -> String {
    reply.unwrap_or_else(|| EMPTY_REPLY.to_string())
}
