//! System prompt composition.
//!
//! The grounding section has three states, mirrored by the caller passing
//! `None` (grounding not attempted), `Some("")` (attempted, nothing found),
//! or `Some(text)` (context available).

/// Base system instruction, used for every turn.
pub const SYSTEM_PROMPT: &str = "\
You are Parley, a knowledgeable and careful assistant.\n\
\n\
## Communication Guidelines:\n\
- Provide clear, accurate answers grounded in reliable information\n\
- Be brief and to the point; answer only what is asked\n\
- Structure longer answers with Markdown headers and lists\n\
- Acknowledge uncertainty where it exists\n\
- Ask clarifying questions if the query is ambiguous\n\
- Maintain conversation history context for coherent multi-turn discussions";

/// Section appended when retrieved context is available.
const GROUNDING_SECTION_HEADER: &str = "\
\n\n## Knowledge Base Context:\n\
You have been provided with relevant documents from the knowledge base to \
help answer the user's question.\n\
\n\
### Guidelines for Using Context:\n\
- Prioritize information from the provided context when answering\n\
- You may reference the source documents when citing specific information\n\
- If the context doesn't fully address the question, supplement with your general knowledge\n\
- Never fabricate information that isn't supported by the context or established knowledge\n\
\n\
### Retrieved Context:\n";

/// Notice appended when grounding was attempted but nothing matched.
const NO_CONTEXT_NOTICE: &str = "\
\n\n## Knowledge Base Context:\n\
No relevant documents were found in the knowledge base for this query. \
Respond based on your general knowledge.";

/// Build the system prompt with an optional grounding section.
///
/// - `None` — grounding was not attempted: base prompt only.
/// - `Some("")` — attempted, nothing found: base prompt + notice.
/// - `Some(text)` — context available: base prompt + grounding section.
pub fn build_system_prompt(context: Option<&str>) -> String {
    match context {
        None => SYSTEM_PROMPT.to_string(),
        Some(text) if text.trim().is_empty() => format!("{SYSTEM_PROMPT}{NO_CONTEXT_NOTICE}"),
        Some(text) => format!("{SYSTEM_PROMPT}{GROUNDING_SECTION_HEADER}{text}\n"),
    }
}
