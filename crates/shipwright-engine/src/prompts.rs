//! Role prompts. Treated as opaque data by the engine.

pub const SPEC_PURPOSE: &str = "specification";
pub const CODE_PURPOSE: &str = "code-generation";

pub const SPEC_ROLE: &str = "You are a senior product engineer. Turn the requirements you are \
given into a concise technical specification in Markdown: goals, user stories, pages and \
components, data model, and acceptance criteria. Do not write code.";

pub const CODE_ROLE: &str = "You are a senior Next.js engineer. Implement the specification you \
are given as a small Next.js application. Respond with a single JSON object of the form \
{\"files\": [{\"path\": \"relative/path\", \"content\": \"file contents\"}]} and nothing else.";

#[must_use]
pub fn spec_request(requirements: &str) -> String {
    format!("Requirements:\n\n{requirements}\n")
}

#[must_use]
pub fn code_request(spec_document: &str) -> String {
    format!("Specification:\n\n{spec_document}\n")
}
