use crate::protocol::{CodeBlock, ContentType};
use crate::translator::{SpecialKey, Step};
use lazy_static::lazy_static;
use regex::Regex;

/// Renders steps in one test-automation command dialect.
pub trait CodeDialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, step: &Step) -> CodeBlock;

    /// Wraps recorded statements into a runnable test file.
    fn render_script(&self, blocks: &[CodeBlock], suite: &str, test: &str) -> String;
}

/// Escapes a string for a single-quoted JavaScript literal.
pub fn escape_single_quoted(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// Inverse of [`escape_single_quoted`].
pub fn unescape_single_quoted(s: &str) -> String {
    s.replace("\\'", "'")
}

/// The Cypress command dialect (`cy.get(...).click()` and friends).
#[derive(Debug, Clone, Copy, Default)]
pub struct CypressDialect;

impl CypressDialect {
    fn key_token(key: SpecialKey) -> &'static str {
        match key {
            SpecialKey::Backspace => "{backspace}",
            SpecialKey::Escape => "{esc}",
            SpecialKey::ArrowUp => "{uparrow}",
            SpecialKey::ArrowRight => "{rightarrow}",
            SpecialKey::ArrowDown => "{downarrow}",
            SpecialKey::ArrowLeft => "{leftarrow}",
        }
    }

    /// `cy.get('<selector>')` with the selector escaped for the literal.
    fn get(selector: &str) -> String {
        format!("cy.get('{}')", escape_single_quoted(selector))
    }

    fn key_label(key: SpecialKey) -> &'static str {
        match key {
            SpecialKey::Backspace => "Backspace",
            SpecialKey::Escape => "Escape",
            SpecialKey::ArrowUp => "Up Arrow",
            SpecialKey::ArrowRight => "Right Arrow",
            SpecialKey::ArrowDown => "Down Arrow",
            SpecialKey::ArrowLeft => "Left Arrow",
        }
    }
}

impl CodeDialect for CypressDialect {
    fn name(&self) -> &'static str {
        "cypress"
    }

    fn render(&self, step: &Step) -> CodeBlock {
        match step {
            Step::Click { selector } => CodeBlock::new(
                format!("{}.click()", Self::get(selector)),
                format!("Click the element matching selector {selector}."),
            ),
            Step::DoubleClick { selector } => CodeBlock::new(
                format!("{}.dblclick()", Self::get(selector)),
                format!("Double-click the element matching selector {selector}."),
            ),
            Step::PressKey { selector, key } => CodeBlock::new(
                format!("{}.type('{}')", Self::get(selector), Self::key_token(*key)),
                format!(
                    "Press the {} key on the element matching selector {selector}.",
                    Self::key_label(*key)
                ),
            ),
            Step::TypeText { selector, text } => {
                let escaped = escape_single_quoted(text);
                CodeBlock::new(
                    format!("{}.type('{escaped}')", Self::get(selector)),
                    format!("Type the text {escaped} into the input matching selector {selector}."),
                )
            }
            Step::Submit { selector } => CodeBlock::new(
                format!("{}.submit()", Self::get(selector)),
                format!("Submit the form matching selector {selector}."),
            ),
            Step::AssertUrlContains { url } => CodeBlock::new(
                format!("cy.url().should('contains', '{}')", escape_single_quoted(url)),
                format!("The current URL should contain {url}."),
            ),
            Step::Visit { url } => CodeBlock::new(
                format!("cy.visit('{}')", escape_single_quoted(url)),
                format!("Visit the page at {url}."),
            ),
        }
    }

    fn render_script(&self, blocks: &[CodeBlock], suite: &str, test: &str) -> String {
        let mut output = format!(
            "describe('{}', () => {{\n  it('{}', () => {{\n",
            escape_single_quoted(suite),
            escape_single_quoted(test)
        );
        for block in blocks {
            output.push_str("    ");
            output.push_str(&block.statement);
            output.push('\n');
        }
        output.push_str("  })\n})\n");
        output
    }
}

/// Renders the recorded explanations as a numbered list.
pub fn render_prompts(blocks: &[CodeBlock]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| format!("{}. {}\n", i + 1, block.explanation))
        .collect()
}

/// Renders blocks for export in the requested content type.
pub fn render_export(
    dialect: &dyn CodeDialect,
    blocks: &[CodeBlock],
    content: ContentType,
    suite: &str,
    test: &str,
) -> String {
    match content {
        ContentType::Code => dialect.render_script(blocks, suite, test),
        ContentType::Prompt => render_prompts(blocks),
    }
}

/// A `cy.get('<selector>').<command>('<argument>')` statement taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub selector: String,
    pub command: String,
    /// Unescaped literal argument, if the command takes one.
    pub argument: Option<String>,
}

lazy_static! {
    static ref GET_STATEMENT: Regex = Regex::new(
        r"^cy\.get\('((?:[^'\\]|\\.)*)'\)\.([a-z]+)\((?:'((?:[^'\\]|\\.)*)')?\)$"
    )
    .unwrap();
}

/// Parses a statement produced by [`CypressDialect`] for a selector-targeted step.
pub fn parse_statement(statement: &str) -> Option<ParsedStatement> {
    let caps = GET_STATEMENT.captures(statement.trim())?;
    Some(ParsedStatement {
        selector: unescape_single_quoted(caps.get(1)?.as_str()),
        command: caps.get(2)?.as_str().to_string(),
        argument: caps.get(3).map(|m| unescape_single_quoted(m.as_str())),
    })
}
