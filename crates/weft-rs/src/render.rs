//! Console rendering for prompt streams.

use std::io::Write;

use crossterm::style::Stylize;
use futures::stream::{self, Stream, StreamExt};

use crate::action::ElementStream;
use crate::element::{PromptElement, Role, Source};
use crate::error::WeftError;
use crate::storage::PromptSnapshot;

/// Rendering switches.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Print a header line whenever the speaking role changes.
    pub show_roles: bool,
    /// Color elements by source.
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_roles: true,
            color: true,
        }
    }
}

impl RenderOptions {
    pub fn with_roles(mut self, show_roles: bool) -> Self {
        self.show_roles = show_roles;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }
}

// ── Elements ──────────────────────────────────────────────────────────

/// Write one element, styled by its source.
///
/// | Source | Style |
/// |--------|-------|
/// | constant | yellow |
/// | parameter | blue background |
/// | prompt | plain |
/// | llm | green background |
pub fn print_chat_element(out: &mut impl Write, element: &PromptElement, color: bool) -> std::io::Result<()> {
    let content = element.content.as_str();
    if !color {
        return out.write_all(content.as_bytes());
    }
    match element.source {
        Source::Constant => write!(out, "{}", content.yellow()),
        Source::Parameter => write!(out, "{}", content.on_blue()),
        Source::Prompt => write!(out, "{content}"),
        Source::Llm => write!(out, "{}", content.on_green()),
    }
}

fn role_header(role: Role) -> String {
    format!("\n------------------ {role} ------------------\n")
}

const CLOSING_RULE: &str = "\n----------------------------------------\n";

// ── Streams ───────────────────────────────────────────────────────────

struct Renderer<S, W> {
    elements: S,
    out: W,
    options: RenderOptions,
    last_role: Option<Role>,
    done: bool,
}

impl<S, W> Renderer<S, W>
where
    S: Stream<Item = Result<PromptElement, WeftError>> + Unpin,
    W: Write,
{
    fn print(&mut self, element: &PromptElement) -> std::io::Result<()> {
        if self.options.show_roles && self.last_role != Some(element.role) {
            self.out.write_all(role_header(element.role).as_bytes())?;
            self.last_role = Some(element.role);
        }
        print_chat_element(&mut self.out, element, self.options.color)?;
        self.out.flush()
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.out.write_all(CLOSING_RULE.as_bytes())?;
        self.out.flush()
    }

    async fn step(mut self) -> Option<(Result<PromptElement, WeftError>, Self)> {
        if self.done {
            return None;
        }
        match self.elements.next().await {
            Some(Ok(element)) => {
                let item = self.print(&element).map(|()| element).map_err(render_error);
                self.done = item.is_err();
                Some((item, self))
            }
            Some(Err(e)) => {
                self.done = true;
                Some((Err(e), self))
            }
            None => {
                self.done = true;
                match self.close() {
                    Ok(()) => None,
                    Err(e) => Some((Err(render_error(e)), self)),
                }
            }
        }
    }
}

fn render_error(e: std::io::Error) -> WeftError {
    WeftError::Stream(format!("render failed: {e}"))
}

/// Print every element to `out` as it passes through, unchanged.
///
/// A role header is printed whenever the role changes (if enabled) and a
/// closing rule once the inner stream ends.
pub fn render_stream<S, W>(elements: S, out: W, options: RenderOptions) -> ElementStream
where
    S: Stream<Item = Result<PromptElement, WeftError>> + Unpin + Send + 'static,
    W: Write + Send + 'static,
{
    let renderer = Renderer {
        elements,
        out,
        options,
        last_role: None,
        done: false,
    };
    stream::unfold(renderer, Renderer::step).boxed()
}

/// Dump a prompt snapshot, one block per role group.
pub fn pretty_print_prompt(out: &mut impl Write, prompt: &PromptSnapshot, color: bool) -> std::io::Result<()> {
    for group in prompt.role_groups() {
        let Some(first) = group.first() else {
            continue;
        };
        writeln!(out, "----------{}----------\n", first.role)?;
        for element in group {
            print_chat_element(out, element, color)?;
        }
        writeln!(out, "\n")?;
    }
    out.flush()
}
