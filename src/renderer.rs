//! Template rendering for metalware.
//! Evaluates template strings with MiniJinja, bounds nested renders with a depth counter and
//! coerces rendered literals into typed values.

use crate::error::{Error, Result};
use log::trace;
use minijinja::{Environment, ErrorKind};
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

/// Trait for template rendering engines.
pub trait TemplateRenderer: Send + Sync {
    /// Renders a template string with the given context.
    ///
    /// # Errors
    /// * `Error::TemplateSyntaxError` if the template cannot be parsed
    /// * `Error::TemplateError` if evaluation fails
    fn render(&self, template: &str, context: minijinja::Value) -> Result<String>;
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    /// MiniJinja environment instance
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    /// Creates a new MiniJinjaRenderer instance with default environment.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        Self { env }
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        MiniJinjaRenderer::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, template: &str, context: minijinja::Value) -> Result<String> {
        self.env.render_str(template, context).map_err(|e| match e.kind() {
            ErrorKind::SyntaxError => Error::template_syntax(template, e.to_string()),
            _ => Error::TemplateError(e.to_string()),
        })
    }
}

/// Whether a string contains template tags and must be rendered before use.
pub fn is_template(value: &str) -> bool {
    value.contains("{{") || value.contains("{%")
}

/// Turns rendered output into a typed value.
///
/// When the whole output, trimmed, is `true`, `false`, `nil`, `null` or a base-10 integer
/// the native value is returned. Anything else stays a string, untrimmed.
pub fn coerce_rendered(rendered: String) -> Value {
    let trimmed = rendered.trim();
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" | "null" => Value::Null,
        _ if INTEGER.is_match(trimmed) => match trimmed.parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::String(rendered),
        },
        _ => Value::String(rendered),
    }
}

/// Per-cluster render bookkeeping: the nested render depth and the deferred error slot.
///
/// Errors raised while MiniJinja resolves an attribute cannot be returned through its
/// attribute hook, so they are parked here and picked up by the enclosing render call.
#[derive(Debug)]
pub struct RenderState {
    max_depth: usize,
    depth: AtomicUsize,
    deferred: Mutex<Option<Error>>,
}

impl RenderState {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth, depth: AtomicUsize::new(0), deferred: Mutex::new(None) }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Enters one render level. The level is left when the returned guard drops.
    ///
    /// # Errors
    /// * `Error::RecursiveConfigDepthExceededError` if this call would exceed the bound
    pub fn enter(&self, path: &str) -> Result<DepthGuard<'_>> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = DepthGuard { state: self };
        if depth > self.max_depth {
            return Err(Error::RecursiveConfigDepthExceededError {
                max_depth: self.max_depth,
                path: path.to_string(),
            });
        }
        trace!("Rendering '{path}' at depth {depth}");
        Ok(guard)
    }

    /// Parks an error for the enclosing render. The first error wins.
    pub fn defer(&self, error: Error) {
        let mut slot = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub fn take_deferred(&self) -> Option<Error> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

pub struct DepthGuard<'a> {
    state: &'a RenderState,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.state.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
