//! `#include` resolution for WGSL sources.

use std::collections::{HashMap, HashSet};

use crate::error::GraphicsError;

/// Shader composer resolving `#include "path"` directives.
///
/// Each include is pasted at most once per composed shader, so library
/// modules may include each other freely.
///
/// # Example
///
/// ```ignore
/// let mut composer = ShaderComposer::new();
/// composer.register_include("my_project/utils.wgsl", "fn helper() -> f32 { return 42.0; }");
/// let source = composer.compose("#include \"my_project/utils.wgsl\"\n...")?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct ShaderComposer {
    /// Registered include sources: path -> source text.
    includes: HashMap<String, String>,
}

impl ShaderComposer {
    /// Create a new empty shader composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single include source.
    ///
    /// The path is what appears in `#include "path"` directives.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    pub fn has_include(&self, path: &str) -> bool {
        self.includes.contains_key(path)
    }

    /// Expand every `#include` in `source`.
    pub fn compose(&self, source: &str) -> Result<String, GraphicsError> {
        let mut included = HashSet::new();
        self.resolve_includes(source, &mut included)
    }

    /// Resolve `#include "path"` directives recursively.
    fn resolve_includes(
        &self,
        source: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, GraphicsError> {
        let mut result = String::with_capacity(source.len());

        for line in source.lines() {
            if let Some(path) = parse_include_directive(line.trim()) {
                if !included.insert(path.to_string()) {
                    continue;
                }

                let include_source = self.includes.get(path).ok_or_else(|| {
                    GraphicsError::ShaderError(format!("include not found: \"{path}\""))
                })?;

                let resolved = self.resolve_includes(include_source, included)?;
                result.push_str(&resolved);
            } else {
                result.push_str(line);
            }
            result.push('\n');
        }

        Ok(result)
    }
}

/// Parse `#include "path"`, returning the path.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}
