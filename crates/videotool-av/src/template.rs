//! Variable substitution for stage argument templates.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for argument templates.
///
/// Supports variable substitution in strings using the `{varname}` syntax.
/// Unknown variables are left untouched.
///
/// # Example
///
/// ```
/// use videotool_av::TemplateContext;
/// use std::path::Path;
///
/// let ctx = TemplateContext::new()
///     .with_paths(
///         Path::new("/input/movie.avi"),
///         Path::new("/output/movie.mp4"),
///         Path::new("/tmp/videotool-x/video.y4m"),
///     )
///     .with_var("preset", "veryslow");
///
/// assert_eq!(ctx.substitute("{filestem}.mp4"), "movie.mp4");
/// assert_eq!(ctx.substitute("--preset={preset}"), "--preset=veryslow");
/// assert_eq!(ctx.substitute("{pipe}"), "/tmp/videotool-x/video.y4m");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the variables describing one decode/encode run.
    ///
    /// This adds the following variables:
    /// - `{input}` - Full path to the input file
    /// - `{output}` - Full path to the output file
    /// - `{pipe}` - Path of the named pipe between the stages
    /// - `{filename}` - Input file name with extension
    /// - `{filestem}` - Input file name without extension
    /// - `{extension}` - Input file extension
    /// - `{dirname}` - Input file parent directory
    pub fn with_paths(mut self, input: &Path, output: &Path, pipe: &Path) -> Self {
        self.set("input", &input.display().to_string());
        self.set("output", &output.display().to_string());
        self.set("pipe", &pipe.display().to_string());

        if let Some(name) = input.file_name() {
            self.set("filename", &name.to_string_lossy());
        }
        if let Some(stem) = input.file_stem() {
            self.set("filestem", &stem.to_string_lossy());
        }
        if let Some(ext) = input.extension() {
            self.set("extension", &ext.to_string_lossy());
        }
        if let Some(parent) = input.parent() {
            self.set("dirname", &parent.display().to_string());
        }

        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Add several custom variables.
    pub fn with_vars<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in vars {
            self.set(k, v);
        }
        self
    }

    /// Set a variable.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string, in a single left-to-right pass so
    /// substituted values are never expanded again.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => match self.vars.get(&after[..close]) {
                    Some(value) => {
                        result.push_str(value);
                        rest = &after[close + 1..];
                    }
                    None => {
                        result.push('{');
                        rest = after;
                    }
                },
                None => {
                    result.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// Substitute variables in a list of strings.
    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}
