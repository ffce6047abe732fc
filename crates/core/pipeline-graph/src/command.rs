//! Opaque command templates.
//!
//! A node's interface to the outside world is a command template: an argv
//! vector with `{input:port}`, `{output:port}` and `{param:name}`
//! placeholders. The engine never interprets what the command does; it only
//! substitutes concrete paths and values at job compilation time.

use std::collections::BTreeMap;

/// An argv template with late-bound file and parameter placeholders.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    /// Creates a template from an argv vector.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Substitutes placeholders with concrete values.
    ///
    /// A placeholder must occupy a whole argument or be embedded in one;
    /// embedded occurrences are replaced textually. Unknown placeholders
    /// fail so that a typo in a pipeline definition surfaces at compile
    /// time, not as a malformed command line on the cluster.
    pub fn render(
        &self,
        inputs: &BTreeMap<String, String>,
        outputs: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, RenderError> {
        self.argv
            .iter()
            .map(|arg| render_arg(arg, inputs, outputs, params))
            .collect()
    }
}

fn render_arg(
    arg: &str,
    inputs: &BTreeMap<String, String>,
    outputs: &BTreeMap<String, String>,
    params: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(RenderError::UnterminatedPlaceholder {
                argument: arg.to_string(),
            });
        };
        let placeholder = &after[..end];

        let value = match placeholder.split_once(':') {
            Some(("input", port)) => inputs.get(port),
            Some(("output", port)) => outputs.get(port),
            Some(("param", name)) => params.get(name),
            _ => None,
        };
        let value = value.ok_or_else(|| RenderError::UnknownPlaceholder {
            placeholder: placeholder.to_string(),
            argument: arg.to_string(),
        })?;

        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Errors raised while rendering a command template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown placeholder '{{{placeholder}}}' in argument '{argument}'")]
    UnknownPlaceholder {
        placeholder: String,
        argument: String,
    },

    #[error("unterminated placeholder in argument '{argument}'")]
    UnterminatedPlaceholder { argument: String },
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::CommandTemplate;

    #[test]
    fn render_substitutes_all_placeholder_kinds() {
        //* Given
        let template = CommandTemplate::new([
            "process_tool",
            "--in",
            "{input:magnitude}",
            "--out",
            "{output:mask}",
            "--threshold={param:threshold}",
        ]);
        let inputs = BTreeMap::from([("magnitude".to_string(), "/data/mag.nii".to_string())]);
        let outputs = BTreeMap::from([("mask".to_string(), "/work/mask.nii".to_string())]);
        let params = BTreeMap::from([("threshold".to_string(), "0.5".to_string())]);

        //* When
        let argv = template
            .render(&inputs, &outputs, &params)
            .expect("render succeeds");

        //* Then
        assert_eq!(
            argv,
            [
                "process_tool",
                "--in",
                "/data/mag.nii",
                "--out",
                "/work/mask.nii",
                "--threshold=0.5",
            ]
        );
    }

    #[test]
    fn unknown_placeholder_fails() {
        let template = CommandTemplate::new(["tool", "{input:missing}"]);
        let empty = BTreeMap::new();
        let result = template.render(&empty, &empty, &empty);
        assert!(result.is_err());
    }
}
